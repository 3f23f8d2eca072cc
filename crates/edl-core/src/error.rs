//! Crate-level error type for flashing operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::exec::ExecError;
use crate::poll::WaitCancelled;

pub type Result<T> = std::result::Result<T, FlashError>;

#[derive(Error, Debug)]
pub enum FlashError {
    /// A required vendor tool is missing from the tool directories.
    #[error("required tool not found: {tool} (expected at {})", path.display())]
    ExecutableNotFound { tool: String, path: PathBuf },

    /// Sahara handshake or programmer transfer failed. Always fatal;
    /// retrying without fixing the physical connection never helps.
    #[error(
        "failed to load Firehose programmer ({}); \
         try a different USB cable/port, check the QDLoader 9008 driver, \
         or hold Power+VolDown for 10s to force-reboot, then try again",
        exit_label(.code)
    )]
    ProgrammerUploadFailed { code: Option<i32> },

    #[error("partition read failed (LUN {lun}, start {start_sector}, {})", exit_label(.code))]
    PartitionReadFailed {
        lun: u32,
        start_sector: String,
        code: Option<i32>,
    },

    #[error("failed to flash '{image}' ({})", exit_label(.code))]
    PartitionWriteFailed { image: String, code: Option<i32> },

    /// A firmware directory held no `rawprogram*.xml` descriptors.
    #[error("no rawprogram XML descriptors found in {}", dir.display())]
    NoFlashDescriptors { dir: PathBuf },

    #[error(transparent)]
    Cancelled(#[from] WaitCancelled),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {c}"),
        None => "killed by signal".to_string(),
    }
}
