//! Sahara programmer upload stage.
//!
//! Thin orchestration over the vendor QSaharaServer tool; the Sahara
//! wire protocol itself lives inside that executable. This stage only
//! builds the invocation and classifies the outcome.

use std::path::Path;

use tracing::{error, info};

use crate::config::{ToolboxConfig, require_tool};
use crate::error::{FlashError, Result};
use crate::exec::{CommandRunner, ExecError};
use crate::mode::EdlHandle;

/// Sahara protocol image type selecting the Firehose programmer.
const IMAGE_TYPE_PROGRAMMER: u8 = 13;

/// Uploads the Firehose programmer to a device waiting in EDL mode.
pub struct SaharaLoader<'a, R: CommandRunner> {
    runner: &'a R,
    config: &'a ToolboxConfig,
}

impl<'a, R: CommandRunner> SaharaLoader<'a, R> {
    pub fn new(runner: &'a R, config: &'a ToolboxConfig) -> Self {
        Self { runner, config }
    }

    /// Upload `loader` to the device on `port`.
    ///
    /// A failure here is always fatal: a broken Sahara handshake means
    /// an unstable connection or a wedged device, and retrying without
    /// operator action does not recover it. The error text carries the
    /// cable/driver/force-reboot guidance.
    pub fn load_programmer(&self, loader: &Path, port: &EdlHandle) -> Result<()> {
        let exe = require_tool(self.config.sahara_exe())?;

        info!(
            port = %port,
            loader = %loader.display(),
            "Uploading programmer via QSaharaServer"
        );

        let invocation = self
            .config
            .tool_invocation(exe)
            .arg("-p")
            .arg(port.raw_device_path())
            .arg("-s")
            .arg(format!("{IMAGE_TYPE_PROGRAMMER}:{}", loader.display()));

        match self.runner.run(&invocation) {
            Ok(_) => Ok(()),
            Err(ExecError::NonZeroExit { code, .. }) => {
                error!("Failed to load Firehose programmer");
                Err(FlashError::ProgrammerUploadFailed { code })
            }
            Err(e) => Err(e.into()),
        }
    }
}
