//! Firehose command stage: partition I/O against a loaded programmer.
//!
//! Every operation shells out to the vendor fh_loader tool. The stage
//! owns the exact argument vectors (the tool's CLI is the compatibility
//! contract) and the working-directory rules: fh_loader resolves image
//! file names relative to its working directory, so reads run in the
//! output directory and writes run in the image directory.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::{ToolboxConfig, require_tool};
use crate::error::{FlashError, Result};
use crate::exec::{CommandRunner, ExecError};
use crate::mode::EdlHandle;
use crate::sahara::SaharaLoader;

/// Addressing for a single-partition read or write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionTarget {
    pub lun: u32,
    /// Decimal sector text, passed through to the tool verbatim.
    pub start_sector: String,
    /// "0" reads to the end of the partition entry. Ignored on writes;
    /// the image length determines the extent.
    pub num_sectors: String,
    pub memory_type: String,
}

impl PartitionTarget {
    pub fn new(lun: u32, start_sector: impl Into<String>, num_sectors: impl Into<String>) -> Self {
        Self {
            lun,
            start_sector: start_sector.into(),
            num_sectors: num_sectors.into(),
            memory_type: "UFS".to_string(),
        }
    }

    pub fn with_memory(mut self, memory_type: impl Into<String>) -> Self {
        self.memory_type = memory_type.into();
        self
    }
}

/// A full rawprogram/patch flashing run. Built once, immutable during
/// execution.
#[derive(Debug, Clone)]
pub struct FlashPlan {
    /// Firehose programmer uploaded in step 1.
    pub loader: PathBuf,
    pub memory_type: String,
    /// Partition-layout descriptors; sent before the patches.
    pub raw_xmls: Vec<PathBuf>,
    /// Post-layout corrections.
    pub patch_xmls: Vec<PathBuf>,
    pub port: EdlHandle,
}

impl FlashPlan {
    /// Build a plan from a firmware directory laid out the vendor way:
    /// `rawprogram*.xml` and `patch*.xml` descriptors next to the
    /// images, ordered by file name.
    pub fn discover(
        xml_dir: &Path,
        loader: PathBuf,
        memory_type: impl Into<String>,
        port: EdlHandle,
    ) -> Result<Self> {
        let mut raw_xmls = Vec::new();
        let mut patch_xmls = Vec::new();

        for entry in std::fs::read_dir(xml_dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(".xml") {
                continue;
            }
            if name.starts_with("rawprogram") {
                raw_xmls.push(path);
            } else if name.starts_with("patch") {
                patch_xmls.push(path);
            }
        }

        raw_xmls.sort();
        patch_xmls.sort();

        if raw_xmls.is_empty() {
            return Err(FlashError::NoFlashDescriptors {
                dir: xml_dir.to_path_buf(),
            });
        }

        Ok(Self {
            loader,
            memory_type: memory_type.into(),
            raw_xmls,
            patch_xmls,
            port,
        })
    }
}

/// Issues Firehose commands through the vendor fh_loader tool.
pub struct FirehoseExecutor<'a, R: CommandRunner> {
    runner: &'a R,
    config: &'a ToolboxConfig,
}

impl<'a, R: CommandRunner> FirehoseExecutor<'a, R> {
    pub fn new(runner: &'a R, config: &'a ToolboxConfig) -> Self {
        Self { runner, config }
    }

    /// Dump one partition range to `output`.
    pub fn read_partition(
        &self,
        port: &EdlHandle,
        output: &Path,
        target: &PartitionTarget,
    ) -> Result<()> {
        let exe = require_tool(self.config.fh_loader_exe())?;
        let (dest_dir, dest_name) = split_dir_and_name(output)?;
        std::fs::create_dir_all(&dest_dir)?;

        info!(
            lun = target.lun,
            start = %target.start_sector,
            num = %target.num_sectors,
            "Dumping partition range"
        );

        let invocation = self
            .config
            .tool_invocation(exe)
            .arg(format!("--port={}", port.raw_device_path()))
            .arg("--convertprogram2read")
            .arg(format!("--sendimage={dest_name}"))
            .arg(format!("--lun={}", target.lun))
            .arg(format!("--start_sector={}", target.start_sector))
            .arg(format!("--num_sectors={}", target.num_sectors))
            .arg(format!("--memoryname={}", target.memory_type))
            .arg("--noprompt")
            .arg("--zlpawarehost=1")
            .current_dir(dest_dir);

        match self.runner.run(&invocation) {
            Ok(_) => Ok(()),
            Err(ExecError::NonZeroExit { code, .. }) => Err(FlashError::PartitionReadFailed {
                lun: target.lun,
                start_sector: target.start_sector.clone(),
                code,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Flash `image` at the target range. `target.num_sectors` is not
    /// sent; the image length determines how much is written.
    pub fn write_partition(
        &self,
        port: &EdlHandle,
        image: &Path,
        target: &PartitionTarget,
    ) -> Result<()> {
        let exe = require_tool(self.config.fh_loader_exe())?;
        let (image_dir, image_name) = split_dir_and_name(image)?;

        info!(
            image = %image_name,
            lun = target.lun,
            start = %target.start_sector,
            "Flashing partition"
        );

        let invocation = self
            .config
            .tool_invocation(exe)
            .arg(format!("--port={}", port.raw_device_path()))
            .arg(format!("--sendimage={image_name}"))
            .arg(format!("--lun={}", target.lun))
            .arg(format!("--start_sector={}", target.start_sector))
            .arg(format!("--memoryname={}", target.memory_type))
            .arg("--noprompt")
            .arg("--zlpawarehost=1")
            .current_dir(image_dir);

        match self.runner.run(&invocation) {
            Ok(_) => {
                info!(image = %image_name, "Successfully flashed");
                Ok(())
            }
            Err(ExecError::NonZeroExit { code, .. }) => Err(FlashError::PartitionWriteFailed {
                image: image_name,
                code,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Reset the device out of EDL.
    ///
    /// The port usually drops mid-reset and the tool reports a spurious
    /// failure, so a bad exit is logged and swallowed. Only a missing
    /// executable is an error.
    pub fn reset(&self, port: &EdlHandle) -> Result<()> {
        let exe = require_tool(self.config.fh_loader_exe())?;

        info!(port = %port, "Resetting device via fh_loader");

        let invocation = self
            .config
            .tool_invocation(exe)
            .arg(format!("--port={}", port.raw_device_path()))
            .arg("--reset")
            .arg("--noprompt");

        if let Err(e) = self.runner.run(&invocation) {
            warn!(error = %e, "Reset command reported failure, continuing");
        }
        Ok(())
    }

    /// Execute a full flash plan: Sahara programmer upload, then one
    /// fh_loader run over all descriptors. A failed upload
    /// short-circuits; the flash pass never starts without a loaded
    /// programmer.
    pub fn flash_plan(&self, plan: &FlashPlan) -> Result<()> {
        require_tool(self.config.sahara_exe())?;
        let exe = require_tool(self.config.fh_loader_exe())?;

        info!("STEP 1/2: Loading programmer");
        SaharaLoader::new(self.runner, self.config).load_programmer(&plan.loader, &plan.port)?;

        info!("STEP 2/2: Flashing firmware");
        let search_path = plan
            .loader
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let raw_list = join_names(&plan.raw_xmls);
        let patch_list = join_names(&plan.patch_xmls);

        let invocation = self
            .config
            .tool_invocation(exe)
            .arg(format!("--port={}", plan.port.raw_device_path()))
            .arg(format!("--search_path={}", search_path.display()))
            .arg(format!("--sendxml={raw_list}"))
            .arg(format!("--sendxml={patch_list}"))
            .arg("--setactivepartition=1")
            .arg(format!("--memoryname={}", plan.memory_type))
            .arg("--showpercentagecomplete")
            .arg("--zlpawarehost=1")
            .arg("--noprompt");

        self.runner.run(&invocation)?;
        Ok(())
    }
}

/// Absolute parent directory and file name of `path`.
fn split_dir_and_name(path: &Path) -> Result<(PathBuf, String)> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let dir = absolute
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| bad_path(path))?;
    let name = absolute
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| bad_path(path))?;
    Ok((dir, name))
}

fn bad_path(path: &Path) -> FlashError {
    FlashError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("not a file path: {}", path.display()),
    ))
}

/// Comma-joined file names, order preserved.
fn join_names(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string())
        })
        .collect::<Vec<_>>()
        .join(",")
}
