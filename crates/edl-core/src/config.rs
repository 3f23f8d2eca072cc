//! Toolbox configuration: tool locations, staging directories, timing.
//!
//! Everything that was ambient state in earlier toolbox generations is
//! an explicit value here, threaded into the pieces that need it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::FlashError;
use crate::exec::Invocation;

/// Loader the Firehose stage expects the operator to provide.
pub const DEFAULT_LOADER_FILENAME: &str = "prog_firehose_ddr.elf";

/// Configuration for a flashing session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolboxConfig {
    /// Directory holding the vendor executables.
    pub tools_dir: PathBuf,
    /// Directory holding downloaded helper binaries; also put on PATH.
    pub download_dir: PathBuf,
    /// Directory the operator stages loader and image files in.
    pub image_dir: PathBuf,
    /// Skip ADB-driven transitions; the operator moves the device by hand.
    pub skip_adb: bool,
    /// Seconds between detection attempts while polling.
    pub poll_interval_secs: u64,
    /// Seconds to let the device settle after a reboot command.
    pub settle_delay_secs: u64,
    /// File name of the Firehose programmer within `image_dir`.
    pub loader_filename: String,
}

impl Default for ToolboxConfig {
    fn default() -> Self {
        Self {
            tools_dir: PathBuf::from("tools"),
            download_dir: PathBuf::from("tools").join("dl"),
            image_dir: PathBuf::from("image"),
            skip_adb: false,
            poll_interval_secs: 2,
            settle_delay_secs: 10,
            loader_filename: DEFAULT_LOADER_FILENAME.to_string(),
        }
    }
}

impl ToolboxConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ToolboxConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn adb_exe(&self) -> PathBuf {
        self.tools_dir.join("adb.exe")
    }

    pub fn fastboot_exe(&self) -> PathBuf {
        self.tools_dir.join("fastboot.exe")
    }

    pub fn sahara_exe(&self) -> PathBuf {
        self.tools_dir.join("QSaharaServer.exe")
    }

    pub fn fh_loader_exe(&self) -> PathBuf {
        self.tools_dir.join("fh_loader.exe")
    }

    /// Full path of the staged Firehose programmer.
    pub fn loader_file(&self) -> PathBuf {
        self.image_dir.join(&self.loader_filename)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    /// Base invocation with the toolbox directories prepended to PATH,
    /// the way every vendor tool is launched.
    pub fn tool_invocation(&self, program: impl Into<PathBuf>) -> Invocation {
        Invocation::new(program)
            .prepend_path(&self.tools_dir)
            .prepend_path(&self.download_dir)
    }
}

/// Eager existence check for a vendor executable.
///
/// The EDL-critical tools are addressed by explicit path, never
/// resolved via PATH, so a missing file is caught before any reboot.
pub fn require_tool(path: PathBuf) -> Result<PathBuf, FlashError> {
    if path.exists() {
        Ok(path)
    } else {
        let tool = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Err(FlashError::ExecutableNotFound { tool, path })
    }
}
