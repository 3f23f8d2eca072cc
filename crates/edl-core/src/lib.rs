//! EDL-Core: Qualcomm EDL flashing orchestration in Rust.
//!
//! This crate drives a Qualcomm device through ADB, Fastboot and EDL
//! (Emergency Download, the 9008 mode) to dump, flash and recover
//! partitions. The wire protocols stay inside the vendor tools
//! (QSaharaServer, fh_loader); this crate owns mode transitions, port
//! detection and the exact command lines.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Exec**: Subprocess execution abstraction (host, mock)
//! - **Scan**: Serial-port enumeration and EDL (05C6:9008) detection
//! - **Poll**: Cooperative waiting with operator cancellation
//! - **Mode**: Device modes, EDL handles, A/B slot suffixes
//! - **Sahara / Firehose**: The two vendor-tool command stages
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: High-level orchestrator
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use edl_core::{DeviceSession, PartitionTarget, ToolboxConfig};
//!
//! let mut session = DeviceSession::new(ToolboxConfig::default());
//! let target = PartitionTarget::new(4, "2048", "0");
//! session
//!     .dump_partition(Path::new("modemst1.img"), &target)
//!     .expect("dump failed");
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod exec;
pub mod firehose;
pub mod mode;
pub mod poll;
pub mod prompt;
pub mod sahara;
pub mod scan;
pub mod session;

// Re-exports for convenience
pub use config::{DEFAULT_LOADER_FILENAME, ToolboxConfig};
pub use error::{FlashError, Result};
pub use events::{EdlEvent, EdlObserver, EdlPhase, LogLevel, NullObserver, TracingObserver};
pub use exec::{CommandOutput, CommandRunner, ExecError, HostRunner, Invocation, MockRunner};
pub use firehose::{FirehoseExecutor, FlashPlan, PartitionTarget};
pub use mode::{DeviceMode, EdlHandle, SlotSuffix};
pub use poll::{CancelToken, WaitCancelled, wait_until};
pub use prompt::{MockPrompt, OperatorPrompt, StdinPrompt};
pub use sahara::SaharaLoader;
pub use scan::{MockScanner, PortInfo, PortScanner, SerialScanner};
pub use session::DeviceSession;
