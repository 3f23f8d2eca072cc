//! Event system for UI decoupling.
//!
//! Allows CLI/GUI front ends to subscribe to session events without
//! tight coupling to the core logic.

use std::fmt;

use crate::mode::DeviceMode;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Session phases, from first contact through flashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdlPhase {
    /// Polling for a device to arrive in some mode.
    WaitingForDevice,
    /// Rebooting into EDL and gating on the loader file.
    EdlSetup,
    /// Sahara programmer upload in progress.
    ProgrammerUpload,
    /// Firehose partition read in progress.
    PartitionRead,
    /// Firehose partition write in progress.
    PartitionWrite,
    /// Full rawprogram/patch plan execution.
    Flashing,
    /// Fastboot variable round-trip for rollback indices.
    RollbackCheck,
    /// Device is resetting out of EDL.
    DeviceReset,
    /// All operations complete.
    Complete,
    /// Error state.
    Error,
}

impl fmt::Display for EdlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdlPhase::WaitingForDevice => write!(f, "Waiting for Device"),
            EdlPhase::EdlSetup => write!(f, "EDL Setup"),
            EdlPhase::ProgrammerUpload => write!(f, "Programmer Upload"),
            EdlPhase::PartitionRead => write!(f, "Partition Read"),
            EdlPhase::PartitionWrite => write!(f, "Partition Write"),
            EdlPhase::Flashing => write!(f, "Flashing"),
            EdlPhase::RollbackCheck => write!(f, "Rollback Check"),
            EdlPhase::DeviceReset => write!(f, "Device Reset"),
            EdlPhase::Complete => write!(f, "Complete"),
            EdlPhase::Error => write!(f, "Error"),
        }
    }
}

/// Events emitted by the device session.
#[derive(Debug, Clone)]
pub enum EdlEvent {
    /// A device was confirmed in the given mode.
    DeviceDetected {
        mode: DeviceMode,
        /// Serial port for EDL arrivals, `None` for ADB/Fastboot.
        port: Option<String>,
    },
    /// A reboot toward the given mode was requested (fire-and-forget).
    RebootRequested { target: DeviceMode },
    /// Phase changed.
    PhaseChanged { from: EdlPhase, to: EdlPhase },
    /// One poll attempt completed without a detection.
    Polling { target: DeviceMode, attempts: u64 },
    /// Log message.
    Log { level: LogLevel, message: String },
    /// Error occurred.
    Error { message: String },
    /// All operations completed successfully.
    Complete,
}

/// Observer trait for receiving session events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait EdlObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &EdlEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl EdlObserver for NullObserver {
    fn on_event(&self, _event: &EdlEvent) {
        // Do nothing
    }
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl EdlObserver for TracingObserver {
    fn on_event(&self, event: &EdlEvent) {
        match event {
            EdlEvent::DeviceDetected { mode, port } => match port {
                Some(p) => tracing::info!(mode = %mode, port = %p, "Device detected"),
                None => tracing::info!(mode = %mode, "Device detected"),
            },
            EdlEvent::RebootRequested { target } => {
                tracing::info!(target_mode = %target, "Reboot requested");
            }
            EdlEvent::PhaseChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Phase changed");
            }
            EdlEvent::Polling { target, attempts } => {
                tracing::debug!(target_mode = %target, attempts = attempts, "Still waiting");
            }
            EdlEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            EdlEvent::Error { message } => {
                tracing::error!("Error: {}", message);
            }
            EdlEvent::Complete => {
                tracing::info!("Operation complete");
            }
        }
    }
}
