//! Serial port enumeration and EDL device classification.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::warn;

/// Hardware-id fragment of a Qualcomm device in Emergency Download mode.
const EDL_VID_PID: &str = "VID:PID=05C6:9008";

/// One enumerated serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Platform device path (`COM7`, `/dev/ttyUSB0`, ...).
    pub device_path: String,
    /// Human-readable description from the driver.
    pub description: String,
    /// Hardware id string (`USB VID:PID=05C6:9008 SER=...`).
    pub hardware_id: String,
}

impl PortInfo {
    pub fn new(device_path: &str, description: &str, hardware_id: &str) -> Self {
        Self {
            device_path: device_path.to_string(),
            description: description.to_string(),
            hardware_id: hardware_id.to_string(),
        }
    }

    /// Whether this port is a Qualcomm EDL (9008) endpoint.
    ///
    /// The description check is a case-sensitive substring match on
    /// both "Qualcomm" and "9008", matching what the 9008 driver
    /// reports. The hardware id check is case-insensitive.
    pub fn is_edl(&self) -> bool {
        (self.description.contains("Qualcomm") && self.description.contains("9008"))
            || self.hardware_id.to_uppercase().contains(EDL_VID_PID)
    }
}

/// Abstract port enumeration interface.
///
/// This trait enables:
/// - Production implementation over the serialport crate
/// - Mock implementation for unit testing session logic
pub trait PortScanner: Send + Sync {
    /// Enumerate serial ports. Enumeration trouble is reported as an
    /// empty list so callers can keep polling.
    fn list_ports(&self) -> Vec<PortInfo>;

    /// Device path of the first EDL port, if any is present.
    ///
    /// First match wins; ordering of the underlying enumeration is
    /// platform-defined and not itself a contract.
    fn find_edl_port(&self) -> Option<String> {
        self.list_ports()
            .into_iter()
            .find(PortInfo::is_edl)
            .map(|p| p.device_path)
    }
}

/// Scanner backed by the serialport crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialScanner;

impl SerialScanner {
    pub fn new() -> Self {
        Self
    }
}

impl PortScanner for SerialScanner {
    fn list_ports(&self) -> Vec<PortInfo> {
        let ports = match serialport::available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                warn!(error = %e, "Serial enumeration failed");
                return Vec::new();
            }
        };

        ports
            .into_iter()
            .map(|p| {
                let (description, hardware_id) = match &p.port_type {
                    serialport::SerialPortType::UsbPort(usb) => {
                        let mut hwid = format!("USB VID:PID={:04X}:{:04X}", usb.vid, usb.pid);
                        if let Some(serial) = &usb.serial_number {
                            hwid.push_str(&format!(" SER={serial}"));
                        }
                        (usb.product.clone().unwrap_or_default(), hwid)
                    }
                    other => (String::new(), format!("{other:?}")),
                };
                PortInfo {
                    device_path: p.port_name,
                    description,
                    hardware_id,
                }
            })
            .collect()
    }
}

/// Mock scanner returning scripted enumeration snapshots.
///
/// Pops one snapshot per call and keeps returning the final snapshot
/// once the script is exhausted, so a port that has "arrived" stays
/// visible to later polls. Clones share the same script.
#[derive(Clone)]
pub struct MockScanner {
    snapshots: Arc<Mutex<VecDeque<Vec<PortInfo>>>>,
    last: Arc<Mutex<Vec<PortInfo>>>,
}

impl MockScanner {
    /// Scanner that always returns the same ports.
    pub fn fixed(ports: Vec<PortInfo>) -> Self {
        Self {
            snapshots: Arc::new(Mutex::new(VecDeque::new())),
            last: Arc::new(Mutex::new(ports)),
        }
    }

    /// Scanner that returns each snapshot in turn, then repeats the
    /// final one.
    pub fn sequence(snapshots: Vec<Vec<PortInfo>>) -> Self {
        Self {
            snapshots: Arc::new(Mutex::new(snapshots.into())),
            last: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Scanner that never sees any port.
    pub fn empty() -> Self {
        Self::fixed(Vec::new())
    }
}

impl PortScanner for MockScanner {
    fn list_ports(&self) -> Vec<PortInfo> {
        let mut queue = self.snapshots.lock().unwrap();
        if let Some(snapshot) = queue.pop_front() {
            *self.last.lock().unwrap() = snapshot.clone();
            snapshot
        } else {
            self.last.lock().unwrap().clone()
        }
    }
}
