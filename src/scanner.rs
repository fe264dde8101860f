//! Serial port enumeration.
//!
//! Lists the ports the operating system knows about so the user can spot the
//! servo adapter before pointing the bus tools at it.

use serialport::{available_ports, SerialPortType};
use tracing::{debug, info};

use crate::FeetechError;

/// One serial port as reported by the operating system.
///
/// USB metadata fields are `None` for ports that are not USB devices, and may
/// be `None` even for USB devices when the adapter does not report them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub device: String,
    pub description: Option<String>,
    /// `USB VID:PID=vvvv:pppp` for USB adapters.
    pub hardware_id: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl PortDescriptor {
    fn from_port_info(name: String, port_type: &SerialPortType) -> PortDescriptor {
        match port_type {
            SerialPortType::UsbPort(usb) => PortDescriptor {
                device: name,
                description: usb.product.clone(),
                hardware_id: Some(format!("USB VID:PID={:04X}:{:04X}", usb.vid, usb.pid)),
                manufacturer: usb.manufacturer.clone(),
                product: usb.product.clone(),
                serial_number: usb.serial_number.clone(),
            },
            _ => PortDescriptor {
                device: name,
                description: None,
                hardware_id: None,
                manufacturer: None,
                product: None,
                serial_number: None,
            },
        }
    }
}

/// List the serial ports attached to this machine.
///
/// Ports the OS cannot describe still show up, with empty metadata. An empty
/// list is a valid answer, not an error.
pub fn enumerate_ports() -> Result<Vec<PortDescriptor>, FeetechError> {
    let ports =
        available_ports().map_err(|e| FeetechError::EnumerationFailed(e.to_string()))?;
    info!("found {} serial port(s)", ports.len());
    let descriptors = ports
        .into_iter()
        .map(|port| {
            debug!("found port {}", port.port_name);
            PortDescriptor::from_port_info(port.port_name, &port.port_type)
        })
        .collect();
    Ok(descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    #[test]
    fn usb_port_mapping() {
        let port_type = SerialPortType::UsbPort(UsbPortInfo {
            vid: 0x1A86,
            pid: 0x7523,
            serial_number: Some("5740A".to_owned()),
            manufacturer: Some("wch.cn".to_owned()),
            product: Some("USB Serial".to_owned()),
        });
        let descriptor = PortDescriptor::from_port_info("/dev/ttyUSB0".to_owned(), &port_type);
        assert_eq!(descriptor.device, "/dev/ttyUSB0");
        assert_eq!(descriptor.hardware_id.as_deref(), Some("USB VID:PID=1A86:7523"));
        assert_eq!(descriptor.description.as_deref(), Some("USB Serial"));
        assert_eq!(descriptor.manufacturer.as_deref(), Some("wch.cn"));
        assert_eq!(descriptor.serial_number.as_deref(), Some("5740A"));
    }

    #[test]
    fn non_usb_port_has_no_metadata() {
        let descriptor =
            PortDescriptor::from_port_info("/dev/ttyS0".to_owned(), &SerialPortType::Unknown);
        assert_eq!(descriptor.device, "/dev/ttyS0");
        assert_eq!(descriptor.description, None);
        assert_eq!(descriptor.hardware_id, None);
    }

    #[test]
    fn enumeration_is_idempotent() {
        // no hardware changes between the two calls
        let first = enumerate_ports().unwrap();
        let second = enumerate_ports().unwrap();
        assert_eq!(first, second);
    }
}
