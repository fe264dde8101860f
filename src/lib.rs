//! Diagnostics for Feetech SCS/STS serial bus servos.
//!
//! Finds the serial adapter, works out which baud rate a servo listens on and
//! reads back its configuration registers. Useful when a bus has stopped
//! answering and the servo IDs or baud rates are not known for sure.
//!
//! ```no_run
//! use feetech_scan::probe::find_motor;
//!
//! #[tokio::main]
//! async fn main() {
//!     let checks = find_motor("/dev/ttyUSB0", 1).await;
//!     for check in checks {
//!         println!("answers at {} baud", check.communication_baud_rate);
//!     }
//! }
//! ```

mod instructions;
mod serial_driver;

pub mod probe;
pub mod scanner;

pub use crate::instructions::StatusError;
pub use crate::serial_driver::FeetechError;

use crate::instructions::{Ping, ReadInstruction};
use crate::serial_driver::{FramedDriver, FramedSerialDriver, Status};

/// Factory default baud rate of STS series servos.
pub const DEFAULT_BAUD_RATE: u32 = 1_000_000;

// EPROM table
const FIRMWARE_MAJOR: u8 = 0;
const FIRMWARE_MINOR: u8 = 1;
const MODEL_NUMBER: u8 = 3;
const ID: u8 = 5;
const BAUD_RATE: u8 = 6;
const MIN_POSITION_LIMIT: u8 = 9;
const MAX_POSITION_LIMIT: u8 = 11;

// SRAM table
const TORQUE_ENABLE: u8 = 40;
const PRESENT_POSITION: u8 = 56;

/// Read-only driver for a bus of Feetech servos behind one serial adapter.
pub struct FeetechDriver {
    driver: Box<dyn FramedDriver>,
}

impl FeetechDriver {
    pub fn new(port: &str) -> Result<FeetechDriver, FeetechError> {
        FeetechDriver::with_baud_rate(port, DEFAULT_BAUD_RATE)
    }

    pub fn with_baud_rate(port: &str, baud_rate: u32) -> Result<FeetechDriver, FeetechError> {
        Ok(FeetechDriver {
            driver: Box::new(FramedSerialDriver::new(port, baud_rate)?),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_driver(driver: Box<dyn FramedDriver>) -> FeetechDriver {
        FeetechDriver { driver }
    }

    /// Receive a status packet, requiring it to come from the addressed
    /// servo. A late frame from an earlier exchange reads as no answer.
    async fn receive_from(&mut self, id: u8) -> Result<Status, FeetechError> {
        let response = self.driver.receive().await?;
        if response.id() != id {
            return Err(FeetechError::IdMismatch);
        }
        Ok(response)
    }

    /// Ping a servo and report its model number.
    ///
    /// A servo acknowledges a ping with an empty status packet; the model
    /// number comes from a follow-up read of the model register. Any fault
    /// bit in the acknowledgement fails the ping.
    pub async fn ping(&mut self, id: u8) -> Result<u16, FeetechError> {
        self.driver.send(Box::new(Ping::new(id))).await?;
        self.receive_from(id).await?;
        self.read_model_number(id).await
    }

    pub async fn read_u8(&mut self, id: u8, addr: u8) -> Result<u8, FeetechError> {
        self.driver
            .send(Box::new(ReadInstruction::new(id, addr, 1)))
            .await?;
        let response = self.receive_from(id).await?;
        response.param(0).ok_or(FeetechError::TruncatedResponse)
    }

    pub async fn read_u16(&mut self, id: u8, addr: u8) -> Result<u16, FeetechError> {
        self.driver
            .send(Box::new(ReadInstruction::new(id, addr, 2)))
            .await?;
        let response = self.receive_from(id).await?;
        let low = response.param(0).ok_or(FeetechError::TruncatedResponse)?;
        let high = response.param(1).ok_or(FeetechError::TruncatedResponse)?;
        // STS words travel low byte first
        Ok(u16::from_le_bytes([low, high]))
    }

    pub async fn read_model_number(&mut self, id: u8) -> Result<u16, FeetechError> {
        self.read_u16(id, MODEL_NUMBER).await
    }

    pub async fn read_firmware_version(&mut self, id: u8) -> Result<(u8, u8), FeetechError> {
        let major = self.read_u8(id, FIRMWARE_MAJOR).await?;
        let minor = self.read_u8(id, FIRMWARE_MINOR).await?;
        Ok((major, minor))
    }

    /// Read the ID register. Yields the same value the servo was addressed
    /// with unless its EPROM disagrees with the bus.
    pub async fn read_configured_id(&mut self, id: u8) -> Result<u8, FeetechError> {
        self.read_u8(id, ID).await
    }

    /// Read the raw baud-rate register. See
    /// [`probe::decode_baud_register`](crate::probe::decode_baud_register)
    /// for the meaning of the value.
    pub async fn read_baud_rate_register(&mut self, id: u8) -> Result<u8, FeetechError> {
        self.read_u8(id, BAUD_RATE).await
    }

    pub async fn read_position_limits(&mut self, id: u8) -> Result<(u16, u16), FeetechError> {
        let min = self.read_u16(id, MIN_POSITION_LIMIT).await?;
        let max = self.read_u16(id, MAX_POSITION_LIMIT).await?;
        Ok((min, max))
    }

    pub async fn read_present_position(&mut self, id: u8) -> Result<u16, FeetechError> {
        self.read_u16(id, PRESENT_POSITION).await
    }

    pub async fn read_torque_enabled(&mut self, id: u8) -> Result<bool, FeetechError> {
        Ok(self.read_u8(id, TORQUE_ENABLE).await? != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::Instruction;
    use crate::serial_driver::Status;
    use async_trait::async_trait;
    use std::sync::mpsc::{channel, Sender};

    struct MockSerialPort {
        written_data: Sender<Vec<u8>>,
        mock_read_data: Vec<Status>,
    }

    impl MockSerialPort {
        fn new(mock_read_data: Vec<Status>, written_data: Sender<Vec<u8>>) -> MockSerialPort {
            MockSerialPort {
                written_data,
                mock_read_data,
            }
        }
    }

    #[async_trait]
    impl FramedDriver for MockSerialPort {
        async fn send(&mut self, instruction: Box<dyn Instruction>) -> Result<(), FeetechError> {
            let payload = instruction.serialize();
            self.written_data.send(payload).unwrap();
            Ok(())
        }

        async fn receive(&mut self) -> Result<Status, FeetechError> {
            if self.mock_read_data.is_empty() {
                return Err(FeetechError::Timeout);
            }
            Ok(self.mock_read_data.remove(0))
        }
    }

    #[tokio::test]
    async fn ping_reads_model_number() {
        let (tx, rx) = channel();
        let mock_port = MockSerialPort::new(
            vec![Status::new(1, vec![]), Status::new(1, vec![0x09, 0x03])],
            tx,
        );
        let mut driver = FeetechDriver::with_driver(Box::new(mock_port));
        let model_number = driver.ping(1).await.unwrap();
        // sts3215
        assert_eq!(model_number, 777);
        assert_eq!(rx.try_recv().unwrap(), vec![0xFF, 0xFF, 0x01, 0x02, 0x01, 0xFB]);
        assert_eq!(
            rx.try_recv().unwrap(),
            vec![0xFF, 0xFF, 0x01, 0x04, 0x02, 0x03, 0x02, 0xF3]
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn ping_fails_on_silent_bus() {
        let (tx, _rx) = channel();
        let mock_port = MockSerialPort::new(vec![], tx);
        let mut driver = FeetechDriver::with_driver(Box::new(mock_port));
        let res = driver.ping(1).await;
        assert!(matches!(res, Err(FeetechError::Timeout)));
    }

    #[tokio::test]
    async fn read_u16_is_little_endian() {
        let (tx, _rx) = channel();
        let mock_port = MockSerialPort::new(vec![Status::new(1, vec![0xFF, 0x0F])], tx);
        let mut driver = FeetechDriver::with_driver(Box::new(mock_port));
        let value = driver.read_u16(1, PRESENT_POSITION).await.unwrap();
        assert_eq!(value, 4095);
    }

    #[tokio::test]
    async fn read_u8_requires_a_param() {
        let (tx, _rx) = channel();
        let mock_port = MockSerialPort::new(vec![Status::new(1, vec![])], tx);
        let mut driver = FeetechDriver::with_driver(Box::new(mock_port));
        let res = driver.read_u8(1, BAUD_RATE).await;
        assert!(matches!(res, Err(FeetechError::TruncatedResponse)));
    }

    #[tokio::test]
    async fn ping_rejects_response_from_another_id() {
        let (tx, _rx) = channel();
        // late acknowledgement from an earlier exchange
        let mock_port = MockSerialPort::new(vec![Status::new(2, vec![])], tx);
        let mut driver = FeetechDriver::with_driver(Box::new(mock_port));
        let res = driver.ping(1).await;
        assert!(matches!(res, Err(FeetechError::IdMismatch)));
    }

    #[tokio::test]
    async fn read_rejects_response_from_another_id() {
        let (tx, _rx) = channel();
        let mock_port = MockSerialPort::new(vec![Status::new(2, vec![5])], tx);
        let mut driver = FeetechDriver::with_driver(Box::new(mock_port));
        let res = driver.read_u8(1, BAUD_RATE).await;
        assert!(matches!(res, Err(FeetechError::IdMismatch)));
    }

    #[tokio::test]
    async fn read_torque_enabled_maps_nonzero_to_true() {
        let (tx, _rx) = channel();
        let mock_port = MockSerialPort::new(
            vec![Status::new(1, vec![1]), Status::new(1, vec![0])],
            tx,
        );
        let mut driver = FeetechDriver::with_driver(Box::new(mock_port));
        assert!(driver.read_torque_enabled(1).await.unwrap());
        assert!(!driver.read_torque_enabled(1).await.unwrap());
    }
}
