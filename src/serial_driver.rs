use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::time::{timeout, Duration};
use tokio_serial::SerialPortBuilderExt;
use tokio_util::codec::{Decoder, Encoder, Framed};
use tracing::trace;

use crate::instructions::{calc_checksum, Instruction, StatusError};

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FeetechError {
    #[error("connection timeout")]
    Timeout,
    #[error("invalid header on arriving packet")]
    HeaderError,
    #[error("checksum error on arriving packet")]
    ChecksumError,
    #[error("packet shorter than advertised")]
    TruncatedResponse,
    #[error("reading error")]
    ReadingError,
    #[error("response from a different servo id")]
    IdMismatch,
    #[error("servo reported fault: {0}")]
    ServoStatus(#[from] StatusError),
    #[error("failed to enumerate serial ports: {0}")]
    EnumerationFailed(String),
    #[error("serial port error: {0}")]
    SerialPort(#[from] tokio_serial::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(PartialEq, Debug)]
pub(crate) struct Status {
    id: u8,
    params: Vec<u8>,
}

impl Status {
    pub(crate) fn new(id: u8, params: Vec<u8>) -> Status {
        Status { id, params }
    }

    pub(crate) fn id(&self) -> u8 {
        self.id
    }

    pub(crate) fn param(&self, index: usize) -> Option<u8> {
        self.params.get(index).copied()
    }
}

pub(crate) struct FeetechProtocol;

impl Decoder for FeetechProtocol {
    type Item = Status;
    type Error = FeetechError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Status>, FeetechError> {
        if src.len() < 4 {
            return Ok(None);
        }
        let buffer = src.as_ref();
        if buffer[0] != 0xFF || buffer[1] != 0xFF {
            return Err(FeetechError::HeaderError);
        }
        let id = buffer[2];
        let len = buffer[3] as usize;
        // length field covers the error byte, the params and the checksum
        if len < 2 {
            return Err(FeetechError::TruncatedResponse);
        }
        if src.len() < 4 + len {
            return Ok(None);
        }
        let message = src.split_to(4 + len);

        StatusError::check_error(message[4])?;
        let params = message[5..5 + (len - 2)].to_vec();
        let checksum = calc_checksum(&message[2..5 + (len - 2)]);
        if message[4 + len - 1] != checksum {
            return Err(FeetechError::ChecksumError);
        }

        Ok(Some(Status::new(id, params)))
    }
}

impl Encoder<Box<dyn Instruction>> for FeetechProtocol {
    type Error = FeetechError;

    fn encode(&mut self, data: Box<dyn Instruction>, buf: &mut BytesMut) -> Result<(), FeetechError> {
        let msg = data.serialize();
        trace!("sending {:02X?}", msg);
        buf.reserve(msg.len());
        buf.put(msg.as_slice());
        Ok(())
    }
}

#[async_trait]
pub(crate) trait FramedDriver: Send + Sync {
    async fn send(&mut self, instruction: Box<dyn Instruction>) -> Result<(), FeetechError>;
    async fn receive(&mut self) -> Result<Status, FeetechError>;
}

pub(crate) const TIMEOUT: u64 = 100;

pub(crate) struct FramedSerialDriver {
    framed_port: Framed<tokio_serial::SerialStream, FeetechProtocol>,
}

impl FramedSerialDriver {
    pub(crate) fn new(port: &str, baud_rate: u32) -> Result<FramedSerialDriver, FeetechError> {
        let serial_port = tokio_serial::new(port, baud_rate)
            .timeout(Duration::from_millis(TIMEOUT))
            .open_native_async()?;
        Ok(FramedSerialDriver {
            framed_port: FeetechProtocol.framed(serial_port),
        })
    }
}

#[async_trait]
impl FramedDriver for FramedSerialDriver {
    async fn send(&mut self, instruction: Box<dyn Instruction>) -> Result<(), FeetechError> {
        self.framed_port.send(instruction).await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Status, FeetechError> {
        let response = timeout(Duration::from_millis(TIMEOUT), self.framed_port.next())
            .await
            .map_err(|_| FeetechError::Timeout)?
            .ok_or(FeetechError::ReadingError)??;
        trace!("received status from {}", response.id());
        Ok(response)
    }
}
