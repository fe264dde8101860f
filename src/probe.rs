//! Baud rate probing and bus discovery sweeps.
//!
//! Every routine here owns its connection lifecycle. A fresh handle is opened
//! for each candidate baud rate and dropped before the next candidate, so a
//! failed attempt never leaves the port in a half-configured state.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::{FeetechDriver, FeetechError};

/// Baud rates worth trying against an unknown serial device, slowest first.
pub const COMMON_BAUD_RATES: [u32; 8] = [
    9_600, 19_200, 38_400, 57_600, 115_200, 250_000, 500_000, 1_000_000,
];

/// Baud rates Feetech firmware can be configured to, fastest first.
///
/// The order doubles as the register code table: the baud-rate register
/// holds the index into this list, so value 0 selects 1 MBd and value 7
/// selects 19200 Bd.
pub const FEETECH_BAUD_RATES: [u32; 8] = [
    1_000_000, 500_000, 250_000, 128_000, 115_200, 57_600, 38_400, 19_200,
];

/// Bus IDs covered by [`scan_bus`].
pub const SCAN_ID_RANGE: RangeInclusive<u8> = 1..=20;

const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Decode the baud-rate register into bits per second.
///
/// `None` for values outside the code table.
pub fn decode_baud_register(value: u8) -> Option<u32> {
    FEETECH_BAUD_RATES.get(usize::from(value)).copied()
}

/// Model numbers reported by the servos this tool is usually pointed at.
pub const MODEL_NUMBERS: [(&str, u16); 4] = [
    ("scs0009", 1284),
    ("sm8512bl", 11272),
    ("sts3215", 777),
    ("sts3250", 2825),
];

/// Product name for a model number, if it is a known one.
pub fn model_name(model_number: u16) -> Option<&'static str> {
    MODEL_NUMBERS
        .iter()
        .find(|(_, number)| *number == model_number)
        .map(|(name, _)| *name)
}

/// Outcome of opening a port at one candidate baud rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortProbe {
    pub baud_rate: u32,
    /// `Err` carries the reason the open failed.
    pub outcome: Result<(), String>,
}

/// One successful exchange with a servo during a baud rate sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaudCheck {
    /// Rate the bus was driven at when the servo answered.
    pub communication_baud_rate: u32,
    /// Rate selected by the baud-rate register, when readable and known.
    pub configured_baud_rate: Option<u32>,
    /// Raw baud-rate register value, when readable.
    pub register_value: Option<u8>,
    pub model_number: u16,
    pub model_name: Option<&'static str>,
}

impl BaudCheck {
    /// Whether the configured rate agrees with the rate that worked.
    ///
    /// Disagreement happens on real hardware and is worth reporting, but it
    /// is not a failure: the servo did answer.
    pub fn matches_configured(&self) -> bool {
        self.configured_baud_rate == Some(self.communication_baud_rate)
    }
}

/// A servo discovered during a bus scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotorRecord {
    pub id: u8,
    pub model_number: u16,
    pub model_name: Option<&'static str>,
    /// Rate the servo answered at.
    pub baud_rate: u32,
}

/// Configuration registers of a located servo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotorRegisters {
    pub baud_rate_register: u8,
    pub id: u8,
    pub firmware_major: u8,
    pub firmware_minor: u8,
    pub min_position_limit: u16,
    pub max_position_limit: u16,
    pub present_position: u16,
    pub torque_enabled: bool,
}

impl MotorRegisters {
    /// Baud rate the register value selects, if it is a known code.
    pub fn configured_baud_rate(&self) -> Option<u32> {
        decode_baud_register(self.baud_rate_register)
    }
}

/// Result of [`inspect_motor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotorInspection {
    /// Rate the servo answered at.
    pub baud_rate: u32,
    pub model_number: u16,
    pub model_name: Option<&'static str>,
    /// `None` when the servo answered the ping but the register dump failed.
    pub registers: Option<MotorRegisters>,
}

/// Try opening `port` at every rate in [`COMMON_BAUD_RATES`].
///
/// This only checks that the OS accepts the device at each rate. It does not
/// talk the servo protocol, so it works against any serial device.
pub fn probe_baud_rates(port: &str) -> Vec<PortProbe> {
    probe_rates_with(
        |baud_rate| {
            serialport::new(port, baud_rate)
                .timeout(PROBE_TIMEOUT)
                .open()
                .map(drop)
        },
        &COMMON_BAUD_RATES,
    )
}

fn probe_rates_with<F>(mut open: F, baud_rates: &[u32]) -> Vec<PortProbe>
where
    F: FnMut(u32) -> Result<(), serialport::Error>,
{
    let mut probes = Vec::with_capacity(baud_rates.len());
    for &baud_rate in baud_rates {
        debug!("raw open at {} baud", baud_rate);
        let outcome = match open(baud_rate) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("open at {} baud failed: {}", baud_rate, e);
                Err(e.to_string())
            }
        };
        probes.push(PortProbe { baud_rate, outcome });
    }
    probes
}

/// Sweep [`FEETECH_BAUD_RATES`] looking for the servo with the given ID.
///
/// Returns one record per rate the servo answered at, in sweep order; a servo
/// can answer at several rates, and the first record is the representative
/// one. Empty when the servo never answered.
pub async fn find_motor(port: &str, id: u8) -> Vec<BaudCheck> {
    find_motor_with(
        |baud_rate| FeetechDriver::with_baud_rate(port, baud_rate),
        id,
        &FEETECH_BAUD_RATES,
    )
    .await
}

async fn find_motor_with<F>(mut open: F, id: u8, baud_rates: &[u32]) -> Vec<BaudCheck>
where
    F: FnMut(u32) -> Result<FeetechDriver, FeetechError>,
{
    let mut checks = Vec::new();
    for &baud_rate in baud_rates {
        debug!("pinging id {} at {} baud", id, baud_rate);
        let mut driver = match open(baud_rate) {
            Ok(driver) => driver,
            Err(e) => {
                warn!("skipping {} baud: {}", baud_rate, e);
                continue;
            }
        };
        let model_number = match driver.ping(id).await {
            Ok(model_number) => model_number,
            Err(e) => {
                trace!("no answer at {} baud: {}", baud_rate, e);
                continue;
            }
        };
        info!("servo {} answered at {} baud", id, baud_rate);
        let register_value = match driver.read_baud_rate_register(id).await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("could not read baud-rate register: {}", e);
                None
            }
        };
        let check = BaudCheck {
            communication_baud_rate: baud_rate,
            configured_baud_rate: register_value.and_then(decode_baud_register),
            register_value,
            model_number,
            model_name: model_name(model_number),
        };
        if check.register_value.is_some() && !check.matches_configured() {
            info!(
                "servo {} is configured for {:?} baud but answered at {}",
                id, check.configured_baud_rate, baud_rate
            );
        }
        checks.push(check);
    }
    checks
}

/// Ping every ID in [`SCAN_ID_RANGE`] at every rate in [`FEETECH_BAUD_RATES`].
///
/// The result maps each baud rate to the servos that answered at it; rates
/// with no responders are left out.
pub async fn scan_bus(port: &str) -> BTreeMap<u32, Vec<MotorRecord>> {
    scan_bus_with(
        |baud_rate| FeetechDriver::with_baud_rate(port, baud_rate),
        SCAN_ID_RANGE,
        &FEETECH_BAUD_RATES,
    )
    .await
}

async fn scan_bus_with<F>(
    mut open: F,
    ids: RangeInclusive<u8>,
    baud_rates: &[u32],
) -> BTreeMap<u32, Vec<MotorRecord>>
where
    F: FnMut(u32) -> Result<FeetechDriver, FeetechError>,
{
    let mut found = BTreeMap::new();
    for &baud_rate in baud_rates {
        debug!("scanning ids {:?} at {} baud", ids, baud_rate);
        let mut driver = match open(baud_rate) {
            Ok(driver) => driver,
            Err(e) => {
                warn!("skipping {} baud: {}", baud_rate, e);
                continue;
            }
        };
        let mut motors = Vec::new();
        for id in ids.clone() {
            match driver.ping(id).await {
                Ok(model_number) => {
                    info!("found servo {} at {} baud", id, baud_rate);
                    motors.push(MotorRecord {
                        id,
                        model_number,
                        model_name: model_name(model_number),
                        baud_rate,
                    });
                }
                Err(e) => trace!("id {} silent at {} baud: {}", id, baud_rate, e),
            }
        }
        if !motors.is_empty() {
            found.insert(baud_rate, motors);
        }
    }
    found
}

/// Locate one servo and dump its configuration registers.
///
/// Stops at the first rate the servo answers at. A register read failing
/// after a successful ping leaves `registers` empty; the servo still counts
/// as found.
pub async fn inspect_motor(port: &str, id: u8) -> Option<MotorInspection> {
    inspect_motor_with(
        |baud_rate| FeetechDriver::with_baud_rate(port, baud_rate),
        id,
        &FEETECH_BAUD_RATES,
    )
    .await
}

async fn inspect_motor_with<F>(
    mut open: F,
    id: u8,
    baud_rates: &[u32],
) -> Option<MotorInspection>
where
    F: FnMut(u32) -> Result<FeetechDriver, FeetechError>,
{
    for &baud_rate in baud_rates {
        debug!("pinging id {} at {} baud", id, baud_rate);
        let mut driver = match open(baud_rate) {
            Ok(driver) => driver,
            Err(e) => {
                warn!("skipping {} baud: {}", baud_rate, e);
                continue;
            }
        };
        let model_number = match driver.ping(id).await {
            Ok(model_number) => model_number,
            Err(e) => {
                trace!("no answer at {} baud: {}", baud_rate, e);
                continue;
            }
        };
        info!("servo {} found at {} baud", id, baud_rate);
        let registers = match read_registers(&mut driver, id).await {
            Ok(registers) => Some(registers),
            Err(e) => {
                warn!("register dump of servo {} failed: {}", id, e);
                None
            }
        };
        return Some(MotorInspection {
            baud_rate,
            model_number,
            model_name: model_name(model_number),
            registers,
        });
    }
    None
}

async fn read_registers(
    driver: &mut FeetechDriver,
    id: u8,
) -> Result<MotorRegisters, FeetechError> {
    let baud_rate_register = driver.read_baud_rate_register(id).await?;
    let configured_id = driver.read_configured_id(id).await?;
    let (firmware_major, firmware_minor) = driver.read_firmware_version(id).await?;
    let (min_position_limit, max_position_limit) = driver.read_position_limits(id).await?;
    let present_position = driver.read_present_position(id).await?;
    let torque_enabled = driver.read_torque_enabled(id).await?;
    Ok(MotorRegisters {
        baud_rate_register,
        id: configured_id,
        firmware_major,
        firmware_minor,
        min_position_limit,
        max_position_limit,
        present_position,
        torque_enabled,
    })
}
