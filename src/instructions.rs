/// Fault bits from the error field of a status packet.
///
/// Feetech firmware sets bit 0 for input voltage, bit 1 for the angle sensor,
/// bit 2 for overheating, bit 3 for overcurrent and bit 5 for overload.
#[derive(PartialEq, Debug)]
pub struct StatusError {
    overload_error: bool,
    overcurrent_error: bool,
    overheating_error: bool,
    angle_sensor_error: bool,
    input_voltage_error: bool,
}

impl StatusError {
    pub(crate) fn check_error(flag: u8) -> Result<(), StatusError> {
        if flag == 0 {
            return Ok(());
        }
        Err(StatusError {
            input_voltage_error: flag & (1 << 0) != 0,
            angle_sensor_error: flag & (1 << 1) != 0,
            overheating_error: flag & (1 << 2) != 0,
            overcurrent_error: flag & (1 << 3) != 0,
            overload_error: flag & (1 << 5) != 0,
        })
    }
}

impl std::fmt::Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut description = String::new();
        if self.input_voltage_error {
            description.push_str("input_voltage_error ");
        }
        if self.angle_sensor_error {
            description.push_str("angle_sensor_error ");
        }
        if self.overheating_error {
            description.push_str("overheating_error ");
        }
        if self.overcurrent_error {
            description.push_str("overcurrent_error ");
        }
        if self.overload_error {
            description.push_str("overload_error ");
        }
        write!(f, "{}", description)
    }
}

impl std::error::Error for StatusError {}

pub(crate) fn calc_checksum(payload: &[u8]) -> u8 {
    let mut sum: u8 = 0;
    for b in payload {
        sum = sum.wrapping_add(*b);
    }
    !sum
}

pub(crate) trait Instruction: Send {
    fn serialize(&self) -> Vec<u8>;
}

pub(crate) struct ReadInstruction {
    id: u8,
    addr: u8,
    length: u8,
}

impl ReadInstruction {
    pub(crate) fn new(id: u8, addr: u8, length: u8) -> ReadInstruction {
        ReadInstruction { id, addr, length }
    }
}

impl Instruction for ReadInstruction {
    fn serialize(&self) -> Vec<u8> {
        let mut data = vec![
            0xFF, // header
            0xFF,
            self.id, // ID
            0x04, // Len
            0x02, // Instruction
            self.addr,
            self.length,
        ];
        let checksum = calc_checksum(&data[2..]);
        data.push(checksum);
        data
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub(crate) struct Ping {
    id: u8,
}

impl Ping {
    pub(crate) fn new(id: u8) -> Ping {
        Ping { id }
    }
}

impl Instruction for Ping {
    fn serialize(&self) -> Vec<u8> {
        let mut data = vec![
            0xFF, // header
            0xFF,
            self.id, // ID
            0x02, // Len
            0x01, // Instruction
        ];
        let checksum = calc_checksum(&data[2..]);
        data.push(checksum);
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_serialization() {
        let packet = Ping::new(1);
        let payload = packet.serialize();
        assert_eq!(payload, vec![0xFF_u8, 0xFF, 0x01, 0x02, 0x01, 0xFB])
    }

    #[test]
    fn read_instruction_serialization() {
        // baud-rate register of servo 1
        let read = ReadInstruction::new(1, 6, 1);
        let payload = read.serialize();
        let expected = vec![0xFF_u8, 0xFF, 0x01, 0x04, 0x02, 0x06, 0x01, 0xF1];
        assert_eq!(payload, expected);
    }

    #[test]
    fn model_read_serialization() {
        let read = ReadInstruction::new(1, 3, 2);
        let payload = read.serialize();
        let expected = vec![0xFF_u8, 0xFF, 0x01, 0x04, 0x02, 0x03, 0x02, 0xF3];
        assert_eq!(payload, expected);
    }

    #[test]
    fn clean_error_flag_is_ok() {
        assert!(StatusError::check_error(0).is_ok());
    }

    #[test]
    fn error_flag_reports_every_set_bit() {
        let error = StatusError::check_error(0b0010_0001).unwrap_err();
        assert_eq!(format!("{}", error), "input_voltage_error overload_error ");
    }
}
