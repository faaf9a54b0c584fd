// Feetech STS servo bus, used here for open-loop wheel drive
//
// Packet: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
// Length counts instruction + params + checksum. Checksum is !sum(ID..params).

use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BAUDRATE: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Position steps per output shaft revolution
pub const STEPS_PER_REVOLUTION: u16 = 4096;

/// Full-scale PWM command in open-loop mode
pub const PWM_FULL_SCALE: u16 = 1000;

const HEADER: [u8; 2] = [0xFF, 0xFF];

#[repr(u8)]
#[derive(Debug, Clone, Copy)]
enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
}

/// Registers touched by the drivetrain
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Register {
    ModelNumber = 3,      // 2 bytes, read-only
    OperatingMode = 33,   // 0=position, 1=velocity, 2=PWM, 3=step
    TorqueEnable = 40,    // 0=off, 1=on
    GoalTime = 44,        // 2 bytes; PWM duty in open-loop mode
    Lock = 55,            // 0=unlocked, 1=locked
    PresentPosition = 56, // 2 bytes, 0..4095
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperatingMode {
    Pwm = 2,
}

#[derive(Debug, thiserror::Error)]
pub enum FeetechError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bad status packet from servo {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch from servo {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Servo {id} reported error flags 0x{status:02X}")]
    ServoError { id: u8, status: u8 },

    #[error("Servo {id} did not answer")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, FeetechError>;

fn checksum(body: &[u8]) -> u8 {
    !body.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

fn encode_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(params.len() + 6);
    packet.extend_from_slice(&HEADER);
    packet.extend_from_slice(&[id, (params.len() + 2) as u8, instruction as u8]);
    packet.extend_from_slice(params);
    packet.push(checksum(&packet[HEADER.len()..]));
    packet
}

/// Validate a status packet body (everything after the header) and return its params
fn decode_status(expected_id: u8, body: &[u8]) -> Result<Vec<u8>> {
    // id, length, error, checksum at minimum
    if body.len() < 4 {
        return Err(FeetechError::InvalidResponse {
            id: expected_id,
            reason: format!("Short packet: {} bytes", body.len()),
        });
    }

    let (id, length) = (body[0], body[1] as usize);
    if id != expected_id {
        return Err(FeetechError::InvalidResponse {
            id: expected_id,
            reason: format!("Answer came from servo {}", id),
        });
    }
    if body.len() != length + 2 {
        return Err(FeetechError::InvalidResponse {
            id,
            reason: format!("Length field {} but {} bytes follow", length, body.len() - 2),
        });
    }

    let (payload, received) = body.split_at(body.len() - 1);
    if checksum(payload) != received[0] {
        return Err(FeetechError::ChecksumMismatch { id });
    }

    let status = payload[2];
    if status != 0 {
        return Err(FeetechError::ServoError { id, status });
    }
    Ok(payload[3..].to_vec())
}

/// Open-loop PWM duty: magnitude in bits 0-9, direction in bit 10
pub fn encode_pwm(duty: i16) -> u16 {
    let magnitude = duty.unsigned_abs().min(PWM_FULL_SCALE);
    if duty < 0 {
        magnitude | (1 << 10)
    } else {
        magnitude
    }
}

/// Half-duplex connection to a chain of STS servos
pub struct FeetechBus {
    port: Box<dyn SerialPort>,
}

impl FeetechBus {
    pub fn open(port_name: &str, baudrate: u32) -> Result<Self> {
        debug!("Opening servo bus {} at {} baud", port_name, baudrate);
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;
        Ok(Self { port })
    }

    fn transact(&mut self, id: u8, instruction: Instruction, params: &[u8]) -> Result<Vec<u8>> {
        let packet = encode_packet(id, instruction, params);
        self.port.write_all(&packet)?;
        self.port.flush()?;
        self.read_status(id)
    }

    fn read_status(&mut self, id: u8) -> Result<Vec<u8>> {
        let mut header = [0u8; 2];
        self.port.read_exact(&mut header).map_err(|e| match e.kind() {
            std::io::ErrorKind::TimedOut => FeetechError::Timeout { id },
            _ => FeetechError::Io(e),
        })?;
        if header != HEADER {
            return Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Bad header {:02X?}", header),
            });
        }

        let mut body = vec![0u8; 2];
        self.port.read_exact(&mut body)?;
        let length = body[1] as usize;
        body.resize(2 + length, 0);
        self.port.read_exact(&mut body[2..])?;

        decode_status(id, &body)
    }

    pub fn ping(&mut self, id: u8) -> Result<bool> {
        match self.transact(id, Instruction::Ping, &[]) {
            Ok(_) => Ok(true),
            Err(FeetechError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        debug!("Servo {} {:?} <- {}", id, register, value);
        self.transact(id, Instruction::Write, &[register as u8, value])?;
        Ok(())
    }

    pub fn write_u16(&mut self, id: u8, register: Register, value: u16) -> Result<()> {
        debug!("Servo {} {:?} <- {}", id, register, value);
        let [lo, hi] = value.to_le_bytes();
        self.transact(id, Instruction::Write, &[register as u8, lo, hi])?;
        Ok(())
    }

    pub fn read_u16(&mut self, id: u8, register: Register) -> Result<u16> {
        let data = self.transact(id, Instruction::Read, &[register as u8, 2])?;
        match data.as_slice() {
            [lo, hi, ..] => Ok(u16::from_le_bytes([*lo, *hi])),
            _ => Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Expected 2 data bytes, got {}", data.len()),
            }),
        }
    }

    pub fn set_torque(&mut self, id: u8, enabled: bool) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, enabled as u8)?;
        self.write_u8(id, Register::Lock, enabled as u8)
    }

    /// Switch a servo to open-loop PWM so it behaves as a plain DC gearmotor
    pub fn configure_pwm_mode(&mut self, id: u8) -> Result<()> {
        self.set_torque(id, false)?;
        self.write_u8(id, Register::OperatingMode, OperatingMode::Pwm as u8)?;
        self.set_torque(id, true)
    }

    pub fn set_pwm(&mut self, id: u8, duty: i16) -> Result<()> {
        self.write_u16(id, Register::GoalTime, encode_pwm(duty))
    }

    pub fn position(&mut self, id: u8) -> Result<u16> {
        Ok(self.read_u16(id, Register::PresentPosition)? % STEPS_PER_REVOLUTION)
    }

    pub fn model_number(&mut self, id: u8) -> Result<u16> {
        self.read_u16(id, Register::ModelNumber)
    }
}
