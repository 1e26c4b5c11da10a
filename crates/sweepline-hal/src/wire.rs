//! Byte layout of the drive-board protocol.
//!
//! # Frames
//!
//! | Direction | Bytes | Layout |
//! |---|---|---|
//! | board → host | 24 | `0x54`, 3 × f32 LE (front, left, right cm), 3 × bool (stair, bin, humidity), 2 × i32 LE (encoder A, B) |
//! | host → board | 6 | `0xF0 0x0F <left_speed> <right_speed> <left_rev> <right_rev>` |
//! | host → board | 6 | `0x7A 0xF3 <brush_on> <suction_on> 0x00 0x00` |
//!
//! The board reports encoder positions with the opposite sign convention to
//! the host; decoding negates both.

use sweepline_types::{ActuatorState, MotorCommand, SensorSnapshot};

/// First byte of a telemetry frame.
pub const TELEMETRY_HEADER: u8 = 0x54;
/// Header plus payload.
pub const TELEMETRY_FRAME_LEN: usize = 24;
/// Payload following the header.
pub const TELEMETRY_PAYLOAD_LEN: usize = TELEMETRY_FRAME_LEN - 1;

pub const MOTOR_HEADER: [u8; 2] = [0xF0, 0x0F];
pub const ACTUATOR_HEADER: [u8; 2] = [0x7A, 0xF3];
pub const COMMAND_FRAME_LEN: usize = 6;

// ────────────────────────────────────────────────────────────────────────────
// Telemetry
// ────────────────────────────────────────────────────────────────────────────

/// Decode the 23-byte payload that follows a [`TELEMETRY_HEADER`].
pub fn decode_telemetry(payload: &[u8; TELEMETRY_PAYLOAD_LEN]) -> SensorSnapshot {
    SensorSnapshot {
        us_front: f32::from_le_bytes(word(payload, 0)),
        us_left: f32::from_le_bytes(word(payload, 4)),
        us_right: f32::from_le_bytes(word(payload, 8)),
        stair_drop: payload[12] != 0,
        bin_level: payload[13] != 0,
        humidity: payload[14] != 0,
        encoder_a: i32::from_le_bytes(word(payload, 15)).wrapping_neg(),
        encoder_b: i32::from_le_bytes(word(payload, 19)).wrapping_neg(),
    }
}

/// Encode a full telemetry frame as the drive board would send it.
///
/// Used by the simulator; the host never transmits telemetry.
pub fn encode_telemetry(snapshot: &SensorSnapshot) -> [u8; TELEMETRY_FRAME_LEN] {
    let mut frame = [0u8; TELEMETRY_FRAME_LEN];
    frame[0] = TELEMETRY_HEADER;
    frame[1..5].copy_from_slice(&snapshot.us_front.to_le_bytes());
    frame[5..9].copy_from_slice(&snapshot.us_left.to_le_bytes());
    frame[9..13].copy_from_slice(&snapshot.us_right.to_le_bytes());
    frame[13] = u8::from(snapshot.stair_drop);
    frame[14] = u8::from(snapshot.bin_level);
    frame[15] = u8::from(snapshot.humidity);
    frame[16..20].copy_from_slice(&snapshot.encoder_a.wrapping_neg().to_le_bytes());
    frame[20..24].copy_from_slice(&snapshot.encoder_b.wrapping_neg().to_le_bytes());
    frame
}

fn word(payload: &[u8; TELEMETRY_PAYLOAD_LEN], at: usize) -> [u8; 4] {
    [payload[at], payload[at + 1], payload[at + 2], payload[at + 3]]
}

// ────────────────────────────────────────────────────────────────────────────
// Commands
// ────────────────────────────────────────────────────────────────────────────

pub fn encode_motor(cmd: MotorCommand) -> [u8; COMMAND_FRAME_LEN] {
    [
        MOTOR_HEADER[0],
        MOTOR_HEADER[1],
        cmd.left_speed,
        cmd.right_speed,
        u8::from(cmd.left_reverse),
        u8::from(cmd.right_reverse),
    ]
}

pub fn encode_actuators(state: ActuatorState) -> [u8; COMMAND_FRAME_LEN] {
    [
        ACTUATOR_HEADER[0],
        ACTUATOR_HEADER[1],
        u8::from(state.brush_on),
        u8::from(state.suction_on),
        0x00,
        0x00,
    ]
}

/// A host → board frame recognised by [`decode_command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFrame {
    Motor(MotorCommand),
    Actuators(ActuatorState),
}

/// Parse one 6-byte command frame.  Returns `None` for anything else.
pub fn decode_command(frame: &[u8]) -> Option<CommandFrame> {
    let &[h0, h1, a, b, c, d] = frame else {
        return None;
    };
    match [h0, h1] {
        MOTOR_HEADER => Some(CommandFrame::Motor(MotorCommand {
            left_speed: a,
            right_speed: b,
            left_reverse: c != 0,
            right_reverse: d != 0,
        })),
        ACTUATOR_HEADER => Some(CommandFrame::Actuators(ActuatorState {
            brush_on: a != 0,
            suction_on: b != 0,
        })),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload_of(frame: &[u8; TELEMETRY_FRAME_LEN]) -> [u8; TELEMETRY_PAYLOAD_LEN] {
        let mut payload = [0u8; TELEMETRY_PAYLOAD_LEN];
        payload.copy_from_slice(&frame[1..]);
        payload
    }

    #[test]
    fn telemetry_decode_negates_encoders() {
        let snapshot = SensorSnapshot {
            us_front: 100.5,
            us_left: 12.25,
            us_right: 300.0,
            stair_drop: true,
            bin_level: false,
            humidity: true,
            encoder_a: 1234,
            encoder_b: -98765,
        };
        let frame = encode_telemetry(&snapshot);
        assert_eq!(frame[0], TELEMETRY_HEADER);
        // Raw wire carries the board's sign convention.
        assert_eq!(i32::from_le_bytes([frame[16], frame[17], frame[18], frame[19]]), -1234);

        assert_eq!(decode_telemetry(&payload_of(&frame)), snapshot);
    }

    #[test]
    fn hand_built_payload_decodes() {
        let mut payload = [0u8; TELEMETRY_PAYLOAD_LEN];
        payload[0..4].copy_from_slice(&45.0f32.to_le_bytes());
        payload[12] = 1;
        payload[15..19].copy_from_slice(&500i32.to_le_bytes());
        payload[19..23].copy_from_slice(&(-7i32).to_le_bytes());

        let s = decode_telemetry(&payload);
        assert!((s.us_front - 45.0).abs() < f32::EPSILON);
        assert!(s.stair_drop);
        assert!(!s.bin_level);
        assert_eq!(s.encoder_a, -500);
        assert_eq!(s.encoder_b, 7);
    }

    #[test]
    fn motor_frame_layout() {
        let cmd = MotorCommand::clamped(120, 255, true, false);
        assert_eq!(encode_motor(cmd), [0xF0, 0x0F, 120, 255, 1, 0]);
        assert_eq!(encode_motor(MotorCommand::STOP), [0xF0, 0x0F, 0, 0, 0, 0]);
    }

    #[test]
    fn actuator_frame_layout() {
        let state = ActuatorState {
            brush_on: true,
            suction_on: false,
        };
        assert_eq!(encode_actuators(state), [0x7A, 0xF3, 1, 0, 0, 0]);
    }

    #[test]
    fn decode_command_recognises_both_frames() {
        let cmd = MotorCommand::clamped(10, 20, false, true);
        assert_eq!(decode_command(&encode_motor(cmd)), Some(CommandFrame::Motor(cmd)));

        let state = ActuatorState {
            brush_on: false,
            suction_on: true,
        };
        assert_eq!(
            decode_command(&encode_actuators(state)),
            Some(CommandFrame::Actuators(state))
        );
        assert_eq!(decode_command(&[0x00; 6]), None);
        assert_eq!(decode_command(&[0xF0, 0x0F]), None);
    }
}
