use std::f32::consts::{FRAC_PI_2, PI};

use bitflags::bitflags;
use glam::Vec3;

use crate::bits::{CodecError, Stream};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Buttons: u8 {
        const SPRINT = 1 << 0;
        const JUMP = 1 << 1;
        const CROUCH = 1 << 2;
        const FIRE1 = 1 << 3;
        const FIRE2 = 1 << 4;
        const USE = 1 << 5;
        const RELOAD = 1 << 6;
    }
}

/// One tick of player input, sent client to server.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputCommand {
    pub frame: i32,
    pub sequence: u32,
    pub move_direction: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub buttons: Buttons,
}

impl InputCommand {
    pub fn new(frame: i32, sequence: u32) -> Self {
        Self {
            frame,
            sequence,
            ..Default::default()
        }
    }

    pub fn set_move_direction(&mut self, dir: Vec3) {
        self.move_direction = dir.clamp(Vec3::splat(-1.0), Vec3::splat(1.0));
    }

    pub fn set_view_angles(&mut self, yaw: f32, pitch: f32) {
        self.yaw = (yaw + PI).rem_euclid(2.0 * PI) - PI;
        self.pitch = pitch.clamp(-FRAC_PI_2, FRAC_PI_2);
    }

    pub fn serialize<S: Stream>(&mut self, stream: &mut S) -> Result<(), CodecError> {
        let mut frame = self.frame as u32 as u64;
        stream.serialize_bits(&mut frame, 32)?;
        self.frame = frame as u32 as i32;

        let mut sequence = self.sequence as u64;
        stream.serialize_bits(&mut sequence, 32)?;
        self.sequence = sequence as u32;

        stream.serialize_float(&mut self.move_direction.x, -1.0, 1.0, 0.01)?;
        stream.serialize_float(&mut self.move_direction.y, -1.0, 1.0, 0.01)?;
        stream.serialize_float(&mut self.move_direction.z, -1.0, 1.0, 0.01)?;
        stream.serialize_float(&mut self.yaw, -PI, PI, 0.001)?;
        stream.serialize_float(&mut self.pitch, -FRAC_PI_2, FRAC_PI_2, 0.001)?;

        let mut buttons = self.buttons.bits() as u64;
        stream.serialize_bits(&mut buttons, 8)?;
        self.buttons = Buttons::from_bits_truncate(buttons as u8);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::{BitReader, ReadStream, WriteStream};

    #[test]
    fn test_input_command_encoding() {
        let mut command = InputCommand::new(-3, 900);
        command.set_move_direction(Vec3::new(2.0, 0.0, -0.5));
        command.set_view_angles(PI + 0.5, 3.0);
        command.buttons = Buttons::JUMP | Buttons::FIRE1;

        assert_eq!(command.move_direction.x, 1.0);
        assert!((command.yaw - (-PI + 0.5)).abs() < 1e-5);
        assert_eq!(command.pitch, FRAC_PI_2);

        let mut out = WriteStream::default();
        command.serialize(&mut out).unwrap();
        let bytes = out.finish();

        let mut decoded = InputCommand::default();
        decoded
            .serialize(&mut ReadStream::new(BitReader::new(&bytes)))
            .unwrap();
        assert_eq!(decoded.frame, -3);
        assert_eq!(decoded.sequence, 900);
        assert_eq!(decoded.buttons, command.buttons);
        assert!(decoded.move_direction.abs_diff_eq(command.move_direction, 0.01));
        assert!((decoded.yaw - command.yaw).abs() <= 0.001);
    }
}
