use std::f32::consts::TAU;

use glam::Vec3;
use tidewire::InputCommand;
use tidewire::sync::Buttons;

/// Scripted input: walks in a slow circle and sprints every few seconds.
#[derive(Debug)]
pub struct Bot {
    sequence: u32,
    tick_rate: u32,
}

impl Bot {
    pub fn new(tick_rate: u32) -> Self {
        Self {
            sequence: 0,
            tick_rate: tick_rate.max(1),
        }
    }

    pub fn next_input(&mut self, frame: i32) -> InputCommand {
        self.sequence = self.sequence.wrapping_add(1);
        let seconds = self.sequence as f32 / self.tick_rate as f32;

        let mut input = InputCommand::new(frame, self.sequence);
        input.set_move_direction(Vec3::Z);
        input.set_view_angles((seconds * 0.25 * TAU) % TAU, 0.0);
        if (seconds as u32) % 5 == 0 {
            input.buttons |= Buttons::SPRINT;
        }
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_increases_every_tick() {
        let mut bot = Bot::new(60);
        let first = bot.next_input(0);
        let second = bot.next_input(1);
        assert_eq!(second.sequence, first.sequence + 1);
        assert_eq!(second.frame, 1);
        assert_eq!(first.move_direction, Vec3::Z);
    }
}
