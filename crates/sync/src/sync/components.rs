use bitflags::bitflags;
use glam::{Quat, Vec3};

use super::schema::FieldRange;
use crate::replicated;

pub const WORLD_EXTENT: f32 = 1024.0;

replicated! {
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct Transform {
        pub position: Vec3 => FieldRange::float(-WORLD_EXTENT, WORLD_EXTENT, 0.01),
        pub rotation: Quat => FieldRange::float(-1.0, 1.0, 0.001),
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

replicated! {
    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    pub struct Velocity {
        pub linear: Vec3 => FieldRange::float(-64.0, 64.0, 0.01),
        pub angular: Vec3 => FieldRange::float(-32.0, 32.0, 0.01),
    }
}

replicated! {
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct MassProperties {
        pub mass: f32 => FieldRange::float(0.0, 1000.0, 0.1),
        pub friction: f32 => FieldRange::float(0.0, 2.0, 0.01),
        pub restitution: f32 => FieldRange::float(0.0, 1.0, 0.01),
    }
}

impl Default for MassProperties {
    fn default() -> Self {
        Self {
            mass: 1.0,
            friction: 0.5,
            restitution: 0.0,
        }
    }
}

replicated! {
    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    pub struct PlayerStatus {
        pub player_id: u16 => FieldRange::int(0, u16::MAX as i64),
        pub team: u8 => FieldRange::int(0, 3),
        pub score: i32 => FieldRange::int(-9_999, 99_999),
        pub health: u8 => FieldRange::int(0, 200),
        pub alive: bool => FieldRange::Bool,
    }
}

replicated! {
    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    pub struct MatchInfo {
        pub phase: u8 => FieldRange::int(0, 3),
        pub time_remaining: f32 => FieldRange::float(0.0, 3600.0, 0.1),
        pub red_score: u16 => FieldRange::int(0, 999),
        pub blue_score: u16 => FieldRange::int(0, 999),
    }
}

bitflags! {
    /// Components present on an entity in a snapshot.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ComponentSet: u8 {
        const TRANSFORM = 1 << 0;
        const VELOCITY = 1 << 1;
        const MASS = 1 << 2;
    }
}

impl ComponentSet {
    /// Components that change every tick and travel in updates.
    pub const DYNAMIC: Self = Self::TRANSFORM.union(Self::VELOCITY);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::{BitReader, ReadStream, WriteStream};
    use crate::sync::Replicated;

    #[test]
    fn transform_keeps_centimetre_precision() {
        let mut transform = Transform {
            position: Vec3::new(12.345, -0.5, 700.01),
            rotation: Quat::from_rotation_z(0.3),
        };
        let mut out = WriteStream::default();
        transform.serialize(&mut out).unwrap();
        let bytes = out.finish();

        let mut decoded = Transform::default();
        decoded
            .serialize(&mut ReadStream::new(BitReader::new(&bytes)))
            .unwrap();
        assert!(decoded.position.abs_diff_eq(transform.position, 0.01));
        assert!(decoded.rotation.abs_diff_eq(transform.rotation, 0.002));
    }

    #[test]
    fn out_of_range_score_fails_to_encode() {
        let mut status = PlayerStatus {
            score: 1_000_000,
            ..Default::default()
        };
        assert!(status.serialize(&mut WriteStream::default()).is_err());
    }

    #[test]
    fn dynamic_set_excludes_mass() {
        assert!(ComponentSet::DYNAMIC.contains(ComponentSet::TRANSFORM | ComponentSet::VELOCITY));
        assert!(!ComponentSet::DYNAMIC.contains(ComponentSet::MASS));
    }
}
