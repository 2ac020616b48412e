use std::collections::HashMap;

use glam::Vec3;
use tidewire::event::{PlayerJoined, PlayerLeft, TeamAssigned};
use tidewire::sync::{Buttons, Velocity};
use tidewire::{DisconnectReason, EntityId, EntityKind, GameEvent, SimWorld};

const WALK_SPEED: f32 = 5.0;
const SPRINT_SPEED: f32 = 10.0;

#[derive(Debug, Clone, Copy)]
struct Avatar {
    entity_id: EntityId,
    player_id: u16,
    team: u8,
}

/// Toy game rules on top of [`SimWorld`]: one avatar per client, driven by
/// its latest input, plus a handful of drifting props.
#[derive(Debug, Default)]
pub struct Simulation {
    avatars: HashMap<u32, Avatar>,
}

impl Simulation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn populate(&mut self, world: &mut SimWorld, props: u32) {
        for i in 0..props {
            let angle = i as f32 / props.max(1) as f32 * std::f32::consts::TAU;
            let position = Vec3::new(angle.cos() * 20.0, 1.0, angle.sin() * 20.0);
            let id = world.spawn(EntityKind::DynamicProp, position);
            if let Some(entity) = world.get_mut(id) {
                entity.velocity = Velocity {
                    linear: Vec3::new(-angle.sin(), 0.0, angle.cos()),
                    angular: Vec3::new(0.0, 0.5, 0.0),
                };
            }
        }
    }

    pub fn player_joined(&mut self, world: &mut SimWorld, client_id: u32, player_id: u16) {
        let entity_id = world.spawn(EntityKind::Player, Vec3::new(0.0, 1.0, 0.0));
        let team = (client_id % 2) as u8;
        let status = world.player_mut(player_id);
        status.team = team;
        status.health = 100;
        status.alive = true;

        world.queue_event(GameEvent::PlayerJoined(PlayerJoined { player_id, team }));
        world.queue_event(GameEvent::TeamAssigned(TeamAssigned { player_id, team }));
        self.avatars.insert(
            client_id,
            Avatar {
                entity_id,
                player_id,
                team,
            },
        );
    }

    pub fn player_left(&mut self, world: &mut SimWorld, client_id: u32, reason: DisconnectReason) {
        let Some(avatar) = self.avatars.remove(&client_id) else {
            return;
        };
        world.despawn(avatar.entity_id);
        world.remove_player(avatar.player_id);
        // timeouts count as a forfeit
        if reason == DisconnectReason::Timeout {
            let info = world.match_info_mut();
            if avatar.team == 0 {
                info.blue_score = info.blue_score.saturating_add(1);
            } else {
                info.red_score = info.red_score.saturating_add(1);
            }
        }
        world.queue_event(GameEvent::PlayerLeft(PlayerLeft {
            player_id: avatar.player_id,
            clean: reason != DisconnectReason::Timeout,
        }));
    }

    pub fn step(&mut self, world: &mut SimWorld, dt: f32) {
        for (&client_id, avatar) in &self.avatars {
            let Some(input) = world.last_input(client_id).copied() else {
                continue;
            };
            let Some(entity) = world.get_mut(avatar.entity_id) else {
                continue;
            };
            let speed = if input.buttons.contains(Buttons::SPRINT) {
                SPRINT_SPEED
            } else {
                WALK_SPEED
            };
            let (sin_yaw, cos_yaw) = input.yaw.sin_cos();
            let direction = input.move_direction.normalize_or_zero();
            entity.velocity.linear = Vec3::new(
                direction.x * cos_yaw + direction.z * sin_yaw,
                direction.y,
                -direction.x * sin_yaw + direction.z * cos_yaw,
            ) * speed;
            entity.transform.rotation =
                glam::Quat::from_euler(glam::EulerRot::YXZ, input.yaw, -input.pitch, 0.0);
        }

        let info = world.match_info_mut();
        info.time_remaining = (info.time_remaining - dt).max(0.0);
        world.step(dt);
    }
}
