use bevy::log::warn;
use bevy::math::Vec2;
use serde::{Deserialize, Serialize};

use crate::raycast::Raycaster;

/// Physics constants (tunable from the startup config or a simulation request)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub tick_hz: f64,
    pub gravity: f32,
    pub max_fall_speed: f32,
    pub move_speed: f32,
    /// Apex reached by the launch speed alone, before sustain thrust.
    pub jump_height: f32,
    /// Height a released jump is truncated to.
    pub min_jump_height: f32,
    pub jump_sustain_secs: f32,
    /// Extra thrust, as a multiple of the launch speed per second, while jump is held.
    pub jump_sustain_thrust: f32,
    pub skin_width: f32,
    pub ray_count: usize,
    pub crush_buffer: f32,
    pub side_margin: f32,
    /// Ticks a life must last before the exit accepts it.
    pub exit_grace_ticks: u32,
    pub spawn_offset: f32,
    pub actor_size: Vec2,
    /// Depth above a button's top surface that counts as standing on it.
    pub button_probe: f32,
    pub replicate_exit_requires_unlock: bool,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            tick_hz: 60.0,
            gravity: 40.0,
            max_fall_speed: 30.0,
            move_speed: 6.0,
            jump_height: 2.2,
            min_jump_height: 0.5,
            jump_sustain_secs: 0.35,
            jump_sustain_thrust: 3.0,
            skin_width: 0.015,
            ray_count: 6,
            crush_buffer: 0.0,
            side_margin: 0.3,
            exit_grace_ticks: 40,
            spawn_offset: 0.3,
            actor_size: Vec2::new(0.75, 1.0),
            button_probe: 0.15,
            replicate_exit_requires_unlock: true,
        }
    }
}

impl PhysicsConfig {
    pub fn dt(&self) -> f32 {
        (1.0 / self.tick_hz) as f32
    }

    pub fn raycaster(&self) -> Raycaster {
        Raycaster::new(self.skin_width, self.ray_count)
    }

    /// `sqrt(2·g·h)` for the configured apex height.
    pub fn launch_speed(&self) -> f32 {
        (2.0 * self.gravity * self.jump_height).max(0.0).sqrt()
    }

    pub fn min_jump_speed(&self) -> f32 {
        (2.0 * self.gravity * self.min_jump_height).max(0.0).sqrt()
    }

    /// Replaces out-of-range values with defaults, logging each correction.
    pub fn sanitized(mut self) -> Self {
        let defaults = PhysicsConfig::default();
        if !self.tick_hz.is_finite() || self.tick_hz <= 0.0 {
            warn!("[Timeloop config] tick_hz {} invalid, using {}", self.tick_hz, defaults.tick_hz);
            self.tick_hz = defaults.tick_hz;
        }
        if self.ray_count < 2 {
            warn!("[Timeloop config] ray_count {} below 2, clamping", self.ray_count);
            self.ray_count = 2;
        }
        if self.skin_width < 0.0 {
            warn!("[Timeloop config] negative skin_width, using {}", defaults.skin_width);
            self.skin_width = defaults.skin_width;
        }
        if self.actor_size.x <= 0.0 || self.actor_size.y <= 0.0 {
            warn!("[Timeloop config] actor_size must be positive, using default");
            self.actor_size = defaults.actor_size;
        }
        if self.min_jump_height > self.jump_height {
            self.min_jump_height = self.jump_height;
        }
        self
    }
}
