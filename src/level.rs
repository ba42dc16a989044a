//! A running level: the entity table, the replicate roster and the fixed-order tick.

use std::collections::BTreeSet;

use bevy::log::{debug, info, warn};
use bevy::math::Vec2;
use serde::Serialize;

use crate::actor::{self, Interaction};
use crate::actuator::{probe_occupants, ActuatorRole};
use crate::body::{self, Contacts, ResolveOptions};
use crate::category::Category;
use crate::config::PhysicsConfig;
use crate::events::SimEvent;
use crate::intent::{IntentLog, IntentSet};
use crate::ownership;
use crate::raycast::Raycaster;
use crate::replay::Life;
use crate::scene::SceneDesc;
use crate::transport::transport;
use crate::world::{EntityId, World};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelStatus {
    Running,
    /// The recording actor left; waiting on the replicates still replaying.
    AwaitingReplicates,
    Completed,
}

/// Snapshot of one body for collaborators outside the core.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BodyState {
    pub id: EntityId,
    pub category: Category,
    pub center: Vec2,
    pub half: Vec2,
    pub velocity: Vec2,
    pub contacts: Contacts,
    pub active: bool,
}

pub struct Level {
    scene: SceneDesc,
    config: PhysicsConfig,
    caster: Raycaster,
    world: World,
    spawn: Vec2,
    /// Logs of earlier lives, oldest first. Owned here, never shared.
    replicates: Vec<IntentLog>,
    controlled: EntityId,
    tick: u32,
    status: LevelStatus,
    failed: bool,
    restart_pending: bool,
}

impl Level {
    pub fn new(scene: SceneDesc, config: PhysicsConfig) -> Result<Self, String> {
        let config = config.sanitized();
        let caster = config.raycaster();
        let mut level = Self {
            scene,
            config,
            caster,
            world: World::default(),
            spawn: Vec2::ZERO,
            replicates: Vec::new(),
            controlled: EntityId(0),
            tick: 0,
            status: LevelStatus::Running,
            failed: false,
            restart_pending: false,
        };
        level.rebuild()?;
        Ok(level)
    }

    /// Scene bodies first, then replicates in creation order, then the live actor.
    fn rebuild(&mut self) -> Result<(), String> {
        let built = self.scene.build(&self.config)?;
        self.world = built.world;
        self.spawn = built.spawn;
        for log in &self.replicates {
            let life = Life::Replaying(log.clone());
            let entity = actor::actor_entity(&self.config, self.spawn, life);
            self.world.spawn(entity);
        }
        let live = actor::actor_entity(&self.config, self.spawn, Life::Recording(IntentLog::new()));
        self.controlled = self.world.spawn(live);
        self.tick = 0;
        self.status = LevelStatus::Running;
        self.failed = false;
        self.restart_pending = false;
        Ok(())
    }

    /// Restarts every life at tick 0, keeping the replicate roster.
    pub fn reload(&mut self) -> Result<(), String> {
        info!(
            "[Timeloop level] reload '{}' with {} replicates",
            self.scene.name,
            self.replicates.len()
        );
        self.rebuild()
    }

    /// Restarts from scratch, discarding every replicate.
    pub fn restart(&mut self) -> Result<(), String> {
        self.replicates.clear();
        self.reload()
    }

    /// Queues a recorded life as a replicate; it joins on the next reload.
    pub fn add_replicate(&mut self, log: IntentLog) {
        self.replicates.push(log);
    }

    /// Swaps in a new scene description and restarts from scratch. On error the
    /// running level is left untouched.
    pub fn replace_scene(&mut self, scene: SceneDesc) -> Result<(), String> {
        scene.build(&self.config)?;
        self.scene = scene;
        self.restart()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn scene(&self) -> &SceneDesc {
        &self.scene
    }

    pub fn ordinal(&self) -> u32 {
        self.scene.ordinal
    }

    pub fn tick_count(&self) -> u32 {
        self.tick
    }

    pub fn status(&self) -> LevelStatus {
        self.status
    }

    /// Whether any life since the last restart ended in a paradox or a crush.
    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn controlled(&self) -> EntityId {
        self.controlled
    }

    pub fn replicate_logs(&self) -> &[IntentLog] {
        &self.replicates
    }

    pub fn spawn_point(&self) -> Vec2 {
        self.spawn
    }

    /// Every actor, live or replicate, in id order.
    pub fn actors(&self) -> Vec<EntityId> {
        self.world
            .iter()
            .filter(|e| e.actor.is_some())
            .map(|e| e.id)
            .collect()
    }

    pub fn body_state(&self, id: EntityId) -> Option<BodyState> {
        let entity = self.world.get(id)?;
        Some(BodyState {
            id,
            category: entity.category,
            center: entity.body.aabb.center,
            half: entity.body.aabb.half,
            velocity: entity.body.velocity,
            contacts: entity.body.contacts,
            active: entity.active,
        })
    }

    /// Advances the whole level by one fixed step with the live actor's intents.
    pub fn tick(&mut self, intents: IntentSet) -> Vec<SimEvent> {
        let mut events = Vec::new();
        if self.status == LevelStatus::Completed {
            return events;
        }

        self.refresh_all_contacts();
        let actors = self.world.ids_where(|e| e.actor.is_some());
        for &id in &actors {
            self.drive_actor(id, intents, &mut events);
        }

        self.move_bodies();
        ownership::settle(&mut self.world);
        self.release_stale_carries();

        self.update_buttons(&mut events);
        self.advance_actuators();
        ownership::settle(&mut self.world);

        self.collect_keys(&mut events);
        self.detect_crushes(&mut events);

        if self.status == LevelStatus::AwaitingReplicates && !self.failed {
            let remaining = self
                .world
                .active()
                .filter(|e| e.actor.as_ref().is_some_and(|a| !a.life.is_recording()))
                .count();
            if remaining == 0 {
                info!("[Timeloop level] '{}' completed at tick {}", self.scene.name, self.tick);
                self.status = LevelStatus::Completed;
                events.push(SimEvent::LevelCompleted {
                    ordinal: self.scene.ordinal,
                });
            }
        }

        self.tick = self.tick.saturating_add(1);
        if self.restart_pending {
            if let Err(e) = self.rebuild() {
                warn!("[Timeloop level] restart failed: {e}");
                self.restart_pending = false;
            }
        }
        events
    }

    fn refresh_all_contacts(&mut self) {
        let dynamic = self.world.ids_where(|e| e.body.gravity_scale > 0.0);
        for id in dynamic {
            body::refresh_contacts(&mut self.world, &self.caster, id);
            if let Some(state) = self.world.get_mut(id).and_then(|e| e.actor.as_mut()) {
                state.crush = actor::CrushInfo::default();
            }
        }
    }

    fn drive_actor(&mut self, id: EntityId, live: IntentSet, events: &mut Vec<SimEvent>) {
        let is_controlled = id == self.controlled;
        let Some(state) = self.world.get_mut(id).and_then(|e| e.actor.as_mut()) else {
            return;
        };
        let offered = if is_controlled { live } else { IntentSet::EMPTY };
        let intents = match state.life.intents_for(state.tick, offered) {
            Ok(intents) => intents,
            Err(paradox) => {
                state.paradox = true;
                warn!(
                    "[Timeloop replay] {id} exhausted its log of {} entries at tick {}",
                    paradox.log_len, paradox.tick
                );
                events.push(SimEvent::Paradox {
                    actor: id,
                    tick: paradox.tick,
                });
                self.failed = true;
                self.deactivate_actor(id, events);
                return;
            }
        };
        let life_tick = state.tick;
        state.tick = state.tick.saturating_add(1);

        let (interaction, exit) =
            actor::apply_intents(&mut self.world, &self.caster, &self.config, id, intents);
        if interaction != Interaction::Nothing {
            debug!("[Timeloop actor] {id} {interaction:?} at tick {life_tick}");
        }
        if exit {
            self.try_exit(id, life_tick, events);
        }
    }

    fn try_exit(&mut self, id: EntityId, life_tick: u32, events: &mut Vec<SimEvent>) {
        let Some(exit) = actor::overlapping_exit(&self.world, id) else {
            return;
        };
        if life_tick <= self.config.exit_grace_ticks {
            debug!("[Timeloop level] {id} tried to exit inside the grace period");
            return;
        }
        let unlocked = self
            .world
            .get(exit)
            .and_then(|e| e.exit)
            .is_some_and(|x| x.unlocked());
        let Some(state) = self.world.get(id).and_then(|e| e.actor.as_ref()) else {
            return;
        };

        if state.life.is_recording() {
            if unlocked {
                info!("[Timeloop level] {id} left at tick {life_tick}");
                events.push(SimEvent::ActorExited {
                    actor: id,
                    tick: life_tick,
                });
                self.status = LevelStatus::AwaitingReplicates;
                self.deactivate_actor(id, events);
            } else if !self.restart_pending {
                let log = state.life.fork();
                let log_len = log.len();
                self.replicates.push(log);
                info!(
                    "[Timeloop level] {id} forked a replicate of {log_len} ticks ({} total)",
                    self.replicates.len()
                );
                events.push(SimEvent::Forked {
                    actor: id,
                    replicates: self.replicates.len(),
                    log_len,
                });
                self.restart_pending = true;
            }
        } else if unlocked || !self.config.replicate_exit_requires_unlock {
            events.push(SimEvent::ActorExited {
                actor: id,
                tick: life_tick,
            });
            self.deactivate_actor(id, events);
        }
    }

    /// Actors first, then free blocks, each in id order.
    fn move_bodies(&mut self) {
        let actors = self.world.ids_where(|e| e.actor.is_some());
        for id in actors {
            actor::step(&mut self.world, &self.caster, &self.config, id);
        }

        // stacks on a carried body move with it during settle
        let blocks = self.world.ids_where(|e| {
            e.actor.is_none()
                && e.body.gravity_scale > 0.0
                && e.carried_by().is_none()
                && !ownership::rides_carried(&self.world, e.id)
        });
        let dt = self.config.dt();
        for id in blocks {
            let Some(entity) = self.world.get_mut(id) else { continue };
            entity
                .body
                .apply_gravity(self.config.gravity, self.config.max_fall_speed, dt);
            let desired = entity.body.velocity * dt;
            let Some(resolution) =
                body::resolve(&self.world, &self.caster, id, desired, ResolveOptions::default())
            else {
                continue;
            };
            if resolution.displacement != Vec2::ZERO {
                let mut visited = BTreeSet::new();
                transport(
                    &mut self.world,
                    &self.caster,
                    id,
                    resolution.displacement,
                    &mut visited,
                );
            }
            body::apply(&mut self.world, id, &resolution);
            if let Some(entity) = self.world.get_mut(id) {
                entity.body.settle_velocity();
            }
            ownership::update_support(&mut self.world, id);
        }
    }

    /// A carried body that no longer overlaps its carrier horizontally is let go.
    fn release_stale_carries(&mut self) {
        let carriers = self.world.ids_where(|e| e.carrying().is_some());
        for id in carriers {
            let Some(held) = self.world.get(id).and_then(|e| e.carrying()) else {
                continue;
            };
            let (Some(c), Some(h)) = (self.world.aabb(id), self.world.aabb(held)) else {
                continue;
            };
            if !c.overlaps_horizontally(&h) {
                warn!("[Timeloop carry] {held} separated from {id}, releasing");
                ownership::force_drop(&mut self.world, id);
            }
        }
    }

    /// Buttons sink while occupied; each elevator rises while any of its buttons is
    /// occupied. Elevators no button controls keep their current state.
    fn update_buttons(&mut self, events: &mut Vec<SimEvent>) {
        let buttons = self.world.ids_where(|e| {
            matches!(
                e.actuator.as_ref().map(|a| &a.role),
                Some(ActuatorRole::Button { .. })
            )
        });
        let mut pressed: Vec<(EntityId, bool)> = Vec::new();
        for id in buttons {
            let present: BTreeSet<EntityId> =
                probe_occupants(&self.world, &self.caster, id, self.config.button_probe)
                    .into_iter()
                    .filter(|o| self.world.is_active(*o))
                    .collect();
            let Some(actuator) = self.world.get_mut(id).and_then(|e| e.actuator.as_mut()) else {
                continue;
            };
            let Some(occupancy) = actuator.occupancy_mut() else {
                continue;
            };
            if occupancy.observe(&present) {
                events.push(SimEvent::OccupantUnderflow { button: id });
            }
            let occupied = occupancy.occupied();
            actuator.drive(!occupied);
            for target in actuator.controls() {
                pressed.push((*target, occupied));
            }
        }

        let mut driven: Vec<(EntityId, bool)> = Vec::new();
        for (target, occupied) in pressed {
            match driven.iter_mut().find(|(t, _)| *t == target) {
                Some((_, any)) => *any |= occupied,
                None => driven.push((target, occupied)),
            }
        }
        for (target, rise) in driven {
            if let Some(actuator) = self.world.get_mut(target).and_then(|e| e.actuator.as_mut()) {
                actuator.drive(rise);
            }
        }
    }

    /// Steps every actuator in id order, transporting riders before the structure moves.
    fn advance_actuators(&mut self) {
        let dt = self.config.dt();
        let ids = self.world.ids_where(|e| e.actuator.is_some());
        for id in ids {
            let Some(actuator) = self.world.get_mut(id).and_then(|e| e.actuator.as_mut()) else {
                continue;
            };
            let dy = actuator.advance(dt);
            if dy == 0.0 {
                continue;
            }
            let planned = Vec2::new(0.0, dy);
            let mut visited = BTreeSet::new();
            transport(&mut self.world, &self.caster, id, planned, &mut visited);
            self.world.translate(id, planned);
        }
    }

    fn collect_keys(&mut self, events: &mut Vec<SimEvent>) {
        let keys = self.world.ids_where(|e| e.key.is_some());
        for key in keys {
            let Some(aabb) = self.world.aabb(key) else { continue };
            let Some(toucher) = self
                .world
                .active()
                .find(|e| e.actor.is_some() && e.body.aabb.overlaps(&aabb))
            else {
                continue;
            };
            let actor = toucher.id;
            let by_replicate = toucher
                .actor
                .as_ref()
                .is_some_and(|a| !a.life.is_recording());
            let replicate_only = self
                .world
                .get(key)
                .and_then(|e| e.key)
                .is_some_and(|k| k.replicate_only);
            if let Some(entity) = self.world.get_mut(key) {
                entity.active = false;
            }
            if replicate_only && !by_replicate {
                debug!("[Timeloop level] {actor} destroyed replicate key {key}");
                events.push(SimEvent::KeyLost { key, actor });
                continue;
            }
            events.push(SimEvent::KeyCollected { key, actor });
            let exit_id = self.world.exit().map(|e| e.id);
            if let Some(exit_id) = exit_id {
                let unlocked = self
                    .world
                    .get_mut(exit_id)
                    .and_then(|e| e.exit.as_mut())
                    .is_some_and(|x| x.obtain_key());
                if unlocked {
                    info!("[Timeloop level] exit {exit_id} unlocked");
                    events.push(SimEvent::ExitUnlocked { exit: exit_id });
                }
            }
        }
    }

    fn detect_crushes(&mut self, events: &mut Vec<SimEvent>) {
        let actors = self.world.ids_where(|e| e.actor.is_some());
        for id in actors {
            if actor::detect_crush(&self.world, &self.config, id) {
                let tick = self
                    .world
                    .get(id)
                    .and_then(|e| e.actor.as_ref())
                    .map(|a| a.tick)
                    .unwrap_or_default();
                warn!("[Timeloop level] {id} crushed at tick {tick}");
                events.push(SimEvent::Crushed { actor: id, tick });
                self.failed = true;
                self.deactivate_actor(id, events);
            }
        }
    }

    /// Removes an actor from play: drops what it holds, leaves its support and
    /// any button it was standing on.
    fn deactivate_actor(&mut self, id: EntityId, events: &mut Vec<SimEvent>) {
        ownership::force_drop(&mut self.world, id);
        ownership::detach(&mut self.world, id);
        let buttons = self.world.ids_where(|e| {
            e.actuator
                .as_ref()
                .and_then(|a| a.occupancy())
                .is_some_and(|o| o.contains(id))
        });
        for button in buttons {
            let corrected = self
                .world
                .get_mut(button)
                .and_then(|e| e.actuator.as_mut())
                .and_then(|a| a.occupancy_mut())
                .is_some_and(|o| o.depart(id));
            if corrected {
                events.push(SimEvent::OccupantUnderflow { button });
            }
        }
        if let Some(entity) = self.world.get_mut(id) {
            entity.active = false;
            entity.body.velocity = Vec2::ZERO;
        }
    }
}
