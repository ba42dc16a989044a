//! Character controller shared by the live actor and its replicates.

use bevy::log::debug;
use bevy::math::Vec2;

use crate::body::{self, Body, ResolveOptions};
use crate::category::{Category, CategoryMask};
use crate::config::PhysicsConfig;
use crate::geometry::{center_is_above, is_to_side, Aabb, Direction};
use crate::intent::{Intent, IntentSet};
use crate::ownership;
use crate::raycast::{EdgeCast, Raycaster};
use crate::replay::Life;
use crate::world::{CarrierRole, Entity, EntityId, SupportRole, World};

/// Slack for treating two edges as touching after float accumulation.
const CONTACT_EPSILON: f32 = 1e-4;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct JumpState {
    pub active: bool,
    /// Seconds of sustain thrust left for the current jump.
    pub sustain_left: f32,
}

/// Pressure reported by moving structures during the current tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CrushInfo {
    /// Struck by a descending structure's leading edge.
    pub above: bool,
    /// Lifted by a rising structure's leading edge.
    pub below: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActorState {
    pub life: Life,
    /// Ticks lived so far; also the index of the next log entry.
    pub tick: u32,
    pub jump: JumpState,
    pub crush: CrushInfo,
    pub spawn: Vec2,
    pub paradox: bool,
}

/// What an interact intent ended up doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interaction {
    Dropped(EntityId),
    LiftedStack(EntityId),
    LiftedTop(EntityId),
    Nothing,
}

pub fn actor_entity(config: &PhysicsConfig, center: Vec2, life: Life) -> Entity {
    let aabb = Aabb::new(center, config.actor_size / 2.0);
    let mut entity = Entity::new(Category::Actor, aabb);
    entity.body = Body::dynamic(aabb, CategoryMask::STRUCTURES, CategoryMask::STACKABLES);
    entity.carrier = Some(CarrierRole::default());
    entity.support = Some(SupportRole::default());
    entity.actor = Some(ActorState {
        life,
        tick: 0,
        jump: JumpState::default(),
        crush: CrushInfo::default(),
        spawn: center,
        paradox: false,
    });
    entity
}

/// Recomputes which sides input may not push toward, from this tick's contacts of
/// the actor and of whatever it carries.
pub fn refresh_blocked(world: &mut World, id: EntityId) {
    let Some(actor) = world.get(id) else { return };
    let own = actor.body.contacts;
    let held = actor
        .carrying()
        .and_then(|h| world.get(h))
        .map(|h| h.body.contacts)
        .unwrap_or_default();
    if let Some(role) = world.get_mut(id).and_then(|e| e.support.as_mut()) {
        role.blocked.set(Direction::Left, own.left || held.left);
        role.blocked.set(Direction::Right, own.right || held.right);
        role.blocked.set(Direction::Up, held.above);
    }
}

/// Applies one tick of intents: horizontal move, jump, then interact.
/// Returns the interaction outcome and whether exit was requested.
pub fn apply_intents(
    world: &mut World,
    caster: &Raycaster,
    config: &PhysicsConfig,
    id: EntityId,
    intents: IntentSet,
) -> (Interaction, bool) {
    refresh_blocked(world, id);
    let mut interaction = Interaction::Nothing;
    let mut exit = false;

    let Some(entity) = world.get_mut(id) else {
        return (interaction, exit);
    };
    let blocked = entity.blocked();
    let mut dir = intents.horizontal();
    if (dir < 0.0 && blocked.left) || (dir > 0.0 && blocked.right) {
        dir = 0.0;
    }
    entity.body.velocity.x = dir * config.move_speed;
    let held = intents.contains(Intent::Jump);
    let grounded = entity.body.grounded();
    if let Some(actor) = entity.actor.as_mut() {
        update_jump(&mut actor.jump, &mut entity.body, config, held, grounded && !blocked.up);
    }

    for intent in intents.iter() {
        match intent {
            Intent::MoveLeft | Intent::MoveRight | Intent::Jump => {}
            Intent::Interact => interaction = interact(world, caster, id),
            Intent::Exit => exit = true,
        }
    }
    (interaction, exit)
}

fn update_jump(
    jump: &mut JumpState,
    body: &mut Body,
    config: &PhysicsConfig,
    held: bool,
    can_launch: bool,
) {
    let dt = config.dt();
    if jump.active && body.grounded() && body.velocity.y <= 0.0 {
        jump.active = false;
    }
    if held {
        if !jump.active && can_launch {
            body.velocity.y = config.launch_speed();
            jump.active = true;
            jump.sustain_left = config.jump_sustain_secs;
        } else if jump.active && jump.sustain_left > 0.0 && config.jump_sustain_secs > 0.0 {
            let remaining = jump.sustain_left / config.jump_sustain_secs;
            body.velocity.y += config.launch_speed() * config.jump_sustain_thrust * remaining * dt;
            jump.sustain_left = (jump.sustain_left - dt).max(0.0);
        }
    } else if jump.active {
        body.velocity.y = body.velocity.y.min(config.min_jump_speed());
        jump.active = false;
        jump.sustain_left = 0.0;
    }
}

/// Drops what is carried, or lifts the adjacent (else underfoot) stackable.
/// The whole stack resting on it is lifted when it fits, otherwise just the top block.
pub fn interact(world: &mut World, caster: &Raycaster, id: EntityId) -> Interaction {
    let Some(actor) = world.get(id) else {
        return Interaction::Nothing;
    };
    if actor.carrying().is_some() {
        return match ownership::drop_carried(world, id) {
            Some(dropped) => Interaction::Dropped(dropped),
            None => Interaction::Nothing,
        };
    }
    let target = adjacent_stackable(world, id).or_else(|| underfoot_stackable(world, caster, id));
    let Some(target) = target else {
        return Interaction::Nothing;
    };
    let top = ownership::stack_top(world, target);
    if ownership::space_above(world, caster, id, target, top) {
        if ownership::carry(world, id, target) {
            return Interaction::LiftedStack(target);
        }
        return Interaction::Nothing;
    }
    if top != target && ownership::space_above(world, caster, id, top, top) {
        ownership::divide_top(world, target);
        if ownership::carry(world, id, top) {
            return Interaction::LiftedTop(top);
        }
    }
    debug!("[Timeloop actor] {id} has no room to lift {target}");
    Interaction::Nothing
}

/// Nearest stackable overlapping the actor, by horizontal distance then id.
fn adjacent_stackable(world: &World, id: EntityId) -> Option<EntityId> {
    let me = world.get(id)?;
    let aabb = me.body.aabb;
    let held = me.carrying();
    world
        .active()
        .filter(|e| e.carriable.is_some() && e.id != id && Some(e.id) != held)
        .filter(|e| e.body.aabb.overlaps(&aabb))
        .min_by(|a, b| {
            let da = (a.body.aabb.center.x - aabb.center.x).abs();
            let db = (b.body.aabb.center.x - aabb.center.x).abs();
            da.total_cmp(&db).then_with(|| a.id.cmp(&b.id))
        })
        .map(|e| e.id)
}

fn underfoot_stackable(world: &World, caster: &Raycaster, id: EntityId) -> Option<EntityId> {
    let me = world.get(id)?;
    if let Some(ground) = me.body.contacts.ground {
        if world.get(ground).is_some_and(|g| g.active && g.carriable.is_some()) {
            return Some(ground);
        }
    }
    let bottom = me.body.aabb.bottom();
    let cast = EdgeCast {
        edge: Direction::Down,
        distance: caster.skin * 2.0,
        mask: CategoryMask::STACKABLES,
        shift: 0.0,
    };
    caster
        .cast(world, &[id], &me.body.aabb, &cast, |e| {
            e.carriable.is_some() && e.body.aabb.top() <= bottom + caster.skin
        })
        .map(|hit| hit.entity)
}

/// Gravity, carry-aware collision resolve and support bookkeeping for one tick.
/// Returns the displacement actually taken.
pub fn step(world: &mut World, caster: &Raycaster, config: &PhysicsConfig, id: EntityId) -> Vec2 {
    let dt = config.dt();
    let Some(entity) = world.get_mut(id) else {
        return Vec2::ZERO;
    };
    entity
        .body
        .apply_gravity(config.gravity, config.max_fall_speed, dt);
    let desired = entity.body.velocity * dt;
    let held = entity.carrying();

    let Some(prelim) = body::resolve(world, caster, id, desired, ResolveOptions::default()) else {
        return Vec2::ZERO;
    };
    let mut planned = prelim.displacement;

    if let Some(held) = held {
        let carried_options = ResolveOptions {
            preserve_contacts: true,
            one_way: false,
        };
        if let Some(probe) = body::resolve(world, caster, held, planned, carried_options) {
            let mut allowed = probe.displacement;
            let top = ownership::stack_top(world, held);
            if top != held && planned.y > 0.0 {
                let top_probe = body::resolve(world, caster, top, planned, carried_options);
                if let Some(top_probe) = top_probe {
                    allowed.y = allowed.y.min(top_probe.displacement.y);
                }
            }
            planned.x = allowed.x;
            if planned.y > 0.0 && allowed.y < planned.y {
                planned.y = allowed.y.max(0.0);
                if let Some(e) = world.get_mut(id) {
                    e.body.velocity.y = 0.0;
                }
            }
            if let Some(h) = world.get_mut(held) {
                h.body.contacts = probe.contacts;
            }
        }
    }

    let Some(resolution) = body::resolve(world, caster, id, planned, ResolveOptions::default())
    else {
        return Vec2::ZERO;
    };
    body::apply(world, id, &resolution);
    if let Some(e) = world.get_mut(id) {
        e.body.settle_velocity();
    }
    if held.is_some() {
        ownership::pin_carried(world, id);
    }
    ownership::update_support(world, id);
    resolution.displacement
}

/// Crushed when a structure it is not beside bears down on its head while it is
/// held from below. Something must have moved this tick: either the structure
/// descended onto the actor or the actor was lifted into it. Standing under a
/// still ceiling never crushes.
pub fn detect_crush(world: &World, config: &PhysicsConfig, id: EntityId) -> bool {
    let Some(entity) = world.get(id) else { return false };
    let Some(actor) = entity.actor.as_ref() else { return false };
    let crush = actor.crush;
    if !crush.above && !crush.below {
        return false;
    }
    let aabb = entity.body.aabb;
    let limit = aabb.top() + config.crush_buffer + CONTACT_EPSILON;

    let pressed_above = world.active().any(|s| {
        s.id != id
            && CategoryMask::STRUCTURES.contains(s.category)
            && s.body.aabb.top() > aabb.top()
            && s.body.aabb.bottom() <= limit
            && !is_to_side(&aabb, &s.body.aabb, config.side_margin)
            && !center_is_above(&aabb, &s.body.aabb)
    });
    let pressed_below = crush.below || entity.body.contacts.below;
    pressed_above && pressed_below
}

pub fn overlapping_exit(world: &World, id: EntityId) -> Option<EntityId> {
    let aabb = world.aabb(id)?;
    world
        .active()
        .find(|e| e.exit.is_some() && e.body.aabb.overlaps(&aabb))
        .map(|e| e.id)
}
