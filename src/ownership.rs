//! Carrier/carriable and support (parent-offset) relations.
//!
//! Both relations are plain ids stored on the entities involved. Every function
//! here tolerates missing or inactive entities and simply does nothing.

use std::collections::BTreeSet;

use bevy::log::debug;
use bevy::math::Vec2;

use crate::category::{Category, CategoryMask};
use crate::geometry::{Aabb, Direction};
use crate::raycast::{EdgeCast, Raycaster};
use crate::world::{Entity, EntityId, World};

/// Picks `target` up. Any previous carrier of `target` is force dropped first, and
/// anything `carrier` already held is dropped. Returns false if either side lacks
/// the role.
pub fn carry(world: &mut World, carrier: EntityId, target: EntityId) -> bool {
    if carrier == target {
        return false;
    }
    let (Some(c), Some(t)) = (world.get(carrier), world.get(target)) else {
        return false;
    };
    if c.carrier.is_none() || t.carriable.is_none() || !c.active || !t.active {
        return false;
    }
    if c.carrying() == Some(target) {
        return true;
    }

    if let Some(held) = c.carrying() {
        debug!("[Timeloop carry] {carrier} swaps {held} for {target}");
        force_drop(world, carrier);
    }
    if let Some(previous) = world.get(target).and_then(|t| t.carried_by()) {
        force_drop(world, previous);
    }
    detach(world, target);

    if let Some(c) = world.get_mut(carrier).and_then(|e| e.carrier.as_mut()) {
        c.carrying = Some(target);
    }
    if let Some(t) = world.get_mut(target) {
        if let Some(role) = t.carriable.as_mut() {
            role.carrier = Some(carrier);
        }
        t.body.velocity = Vec2::ZERO;
    }
    pin_carried(world, carrier);
    true
}

/// Puts the carried body down if it is not wedged into a structure.
pub fn drop_carried(world: &mut World, carrier: EntityId) -> Option<EntityId> {
    let held = world.get(carrier)?.carrying()?;
    let aabb = world.aabb(held)?;
    let wedged = world.active().any(|e| {
        e.id != held && CategoryMask::STRUCTURES.contains(e.category) && e.body.aabb.overlaps(&aabb)
    });
    if wedged {
        return None;
    }
    force_drop(world, carrier)
}

/// Clears the carry link unconditionally.
pub fn force_drop(world: &mut World, carrier: EntityId) -> Option<EntityId> {
    let held = world
        .get_mut(carrier)
        .and_then(|e| e.carrier.as_mut())
        .and_then(|c| c.carrying.take())?;
    if let Some(t) = world.get_mut(held) {
        if let Some(role) = t.carriable.as_mut() {
            role.carrier = None;
        }
        t.body.velocity = Vec2::ZERO;
    }
    Some(held)
}

/// Places the carried body centered on top of its carrier.
pub fn pin_carried(world: &mut World, carrier: EntityId) {
    let Some(c) = world.get(carrier) else { return };
    let Some(held) = c.carrying() else { return };
    let top = Vec2::new(c.body.aabb.center.x, c.body.aabb.top());
    if let Some(t) = world.get_mut(held) {
        t.body.aabb.center = top + Vec2::new(0.0, t.body.aabb.half.y);
    }
}

/// Starts following `support`, recomputing the horizontal offset from scratch.
pub fn attach(world: &mut World, entity: EntityId, support: EntityId) -> bool {
    if entity == support || !world.is_active(support) {
        return false;
    }
    let Some(e) = world.get(entity) else { return false };
    if e.support.is_none() {
        return false;
    }
    if e.supported_by().is_some() {
        detach(world, entity);
    }
    let (Some(s), Some(me)) = (world.aabb(support), world.aabb(entity)) else {
        return false;
    };
    if let Some(role) = world.get_mut(entity).and_then(|e| e.support.as_mut()) {
        role.support = Some(support);
        role.offset = s.center.x - me.center.x;
    }
    if world.get(entity).is_some_and(|e| e.stack.is_some()) {
        add_to_stack(world, support, entity);
    }
    true
}

pub fn detach(world: &mut World, entity: EntityId) {
    let Some(support) = world.get(entity).and_then(|e| e.supported_by()) else {
        return;
    };
    if let Some(role) = world.get_mut(entity).and_then(|e| e.support.as_mut()) {
        role.support = None;
        role.offset = 0.0;
    }
    remove_from_stack(world, support, entity);
}

/// Re-reads the offset after the entity moved under its own power.
pub fn recapture_offset(world: &mut World, entity: EntityId) {
    let Some(support) = world.get(entity).and_then(|e| e.supported_by()) else {
        return;
    };
    let (Some(s), Some(me)) = (world.aabb(support), world.aabb(entity)) else {
        return;
    };
    if let Some(role) = world.get_mut(entity).and_then(|e| e.support.as_mut()) {
        role.offset = s.center.x - me.center.x;
    }
}

/// Attaches to whatever movable body is underfoot, or detaches when airborne,
/// carried, or standing on something that cannot be followed.
pub fn update_support(world: &mut World, id: EntityId) {
    let Some(entity) = world.get(id) else { return };
    if entity.support.is_none() {
        return;
    }
    let current = entity.supported_by();
    let target = if entity.carried_by().is_some() || entity.body.velocity.y > 0.0 {
        None
    } else {
        entity
            .body
            .contacts
            .ground
            .filter(|_| entity.body.contacts.below)
            .filter(|g| world.get(*g).is_some_and(can_support))
    };
    match (current, target) {
        (Some(c), Some(t)) if c == t => recapture_offset(world, id),
        (_, Some(t)) => {
            attach(world, id, t);
        }
        (Some(_), None) => detach(world, id),
        (None, None) => {}
    }
}

fn can_support(entity: &Entity) -> bool {
    entity.active
        && matches!(
            entity.category,
            Category::Moving | Category::SwitchPlate | Category::Stackable
        )
}

/// Adds `block` and everything resting on it to `base` and to each block below `base`.
fn add_to_stack(world: &mut World, base: EntityId, block: EntityId) {
    let mut moving = vec![block];
    moving.extend_from_slice(world.get(block).map(|e| e.stack_atop()).unwrap_or(&[]));

    let mut current = Some(base);
    let mut seen = BTreeSet::new();
    while let Some(id) = current {
        if !seen.insert(id) {
            break;
        }
        let Some(stack) = world.get_mut(id).and_then(|e| e.stack.as_mut()) else {
            break;
        };
        for m in &moving {
            if !stack.atop.contains(m) {
                stack.atop.push(*m);
            }
        }
        current = world.get(id).and_then(|e| e.supported_by());
    }
}

fn remove_from_stack(world: &mut World, base: EntityId, block: EntityId) {
    let mut leaving = vec![block];
    leaving.extend_from_slice(world.get(block).map(|e| e.stack_atop()).unwrap_or(&[]));

    let mut current = Some(base);
    let mut seen = BTreeSet::new();
    while let Some(id) = current {
        if !seen.insert(id) {
            break;
        }
        let Some(stack) = world.get_mut(id).and_then(|e| e.stack.as_mut()) else {
            break;
        };
        stack.atop.retain(|m| !leaving.contains(m));
        current = world.get(id).and_then(|e| e.supported_by());
    }
}

/// Whether `id` rests, directly or through a stack, on a carried body.
pub fn rides_carried(world: &World, id: EntityId) -> bool {
    let mut current = world.get(id).and_then(|e| e.supported_by());
    let mut seen = BTreeSet::new();
    while let Some(support) = current {
        if !seen.insert(support) {
            return false;
        }
        let Some(entity) = world.get(support) else { return false };
        if entity.carried_by().is_some() {
            return true;
        }
        current = entity.supported_by();
    }
    false
}

/// Highest block resting on `base`, or `base` itself.
pub fn stack_top(world: &World, base: EntityId) -> EntityId {
    let Some(entity) = world.get(base) else { return base };
    entity
        .stack_atop()
        .iter()
        .filter_map(|id| world.get(*id))
        .max_by(|a, b| {
            a.body
                .aabb
                .top()
                .total_cmp(&b.body.aabb.top())
                .then_with(|| a.id.cmp(&b.id))
        })
        .map(|e| e.id)
        .unwrap_or(base)
}

/// Splits the top block off the stack rooted at `base`.
pub fn divide_top(world: &mut World, base: EntityId) -> Option<EntityId> {
    let top = stack_top(world, base);
    if top == base {
        return None;
    }
    detach(world, top);
    Some(top)
}

/// Whether a stack spanning `bottom`..`top` fits when lifted onto `carrier`:
/// rays go up from the carrier's top at the stack's width over its height.
pub fn space_above(
    world: &World,
    caster: &Raycaster,
    carrier: EntityId,
    bottom: EntityId,
    top: EntityId,
) -> bool {
    let (Some(c), Some(b), Some(t)) = (world.aabb(carrier), world.aabb(bottom), world.aabb(top))
    else {
        return false;
    };
    let height = t.top() - b.bottom();
    let probe = Aabb::new(
        Vec2::new(c.center.x, c.top() - c.half.y),
        Vec2::new(b.half.x, c.half.y),
    );
    let cast = EdgeCast {
        edge: Direction::Up,
        distance: height + caster.skin,
        mask: CategoryMask::STRUCTURES,
        shift: 0.0,
    };
    caster
        .cast(world, &[carrier, bottom, top], &probe, &cast, |_| true)
        .is_none()
}

/// Ownership pass: carried bodies are pinned onto their carriers, supported bodies
/// follow their supports. Supports and carriers settle before what they hold.
pub fn settle(world: &mut World) {
    let ids = world.ids_where(|e| e.carried_by().is_some() || e.supported_by().is_some());
    let mut visited = BTreeSet::new();
    for id in ids {
        settle_one(world, id, &mut visited);
    }
}

fn settle_one(world: &mut World, id: EntityId, visited: &mut BTreeSet<EntityId>) {
    if !visited.insert(id) {
        return;
    }
    let Some((carried_by, supported_by)) = world
        .get(id)
        .map(|e| (e.carried_by(), e.supported_by()))
    else {
        return;
    };

    if let Some(carrier) = carried_by {
        if !world.is_active(carrier) {
            force_drop(world, carrier);
            return;
        }
        settle_one(world, carrier, visited);
        pin_carried(world, carrier);
        return;
    }

    let Some(support) = supported_by else { return };
    if !world.is_active(support) {
        detach(world, id);
        return;
    }
    settle_one(world, support, visited);

    let (Some(s), Some(me)) = (world.aabb(support), world.aabb(id)) else {
        return;
    };
    let Some(role) = world.get(id).and_then(|e| e.support.as_ref()) else {
        return;
    };
    let target_x = s.center.x - role.offset;
    let dx = target_x - me.center.x;
    let held_back = (dx < 0.0 && role.blocked.left) || (dx > 0.0 && role.blocked.right);
    let x = if held_back { me.center.x } else { target_x };
    world.set_center(id, Vec2::new(x, s.top() + me.half.y));
    if held_back {
        recapture_offset(world, id);
    }
    if world.get(id).and_then(|e| e.carrying()).is_some() {
        pin_carried(world, id);
    }
}
