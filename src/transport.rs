use std::collections::BTreeSet;

use bevy::math::Vec2;

use crate::geometry::Direction;
use crate::raycast::{EdgeCast, Raycaster};
use crate::world::{Entity, EntityId, World};

/// Pushes everything riding on or standing in the way of `structure`, which is
/// about to move by `planned`. Call before moving the structure itself.
/// Each passenger is displaced at most once per call tree, tracked by `visited`.
pub fn transport(
    world: &mut World,
    caster: &Raycaster,
    structure: EntityId,
    planned: Vec2,
    visited: &mut BTreeSet<EntityId>,
) {
    let Some(s) = world.get(structure) else { return };
    let Some(transporter) = s.transporter else { return };
    if !s.active || planned == Vec2::ZERO {
        return;
    }
    visited.insert(structure);
    let aabb = s.body.aabb;
    let skin = caster.skin;
    let mask = transporter.passengers;
    // carried bodies only ever move through their carrier
    let free = move |e: &Entity| e.carried_by().is_none();

    if let Some(dir) = Direction::from_dy(planned.y) {
        if !transporter.passenger_only {
            let cast = EdgeCast {
                edge: dir,
                distance: planned.y.abs() + skin,
                mask,
                shift: 0.0,
            };
            let hits = caster.cast_all(world, &[structure], &aabb, &cast, free);
            for hit in hits {
                if visited.contains(&hit.entity) {
                    continue;
                }
                let gap = (hit.distance - skin).max(0.0);
                let push = Vec2::new(
                    if dir == Direction::Up { planned.x } else { 0.0 },
                    planned.y - gap * dir.sign(),
                );
                mark_pressed(world, hit.entity, dir);
                push_passenger(world, caster, hit.entity, push, structure, visited);
            }
        } else if dir == Direction::Up {
            let surface = aabb.top();
            let cast = EdgeCast {
                edge: Direction::Up,
                distance: planned.y + skin,
                mask,
                shift: 0.0,
            };
            let hits = caster.cast_all(world, &[structure], &aabb, &cast, |e| {
                free(e) && e.body.aabb.bottom() >= surface - skin
            });
            for hit in hits {
                if visited.contains(&hit.entity) {
                    continue;
                }
                let gap = (hit.distance - skin).max(0.0);
                let push = Vec2::new(planned.x, planned.y - gap);
                push_passenger(world, caster, hit.entity, push, structure, visited);
            }
        }
    }

    if planned.y < 0.0 || (planned.y == 0.0 && planned.x != 0.0) {
        let surface = aabb.top();
        let cast = EdgeCast {
            edge: Direction::Up,
            distance: skin * 2.0,
            mask,
            shift: 0.0,
        };
        let riders = caster.cast_all(world, &[structure], &aabb, &cast, |e| {
            free(e) && e.body.aabb.bottom() >= surface - skin
        });
        for hit in riders {
            if visited.contains(&hit.entity) {
                continue;
            }
            let Some(rider) = world.get(hit.entity) else { continue };
            let contacts = rider.body.contacts;
            let mut push = planned;
            if (push.x > 0.0 && contacts.right) || (push.x < 0.0 && contacts.left) {
                push.x = 0.0;
            }
            if push.y > 0.0 && contacts.above {
                push.y = 0.0;
            }
            push_passenger(world, caster, hit.entity, push, structure, visited);
        }
    }

    if let Some(dir) = Direction::from_dx(planned.x) {
        if !transporter.passenger_only {
            let cast = EdgeCast {
                edge: dir,
                distance: planned.x.abs() + skin,
                mask,
                shift: 0.0,
            };
            let hits = caster.cast_all(world, &[structure], &aabb, &cast, free);
            for hit in hits {
                if visited.contains(&hit.entity) {
                    continue;
                }
                let gap = (hit.distance - skin).max(0.0);
                let push = Vec2::new(planned.x - gap * dir.sign(), 0.0);
                push_passenger(world, caster, hit.entity, push, structure, visited);
            }
        }
    }
}

fn push_passenger(
    world: &mut World,
    caster: &Raycaster,
    passenger: EntityId,
    push: Vec2,
    structure: EntityId,
    visited: &mut BTreeSet<EntityId>,
) {
    if push == Vec2::ZERO || !visited.insert(passenger) {
        return;
    }
    transport(world, caster, passenger, push, visited);
    world.translate(passenger, push);

    let held = world.get(passenger).and_then(|e| e.carrying());
    if let Some(held) = held {
        if held != structure && visited.insert(held) {
            transport(world, caster, held, push, visited);
            world.translate(held, push);
        }
    }
}

/// Records which side a moving structure's leading edge struck an actor from.
fn mark_pressed(world: &mut World, id: EntityId, dir: Direction) {
    let Some(actor) = world.get_mut(id).and_then(|e| e.actor.as_mut()) else {
        return;
    };
    match dir {
        Direction::Up => actor.crush.below = true,
        Direction::Down => actor.crush.above = true,
        Direction::Left | Direction::Right => {}
    }
}
