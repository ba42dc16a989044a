use bevy::math::Vec2;
use serde::{Deserialize, Serialize};

use crate::actor::ActorState;
use crate::actuator::Actuator;
use crate::body::Body;
use crate::category::{Category, CategoryMask};
use crate::geometry::{Aabb, Direction};

/// Handle into the entity table. Ids are assigned in spawn order and never reused
/// within a level, so iteration by id is the deterministic processing order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CarrierRole {
    pub carrying: Option<EntityId>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CarriableRole {
    pub carrier: Option<EntityId>,
}

/// Sides on which input-driven motion is currently suppressed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BlockedSides {
    pub left: bool,
    pub right: bool,
    pub up: bool,
}

impl BlockedSides {
    pub fn is_blocked(&self, direction: Direction) -> bool {
        match direction {
            Direction::Left => self.left,
            Direction::Right => self.right,
            Direction::Up => self.up,
            Direction::Down => false,
        }
    }

    pub fn set(&mut self, direction: Direction, blocked: bool) {
        match direction {
            Direction::Left => self.left = blocked,
            Direction::Right => self.right = blocked,
            Direction::Up => self.up = blocked,
            Direction::Down => {}
        }
    }
}

/// Parent-offset link: the entity follows `support` horizontally at `offset`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SupportRole {
    pub support: Option<EntityId>,
    pub offset: f32,
    pub blocked: BlockedSides,
}

/// Blocks resting transitively on this one, nearest first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StackRole {
    pub atop: Vec<EntityId>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transporter {
    pub passengers: CategoryMask,
    /// Only lifts bodies resting on top; never shoves anything met along the way.
    pub passenger_only: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExitState {
    pub keys_required: u32,
    pub keys_remaining: u32,
}

impl ExitState {
    pub fn new(keys_required: u32) -> Self {
        Self {
            keys_required,
            keys_remaining: keys_required,
        }
    }

    pub fn unlocked(&self) -> bool {
        self.keys_remaining == 0
    }

    /// Returns true when this key was the one that unlocked the exit.
    pub fn obtain_key(&mut self) -> bool {
        if self.keys_remaining == 0 {
            return false;
        }
        self.keys_remaining -= 1;
        self.keys_remaining == 0
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyState {
    pub replicate_only: bool,
}

#[derive(Clone, Debug)]
pub struct Entity {
    pub id: EntityId,
    pub name: Option<String>,
    pub category: Category,
    pub active: bool,
    pub body: Body,
    pub carrier: Option<CarrierRole>,
    pub carriable: Option<CarriableRole>,
    pub support: Option<SupportRole>,
    pub stack: Option<StackRole>,
    pub transporter: Option<Transporter>,
    pub actuator: Option<Actuator>,
    pub actor: Option<ActorState>,
    pub exit: Option<ExitState>,
    pub key: Option<KeyState>,
}

impl Entity {
    /// A bare, immovable box of the given category. Roles are added by the caller.
    pub fn new(category: Category, aabb: Aabb) -> Self {
        Self {
            id: EntityId(0),
            name: None,
            category,
            active: true,
            body: Body::fixed(aabb),
            carrier: None,
            carriable: None,
            support: None,
            stack: None,
            transporter: None,
            actuator: None,
            actor: None,
            exit: None,
            key: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn carrying(&self) -> Option<EntityId> {
        self.carrier.as_ref().and_then(|c| c.carrying)
    }

    pub fn carried_by(&self) -> Option<EntityId> {
        self.carriable.as_ref().and_then(|c| c.carrier)
    }

    pub fn supported_by(&self) -> Option<EntityId> {
        self.support.as_ref().and_then(|s| s.support)
    }

    pub fn blocked(&self) -> BlockedSides {
        self.support
            .as_ref()
            .map(|s| s.blocked)
            .unwrap_or_default()
    }

    pub fn stack_atop(&self) -> &[EntityId] {
        self.stack.as_ref().map(|s| s.atop.as_slice()).unwrap_or(&[])
    }
}

/// Owns every simulated entity. Relations between entities are ids into this table.
#[derive(Clone, Debug, Default)]
pub struct World {
    entities: Vec<Entity>,
}

impl World {
    pub fn spawn(&mut self, mut entity: Entity) -> EntityId {
        let id = EntityId(self.entities.len() as u32);
        entity.id = id;
        self.entities.push(entity);
        id
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn active(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| e.active)
    }

    pub fn is_active(&self, id: EntityId) -> bool {
        self.get(id).is_some_and(|e| e.active)
    }

    /// Ids of active entities matching `filter`, in id order.
    pub fn ids_where(&self, filter: impl Fn(&Entity) -> bool) -> Vec<EntityId> {
        self.active().filter(|e| filter(e)).map(|e| e.id).collect()
    }

    pub fn find(&self, name: &str) -> Option<EntityId> {
        self.entities
            .iter()
            .find(|e| e.name.as_deref() == Some(name))
            .map(|e| e.id)
    }

    pub fn aabb(&self, id: EntityId) -> Option<Aabb> {
        self.get(id).map(|e| e.body.aabb)
    }

    pub fn translate(&mut self, id: EntityId, delta: Vec2) {
        if let Some(entity) = self.get_mut(id) {
            entity.body.aabb.center += delta;
        }
    }

    pub fn set_center(&mut self, id: EntityId, center: Vec2) {
        if let Some(entity) = self.get_mut(id) {
            entity.body.aabb.center = center;
        }
    }

    /// The exit of the level, if there is one.
    pub fn exit(&self) -> Option<&Entity> {
        self.entities.iter().find(|e| e.exit.is_some())
    }
}
