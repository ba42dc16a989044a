use std::collections::BTreeSet;

use bevy::log::warn;
use serde::{Deserialize, Serialize};

use crate::category::CategoryMask;
use crate::geometry::Direction;
use crate::raycast::{EdgeCast, Raycaster};
use crate::world::{EntityId, World};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorState {
    AtMin,
    Increasing,
    Decreasing,
    AtMax,
}

/// Conservative count of bodies resting on a button.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Occupancy {
    count: i32,
    present: BTreeSet<EntityId>,
    pub anomalies: u32,
}

impl Occupancy {
    pub fn count(&self) -> u32 {
        self.count.max(0) as u32
    }

    pub fn occupied(&self) -> bool {
        self.count > 0
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.present.contains(&id)
    }

    pub fn arrive(&mut self, id: EntityId) {
        if self.present.insert(id) {
            self.count += 1;
        }
    }

    /// Records a departure. A count driven below zero is reset from the set of
    /// bodies still present; returns true when that correction happened.
    pub fn depart(&mut self, id: EntityId) -> bool {
        self.present.remove(&id);
        self.count -= 1;
        if self.count < 0 {
            warn!(
                "[Timeloop actuator] occupant count underflow on departure of {id}, \
                 resetting to {}",
                self.present.len()
            );
            self.count = self.present.len() as i32;
            self.anomalies += 1;
            return true;
        }
        false
    }

    /// Diffs this tick's probe result against the last one. Returns true if any
    /// correction was needed.
    pub fn observe(&mut self, now: &BTreeSet<EntityId>) -> bool {
        let departed: Vec<EntityId> = self.present.difference(now).copied().collect();
        let arrived: Vec<EntityId> = now.difference(&self.present).copied().collect();
        let mut corrected = false;
        for id in departed {
            corrected |= self.depart(id);
        }
        for id in arrived {
            self.arrive(id);
        }
        if self.count != self.present.len() as i32 {
            warn!(
                "[Timeloop actuator] occupant count {} disagrees with {} present, resetting",
                self.count,
                self.present.len()
            );
            self.count = self.present.len() as i32;
            self.anomalies += 1;
            corrected = true;
        }
        corrected
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ActuatorRole {
    /// Sinks while occupied and drives the listed actuators up.
    Button {
        controls: Vec<EntityId>,
        occupancy: Occupancy,
    },
    Elevator,
}

/// A body that travels vertically between `min` and `max` at a fixed speed.
#[derive(Clone, Debug, PartialEq)]
pub struct Actuator {
    pub min: f32,
    pub max: f32,
    pub speed: f32,
    pub position: f32,
    pub state: ActuatorState,
    pub role: ActuatorRole,
}

impl Actuator {
    /// Starts resting at `min` or `max` depending on `at_max`.
    pub fn new(min: f32, max: f32, speed: f32, at_max: bool, role: ActuatorRole) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min,
            max,
            speed: speed.abs(),
            position: if at_max { max } else { min },
            state: if at_max {
                ActuatorState::AtMax
            } else {
                ActuatorState::AtMin
            },
            role,
        }
    }

    pub fn button(raised: f32, travel: f32, speed: f32, controls: Vec<EntityId>) -> Self {
        Self::new(
            raised - travel,
            raised,
            speed,
            true,
            ActuatorRole::Button {
                controls,
                occupancy: Occupancy::default(),
            },
        )
    }

    pub fn elevator(lowered: f32, rise: f32, speed: f32) -> Self {
        Self::new(
            lowered,
            lowered + rise,
            speed,
            false,
            ActuatorRole::Elevator,
        )
    }

    /// Heads toward `max` or `min`. A terminal state already at that bound stays put.
    pub fn drive(&mut self, toward_max: bool) {
        self.state = match (toward_max, self.state) {
            (true, ActuatorState::AtMax) | (true, ActuatorState::Increasing) => self.state,
            (true, _) => ActuatorState::Increasing,
            (false, ActuatorState::AtMin) | (false, ActuatorState::Decreasing) => self.state,
            (false, _) => ActuatorState::Decreasing,
        };
    }

    /// Steps the position and returns the displacement to apply this tick.
    /// Clamps first, then transitions when the bound is reached.
    pub fn advance(&mut self, dt: f32) -> f32 {
        let start = self.position;
        match self.state {
            ActuatorState::Increasing => {
                let next = (start + self.speed * dt).min(self.max);
                self.position = next;
                if next >= self.max {
                    self.state = ActuatorState::AtMax;
                }
            }
            ActuatorState::Decreasing => {
                let next = (start - self.speed * dt).max(self.min);
                self.position = next;
                if next <= self.min {
                    self.state = ActuatorState::AtMin;
                }
            }
            ActuatorState::AtMin | ActuatorState::AtMax => {}
        }
        self.position - start
    }

    pub fn occupancy(&self) -> Option<&Occupancy> {
        match &self.role {
            ActuatorRole::Button { occupancy, .. } => Some(occupancy),
            ActuatorRole::Elevator => None,
        }
    }

    pub fn occupancy_mut(&mut self) -> Option<&mut Occupancy> {
        match &mut self.role {
            ActuatorRole::Button { occupancy, .. } => Some(occupancy),
            ActuatorRole::Elevator => None,
        }
    }

    pub fn controls(&self) -> &[EntityId] {
        match &self.role {
            ActuatorRole::Button { controls, .. } => controls,
            ActuatorRole::Elevator => &[],
        }
    }
}

/// Actors and stackables resting on top of `button`, within `depth` of its surface.
pub fn probe_occupants(
    world: &World,
    caster: &Raycaster,
    button: EntityId,
    depth: f32,
) -> BTreeSet<EntityId> {
    let Some(aabb) = world.aabb(button) else {
        return BTreeSet::new();
    };
    let surface = aabb.top();
    let cast = EdgeCast {
        edge: Direction::Up,
        distance: depth + caster.skin,
        mask: CategoryMask::PASSENGERS,
        shift: 0.0,
    };
    caster
        .cast_all(world, &[button], &aabb, &cast, |e| {
            e.body.aabb.bottom() >= surface - depth
        })
        .into_iter()
        .map(|hit| hit.entity)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lift() -> Actuator {
        Actuator::elevator(0.0, 1.0, 2.0)
    }

    #[test]
    fn increasing_clamps_then_transitions() {
        let mut a = lift();
        a.drive(true);
        assert_eq!(a.state, ActuatorState::Increasing);
        let mut total = a.advance(0.2) + a.advance(0.2);
        assert_eq!(a.state, ActuatorState::Increasing);
        assert!((a.position - 0.8).abs() < 1e-6);
        // the third step would overshoot to 1.2
        total += a.advance(0.2);
        assert_eq!(a.position, 1.0);
        assert_eq!(a.state, ActuatorState::AtMax);
        assert!((total - 1.0).abs() < 1e-6);
        assert_eq!(a.advance(0.2), 0.0);
    }

    #[test]
    fn increasing_at_max_transitions_same_tick() {
        let mut a = lift();
        a.position = a.max;
        a.state = ActuatorState::Increasing;
        assert_eq!(a.advance(0.1), 0.0);
        assert_eq!(a.state, ActuatorState::AtMax);
    }

    #[test]
    fn position_stays_within_bounds() {
        let mut a = lift();
        for step in 0..200 {
            a.drive(step % 7 < 4);
            a.advance(0.05);
            assert!(a.position >= a.min && a.position <= a.max);
        }
    }

    #[test]
    fn drive_reverses_mid_travel() {
        let mut a = lift();
        a.drive(true);
        a.advance(0.1);
        a.drive(false);
        assert_eq!(a.state, ActuatorState::Decreasing);
        a.advance(1.0);
        assert_eq!(a.state, ActuatorState::AtMin);
        assert_eq!(a.position, 0.0);
        a.drive(false);
        assert_eq!(a.state, ActuatorState::AtMin);
    }

    #[test]
    fn button_starts_raised() {
        let b = Actuator::button(0.5, 0.2, 3.0, vec![EntityId(4)]);
        assert_eq!(b.state, ActuatorState::AtMax);
        assert_eq!(b.position, 0.5);
        assert!((b.min - 0.3).abs() < 1e-6);
        assert_eq!(b.controls(), &[EntityId(4)]);
    }

    #[test]
    fn occupancy_clamps_duplicate_departure() {
        let mut occ = Occupancy::default();
        occ.arrive(EntityId(1));
        occ.arrive(EntityId(1));
        assert_eq!(occ.count(), 1);
        assert!(!occ.depart(EntityId(1)));
        assert!(occ.depart(EntityId(1)));
        assert_eq!(occ.count(), 0);
        assert!(!occ.occupied());
        assert_eq!(occ.anomalies, 1);
    }

    #[test]
    fn observe_counts_arrivals_and_departures() {
        let mut occ = Occupancy::default();
        let both: BTreeSet<_> = [EntityId(1), EntityId(2)].into_iter().collect();
        assert!(!occ.observe(&both));
        assert_eq!(occ.count(), 2);
        let one: BTreeSet<_> = [EntityId(2)].into_iter().collect();
        occ.observe(&one);
        assert_eq!(occ.count(), 1);
        assert!(occ.contains(EntityId(2)));
        occ.observe(&BTreeSet::new());
        assert_eq!(occ.count(), 0);
        assert_eq!(occ.anomalies, 0);
    }
}
