use std::collections::VecDeque;

use bevy::prelude::*;
use serde::Serialize;

use crate::world::EntityId;

const MAX_EVENTS: usize = 500;

/// Outcomes surfaced by a tick. Nothing inside the tick fails; these are the results.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SimEvent {
    ActorExited { actor: EntityId, tick: u32 },
    /// A replicate ran out of log entries before leaving.
    Paradox { actor: EntityId, tick: u32 },
    Crushed { actor: EntityId, tick: u32 },
    /// The recording actor hit a locked exit; its life so far becomes a replicate
    /// and the level restarts at the end of this tick.
    Forked { actor: EntityId, replicates: usize, log_len: usize },
    LevelCompleted { ordinal: u32 },
    KeyCollected { key: EntityId, actor: EntityId },
    /// A replicate-only key touched by the recording actor.
    KeyLost { key: EntityId, actor: EntityId },
    ExitUnlocked { exit: EntityId },
    OccupantUnderflow { button: EntityId },
}

impl SimEvent {
    /// Matches the serialized `event` tag.
    pub fn name(&self) -> &'static str {
        match self {
            SimEvent::ActorExited { .. } => "actor_exited",
            SimEvent::Paradox { .. } => "paradox",
            SimEvent::Crushed { .. } => "crushed",
            SimEvent::Forked { .. } => "forked",
            SimEvent::LevelCompleted { .. } => "level_completed",
            SimEvent::KeyCollected { .. } => "key_collected",
            SimEvent::KeyLost { .. } => "key_lost",
            SimEvent::ExitUnlocked { .. } => "exit_unlocked",
            SimEvent::OccupantUnderflow { .. } => "occupant_underflow",
        }
    }
}

/// The outside party that decides what to do about lives ending.
/// Every callback defaults to doing nothing.
pub trait LevelCoordinator {
    fn on_actor_exited(&mut self, _actor: EntityId) {}
    fn on_paradox(&mut self, _actor: EntityId) {}
    fn on_crushed(&mut self, _actor: EntityId) {}
    fn on_level_completed(&mut self, _ordinal: u32) {}
    fn on_event(&mut self, _event: &SimEvent) {}
}

/// Feeds one tick's events to a coordinator in order.
pub fn dispatch(events: &[SimEvent], coordinator: &mut impl LevelCoordinator) {
    for event in events {
        coordinator.on_event(event);
        match event {
            SimEvent::ActorExited { actor, .. } => coordinator.on_actor_exited(*actor),
            SimEvent::Paradox { actor, .. } => coordinator.on_paradox(*actor),
            SimEvent::Crushed { actor, .. } => coordinator.on_crushed(*actor),
            SimEvent::LevelCompleted { ordinal } => coordinator.on_level_completed(*ordinal),
            _ => {}
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct EventRecord {
    pub frame: u64,
    #[serde(flatten)]
    pub event: SimEvent,
}

/// Ring buffer of recent events for the real-time app.
#[derive(Resource, Default)]
pub struct GameEventBus {
    pub recent: VecDeque<EventRecord>,
    pub frame: u64,
    pub dropped_events: u64,
    last_overflow_log_frame: u64,
}

impl GameEventBus {
    pub fn emit(&mut self, event: SimEvent) {
        debug!("[Timeloop events] frame {}: {}", self.frame, event.name());
        self.recent.push_back(EventRecord {
            frame: self.frame,
            event,
        });
        if self.recent.len() > MAX_EVENTS {
            let excess = self.recent.len() - MAX_EVENTS;
            let mut oldest = None;
            for _ in 0..excess {
                if let Some(record) = self.recent.pop_front() {
                    oldest.get_or_insert(record.event.name());
                }
            }
            self.dropped_events = self.dropped_events.saturating_add(excess as u64);
            if self.frame.saturating_sub(self.last_overflow_log_frame) >= 60 {
                self.last_overflow_log_frame = self.frame;
                warn!(
                    "[Timeloop events] Dropped {} buffered events starting with {} \
                     (total dropped: {})",
                    excess,
                    oldest.unwrap_or("none"),
                    self.dropped_events
                );
            }
        }
    }

    pub fn advance_frame(&mut self) {
        self.frame = self.frame.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Tally {
        exited: Vec<EntityId>,
        paradoxes: Vec<EntityId>,
        completed: Option<u32>,
        seen: usize,
    }

    impl LevelCoordinator for Tally {
        fn on_actor_exited(&mut self, actor: EntityId) {
            self.exited.push(actor);
        }
        fn on_paradox(&mut self, actor: EntityId) {
            self.paradoxes.push(actor);
        }
        fn on_level_completed(&mut self, ordinal: u32) {
            self.completed = Some(ordinal);
        }
        fn on_event(&mut self, _event: &SimEvent) {
            self.seen += 1;
        }
    }

    #[test]
    fn dispatch_routes_by_kind() {
        let events = vec![
            SimEvent::Paradox { actor: EntityId(3), tick: 9 },
            SimEvent::ExitUnlocked { exit: EntityId(1) },
            SimEvent::ActorExited { actor: EntityId(4), tick: 50 },
            SimEvent::LevelCompleted { ordinal: 2 },
        ];
        let mut tally = Tally::default();
        dispatch(&events, &mut tally);
        assert_eq!(tally.paradoxes, vec![EntityId(3)]);
        assert_eq!(tally.exited, vec![EntityId(4)]);
        assert_eq!(tally.completed, Some(2));
        assert_eq!(tally.seen, 4);
    }

    #[test]
    fn event_serializes_with_tag() {
        let json = serde_json::to_value(SimEvent::Crushed { actor: EntityId(2), tick: 7 }).unwrap();
        assert_eq!(json["event"], "crushed");
        assert_eq!(json["actor"], 2);
        assert_eq!(json["tick"], 7);
    }

    #[test]
    fn names_match_serialized_tags() {
        let events = [
            SimEvent::ActorExited { actor: EntityId(1), tick: 3 },
            SimEvent::Paradox { actor: EntityId(1), tick: 3 },
            SimEvent::Crushed { actor: EntityId(1), tick: 3 },
            SimEvent::Forked { actor: EntityId(1), replicates: 1, log_len: 40 },
            SimEvent::LevelCompleted { ordinal: 1 },
            SimEvent::KeyCollected { key: EntityId(2), actor: EntityId(1) },
            SimEvent::KeyLost { key: EntityId(2), actor: EntityId(1) },
            SimEvent::ExitUnlocked { exit: EntityId(3) },
            SimEvent::OccupantUnderflow { button: EntityId(4) },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["event"], event.name());
        }
    }

    #[test]
    fn event_bus_tracks_dropped_events() {
        let mut bus = GameEventBus::default();
        for i in 0..(MAX_EVENTS + 25) {
            bus.emit(SimEvent::LevelCompleted { ordinal: i as u32 });
        }
        assert_eq!(bus.recent.len(), MAX_EVENTS);
        assert!(bus.dropped_events >= 25);
    }
}
