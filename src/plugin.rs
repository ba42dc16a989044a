use bevy::prelude::*;

use crate::events::{dispatch, GameEventBus, LevelCoordinator, SimEvent};
use crate::intent::{Intent, IntentSet};
use crate::level::Level;
use crate::world::EntityId;

/// Runs an [`ActiveLevel`] on the fixed timestep. The level itself is inserted by
/// the caller; nothing ticks until it exists.
pub struct TimeloopPlugin;

#[derive(Resource)]
pub struct ActiveLevel(pub Level);

/// Intents gathered between fixed steps. Held intents mirror the keys currently
/// down; latched ones survive until a step consumes them so a short press between
/// two steps still lands.
#[derive(Resource, Default, Clone, Debug)]
pub struct PendingIntents {
    pub held: IntentSet,
    pub latched: IntentSet,
}

impl PendingIntents {
    pub fn latch(&mut self, intent: Intent) {
        self.latched.insert(intent);
    }

    pub fn take(&mut self) -> IntentSet {
        let mut set = self.held;
        for intent in self.latched.iter() {
            set.insert(intent);
        }
        self.latched = IntentSet::EMPTY;
        set
    }
}

#[derive(Resource, Default, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LevelCommand {
    #[default]
    None,
    /// Restart every life, keeping the replicates.
    Reload,
    /// Restart with no replicates.
    Restart,
}

#[derive(Resource, Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelProgress {
    pub highest_completed: u32,
}

/// Events produced by the most recent fixed step.
#[derive(Resource, Default, Debug)]
pub struct LastTickEvents(pub Vec<SimEvent>);

impl Plugin for TimeloopPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PendingIntents>()
            .init_resource::<LevelCommand>()
            .init_resource::<LevelProgress>()
            .init_resource::<LastTickEvents>()
            .init_resource::<GameEventBus>()
            .add_systems(
                PreUpdate,
                keyboard_to_intents.run_if(resource_exists::<ButtonInput<KeyCode>>),
            )
            .add_systems(
                FixedUpdate,
                (apply_level_command, tick_level, publish_events)
                    .chain()
                    .run_if(resource_exists::<ActiveLevel>),
            );
    }
}

fn keyboard_to_intents(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut pending: ResMut<PendingIntents>,
    mut command: ResMut<LevelCommand>,
) {
    let mut held = IntentSet::EMPTY;
    if keyboard.any_pressed([KeyCode::KeyA, KeyCode::ArrowLeft]) {
        held.insert(Intent::MoveLeft);
    }
    if keyboard.any_pressed([KeyCode::KeyD, KeyCode::ArrowRight]) {
        held.insert(Intent::MoveRight);
    }
    if keyboard.any_pressed([KeyCode::KeyW, KeyCode::ArrowUp, KeyCode::Space]) {
        held.insert(Intent::Jump);
    }
    pending.held = held;

    if keyboard.just_pressed(KeyCode::KeyE) {
        pending.latch(Intent::Interact);
    }
    if keyboard.any_just_pressed([KeyCode::KeyS, KeyCode::ArrowDown, KeyCode::Enter]) {
        pending.latch(Intent::Exit);
    }

    if keyboard.just_pressed(KeyCode::KeyR) {
        *command = LevelCommand::Reload;
    } else if keyboard.just_pressed(KeyCode::Backspace) {
        *command = LevelCommand::Restart;
    }
}

fn apply_level_command(mut level: ResMut<ActiveLevel>, mut command: ResMut<LevelCommand>) {
    let result = match *command {
        LevelCommand::None => return,
        LevelCommand::Reload => level.0.reload(),
        LevelCommand::Restart => level.0.restart(),
    };
    if let Err(e) = result {
        error!("[Timeloop app] {:?} failed: {e}", *command);
    }
    *command = LevelCommand::None;
}

fn tick_level(
    mut level: ResMut<ActiveLevel>,
    mut pending: ResMut<PendingIntents>,
    mut last: ResMut<LastTickEvents>,
) {
    let intents = pending.take();
    last.0 = level.0.tick(intents);
}

/// Routes tick outcomes to the event bus and the progress record.
struct AppCoordinator<'a> {
    bus: &'a mut GameEventBus,
    progress: &'a mut LevelProgress,
}

impl LevelCoordinator for AppCoordinator<'_> {
    fn on_paradox(&mut self, actor: EntityId) {
        info!("[Timeloop app] paradox by {actor}; press R to retry or Backspace to start over");
    }

    fn on_crushed(&mut self, actor: EntityId) {
        info!("[Timeloop app] {actor} was crushed; press R to retry or Backspace to start over");
    }

    fn on_level_completed(&mut self, ordinal: u32) {
        if ordinal > self.progress.highest_completed {
            self.progress.highest_completed = ordinal;
        }
        info!("[Timeloop app] level {ordinal} completed");
    }

    fn on_event(&mut self, event: &SimEvent) {
        self.bus.emit(event.clone());
    }
}

fn publish_events(
    mut last: ResMut<LastTickEvents>,
    mut bus: ResMut<GameEventBus>,
    mut progress: ResMut<LevelProgress>,
) {
    let events = std::mem::take(&mut last.0);
    let mut coordinator = AppCoordinator {
        bus: &mut bus,
        progress: &mut progress,
    };
    dispatch(&events, &mut coordinator);
    last.0 = events;
    bus.advance_frame();
}
