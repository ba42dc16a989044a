use serde::{Deserialize, Serialize};

use crate::config::PhysicsConfig;
use crate::events::{EventRecord, SimEvent};
use crate::intent::{Intent, IntentLog, IntentSet};
use crate::level::Level;
use crate::scene::SceneDesc;
use crate::world::EntityId;

/// A scripted headless run: intents are held for `duration` frames from `frame`.
/// Frame numbers count across restarts caused by forking.
#[derive(Deserialize, Clone)]
pub struct SimulationRequest {
    pub scene: SceneDesc,
    #[serde(default)]
    pub inputs: Vec<SimInput>,
    pub max_frames: u32,
    #[serde(default = "default_record_interval")]
    pub record_interval: u32,
    pub physics: Option<PhysicsConfig>,
    /// Lives recorded earlier, replayed as replicates from the first frame.
    #[serde(default)]
    pub replicates: Vec<IntentLog>,
}

fn default_record_interval() -> u32 {
    1
}

#[derive(Deserialize, Clone)]
pub struct SimInput {
    pub frame: u32,
    pub action: Intent,
    #[serde(default)]
    pub duration: u32,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    Paradox,
    Crushed,
    Timeout,
}

#[derive(Serialize, Clone)]
pub struct SimulationResult {
    pub outcome: Outcome,
    pub frames_elapsed: u32,
    pub trace: Vec<TraceFrame>,
    pub events: Vec<EventRecord>,
    /// Replicate logs held by the level when the run stopped.
    pub replicates: Vec<IntentLog>,
}

#[derive(Serialize, Clone, Debug)]
pub struct TraceFrame {
    pub frame: u32,
    pub actor: EntityId,
    pub recording: bool,
    /// False once the actor has exited or been crushed.
    pub active: bool,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub grounded: bool,
}

/// Expands the script into one intent set per frame.
pub fn expand_inputs(inputs: &[SimInput], max_frames: u32) -> Vec<IntentSet> {
    let mut frames = vec![IntentSet::EMPTY; max_frames as usize];
    for input in inputs {
        let duration = input.duration.max(1);
        let end = input.frame.saturating_add(duration).min(max_frames);
        for f in input.frame..end {
            frames[f as usize].insert(input.action);
        }
    }
    frames
}

pub fn run_simulation(request: &SimulationRequest) -> Result<SimulationResult, String> {
    let config = request.physics.clone().unwrap_or_default();
    let mut level = Level::new(request.scene.clone(), config)?;
    if !request.replicates.is_empty() {
        for log in &request.replicates {
            level.add_replicate(log.clone());
        }
        level.reload()?;
    }

    let script = expand_inputs(&request.inputs, request.max_frames);
    let mut trace = Vec::new();
    let mut events = Vec::new();
    let mut outcome = Outcome::Timeout;
    let mut frames_elapsed = 0;

    for (frame, intents) in script.into_iter().enumerate() {
        let frame = frame as u32;
        let tick_events = level.tick(intents);
        frames_elapsed = frame + 1;

        for event in &tick_events {
            match event {
                SimEvent::LevelCompleted { .. } => outcome = Outcome::Completed,
                SimEvent::Paradox { .. } => outcome = Outcome::Paradox,
                SimEvent::Crushed { .. } => outcome = Outcome::Crushed,
                _ => {}
            }
        }
        events.extend(tick_events.into_iter().map(|event| EventRecord {
            frame: frame as u64,
            event,
        }));

        if request.record_interval > 0 && frame % request.record_interval == 0 {
            record(&level, frame, &mut trace);
        }
        if outcome != Outcome::Timeout {
            if request.record_interval == 0 || frame % request.record_interval != 0 {
                record(&level, frame, &mut trace);
            }
            break;
        }
    }

    Ok(SimulationResult {
        outcome,
        frames_elapsed,
        trace,
        events,
        replicates: level.replicate_logs().to_vec(),
    })
}

/// Inactive actors stay in the trace so the frame that ended a life is kept.
fn record(level: &Level, frame: u32, trace: &mut Vec<TraceFrame>) {
    for entity in level.world().iter() {
        let Some(actor) = entity.actor.as_ref() else { continue };
        trace.push(TraceFrame {
            frame,
            actor: entity.id,
            recording: actor.life.is_recording(),
            active: entity.active,
            x: entity.body.aabb.center.x,
            y: entity.body.aabb.center.y,
            vx: entity.body.velocity.x,
            vy: entity.body.velocity.y,
            grounded: entity.body.grounded(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUEST: &str = r#"{
        "scene": {
            "name": "door",
            "ordinal": 5,
            "bodies": [
                {"kind": "wall", "x": 0, "y": -0.5, "w": 40, "h": 1},
                {"kind": "exit", "x": 0, "y": 0.8, "w": 1, "h": 1.6}
            ]
        },
        "inputs": [
            {"frame": 10, "action": "right", "duration": 5},
            {"frame": 15, "action": "left", "duration": 5},
            {"frame": 50, "action": "exit"}
        ],
        "max_frames": 200,
        "record_interval": 10
    }"#;

    #[test]
    fn script_expands_with_durations() {
        let inputs = vec![
            SimInput {
                frame: 1,
                action: Intent::Jump,
                duration: 3,
            },
            SimInput {
                frame: 2,
                action: Intent::MoveLeft,
                duration: 0,
            },
            SimInput {
                frame: 4,
                action: Intent::Exit,
                duration: 10,
            },
        ];
        let frames = expand_inputs(&inputs, 6);
        assert_eq!(frames.len(), 6);
        assert!(frames[0].is_empty());
        assert!(frames[3].contains(Intent::Jump));
        assert!(!frames[4].contains(Intent::Jump));
        assert!(frames[2].contains(Intent::MoveLeft) && !frames[3].contains(Intent::MoveLeft));
        assert!(frames[5].contains(Intent::Exit));
    }

    #[test]
    fn scripted_run_completes() {
        let request: SimulationRequest = serde_json::from_str(REQUEST).unwrap();
        let result = run_simulation(&request).unwrap();
        assert_eq!(result.outcome, Outcome::Completed);
        assert_eq!(result.frames_elapsed, 51);
        assert!(result
            .events
            .iter()
            .any(|r| r.frame == 50 && matches!(r.event, SimEvent::ActorExited { .. })));
        // frames 0, 10, 20, 30, 40 and the final frame
        assert_eq!(result.trace.len(), 6);
        let last = result.trace.last().unwrap();
        assert_eq!(last.frame, 50);
        assert!(last.recording && !last.active);
        assert!(result.trace[..5].iter().all(|f| f.active));
    }

    #[test]
    fn short_script_times_out() {
        let mut request: SimulationRequest = serde_json::from_str(REQUEST).unwrap();
        request.max_frames = 30;
        let result = run_simulation(&request).unwrap();
        assert_eq!(result.outcome, Outcome::Timeout);
        assert_eq!(result.frames_elapsed, 30);
    }

    #[test]
    fn exhausted_replicate_reports_paradox() {
        let mut request: SimulationRequest = serde_json::from_str(REQUEST).unwrap();
        request.inputs.clear();
        request.replicates = vec![vec![IntentSet::EMPTY; 12].into()];
        let result = run_simulation(&request).unwrap();
        assert_eq!(result.outcome, Outcome::Paradox);
        assert_eq!(result.frames_elapsed, 13);
    }

    #[test]
    fn bad_scene_is_an_error() {
        let mut request: SimulationRequest = serde_json::from_str(REQUEST).unwrap();
        request.scene.bodies.pop();
        assert!(run_simulation(&request).is_err());
    }
}
