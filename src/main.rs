use std::path::PathBuf;

use bevy::prelude::*;
use timeloop::config::PhysicsConfig;
use timeloop::level::Level;
use timeloop::plugin::{ActiveLevel, TimeloopPlugin};
use timeloop::render::RenderPlugin;
use timeloop::scene::SceneDesc;
use timeloop::simulation::{run_simulation, SimulationRequest};

const EMBEDDED_LEVEL: &str =
    include_str!(concat!(env!("OUT_DIR"), "/timeloop_embedded_level.json"));

#[derive(serde::Deserialize, Default)]
#[serde(default)]
struct StartupConfig {
    level: Option<String>,
    physics: PhysicsConfig,
    window_title: Option<String>,
    window_width: Option<f32>,
    window_height: Option<f32>,
    background_color: Option<[f32; 3]>,
}

fn load_startup_config() -> StartupConfig {
    let path = std::env::var("TIMELOOP_CONFIG")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "timeloop.json".to_string());
    match std::fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<StartupConfig>(&contents) {
            Ok(cfg) => {
                println!("[Timeloop] Loaded startup config from {}", path);
                cfg
            }
            Err(e) => {
                eprintln!("[Timeloop] Failed to parse {}: {}", path, e);
                StartupConfig::default()
            }
        },
        Err(_) => StartupConfig::default(),
    }
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

/// Runs a scripted request file and prints the result as JSON.
fn run_headless(path: &str) -> Result<(), String> {
    let text =
        std::fs::read_to_string(path).map_err(|e| format!("Failed to read {path}: {e}"))?;
    let request: SimulationRequest =
        serde_json::from_str(&text).map_err(|e| format!("Invalid request {path}: {e}"))?;
    let result = run_simulation(&request)?;
    let json = serde_json::to_string_pretty(&result).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}

/// The configured level file, or the level embedded at build time.
fn load_scene(path: Option<&str>) -> Result<(SceneDesc, Option<PathBuf>), String> {
    if let Some(path) = path {
        let path = PathBuf::from(path);
        match SceneDesc::load(&path) {
            Ok(scene) => return Ok((scene, Some(path))),
            Err(e) => eprintln!("[Timeloop] {e}; falling back to the embedded level"),
        }
    }
    let scene = SceneDesc::from_json(EMBEDDED_LEVEL)?;
    Ok((scene, None))
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if let Some(path) = arg_value(&args, "--headless") {
        if let Err(e) = run_headless(&path) {
            eprintln!("[Timeloop headless] {e}");
            std::process::exit(1);
        }
        return;
    }

    if args.iter().any(|a| a == "--verify-embedded-level") {
        match SceneDesc::from_json(EMBEDDED_LEVEL).and_then(|s| s.validate().map(|_| s)) {
            Ok(scene) => {
                println!(
                    "[Timeloop] Embedded level OK: '{}' ({} bodies)",
                    scene.name,
                    scene.bodies.len()
                );
                return;
            }
            Err(e) => {
                eprintln!("[Timeloop] Embedded level invalid: {e}");
                std::process::exit(2);
            }
        }
    }

    let startup_config = load_startup_config();
    let level_arg = arg_value(&args, "--level").or(startup_config.level.clone());
    let (scene, level_path) = match load_scene(level_arg.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("[Timeloop] {e}");
            std::process::exit(2);
        }
    };
    let level = match Level::new(scene, startup_config.physics) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("[Timeloop] Level failed to build: {e}");
            std::process::exit(2);
        }
    };
    // the level holds the sanitized rate
    let tick_hz = level.config().tick_hz;

    let window_title = startup_config
        .window_title
        .unwrap_or_else(|| "Timeloop".to_string());
    let window_width = startup_config.window_width.unwrap_or(960.0);
    let window_height = startup_config.window_height.unwrap_or(540.0);
    let bg = startup_config.background_color.unwrap_or([0.08, 0.09, 0.12]);

    let mut app = App::new();
    app.add_plugins(DefaultPlugins.set(WindowPlugin {
        primary_window: Some(Window {
            title: window_title,
            resolution: (window_width, window_height).into(),
            present_mode: bevy::window::PresentMode::AutoVsync,
            ..default()
        }),
        ..default()
    }))
    .insert_resource(ClearColor(Color::srgb(bg[0], bg[1], bg[2])))
    .insert_resource(Time::<Fixed>::from_hz(tick_hz))
    .insert_resource(ActiveLevel(level))
    .add_plugins(TimeloopPlugin)
    .add_plugins(RenderPlugin);

    #[cfg(not(target_arch = "wasm32"))]
    if let Some(path) = level_path {
        app.add_plugins(timeloop::level_watcher::LevelWatcherPlugin { path });
    }

    println!("[Timeloop] Running at {tick_hz} Hz");
    app.run();
}
