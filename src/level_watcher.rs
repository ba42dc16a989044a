use std::path::{Path, PathBuf};

use bevy::prelude::*;
use crossbeam_channel::{Receiver, Sender};
use notify::{Event as NotifyEvent, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::plugin::ActiveLevel;
use crate::scene::SceneDesc;

/// Rebuilds the active level whenever its description file is saved.
pub struct LevelWatcherPlugin {
    pub path: PathBuf,
}

#[derive(Resource)]
pub struct LevelWatchReceiver(pub Receiver<String>);

impl Plugin for LevelWatcherPlugin {
    fn build(&self, app: &mut App) {
        let (tx, rx) = crossbeam_channel::unbounded::<String>();
        app.insert_resource(LevelWatchReceiver(rx));

        let path = self.path.clone();
        std::thread::spawn(move || run_watcher(path, tx));

        app.add_systems(
            Update,
            apply_level_changes.run_if(resource_exists::<ActiveLevel>),
        );
    }
}

fn run_watcher(path: PathBuf, tx: Sender<String>) {
    let watched = path.clone();
    let mut watcher: RecommendedWatcher =
        match notify::recommended_watcher(move |res: Result<NotifyEvent, notify::Error>| {
            if let Ok(event) = res {
                handle_fs_event(event, &tx, &watched);
            }
        }) {
            Ok(w) => w,
            Err(e) => {
                eprintln!("[Timeloop watcher] Failed to create watcher: {e}");
                return;
            }
        };

    // notify watches directories, not single files
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if let Err(e) = watcher.watch(&parent, RecursiveMode::NonRecursive) {
        eprintln!("[Timeloop watcher] Failed to watch {}: {e}", parent.display());
        return;
    }
    println!("[Timeloop watcher] Watching level: {}", path.display());

    // the watcher stops when dropped
    loop {
        std::thread::sleep(std::time::Duration::from_secs(60));
    }
}

fn handle_fs_event(event: NotifyEvent, tx: &Sender<String>, level_path: &Path) {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return;
    }
    for path in &event.paths {
        if !path_matches(path, level_path) {
            continue;
        }
        if let Ok(content) = std::fs::read_to_string(path) {
            let _ = tx.send(content);
        }
    }
}

fn path_matches(a: &Path, b: &Path) -> bool {
    let ca = std::fs::canonicalize(a).unwrap_or_else(|_| a.to_path_buf());
    let cb = std::fs::canonicalize(b).unwrap_or_else(|_| b.to_path_buf());
    ca == cb
}

/// Only the newest pending save is applied; a broken file keeps the running level.
fn apply_level_changes(receiver: Res<LevelWatchReceiver>, mut level: ResMut<ActiveLevel>) {
    let Some(content) = receiver.0.try_iter().last() else {
        return;
    };
    match SceneDesc::from_json(&content) {
        Ok(scene) => {
            let name = scene.name.clone();
            match level.0.replace_scene(scene) {
                Ok(()) => info!("[Timeloop watcher] Reloaded level '{name}'"),
                Err(e) => warn!("[Timeloop watcher] Level '{name}' rejected: {e}"),
            }
        }
        Err(e) => warn!("[Timeloop watcher] Level parse error: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhysicsConfig;
    use crate::level::Level;
    use crate::plugin::TimeloopPlugin;

    const FIRST: &str = r#"{
        "name": "first",
        "bodies": [
            {"kind": "wall", "x": 0, "y": -0.5, "w": 20, "h": 1},
            {"kind": "exit", "x": 0, "y": 0.8, "w": 1, "h": 1.6}
        ]
    }"#;

    const SECOND: &str = r#"{
        "name": "second",
        "bodies": [
            {"kind": "wall", "x": 0, "y": -0.5, "w": 20, "h": 1},
            {"kind": "block", "x": 3, "y": 0.5, "w": 1, "h": 1},
            {"kind": "exit", "x": -4, "y": 0.8, "w": 1, "h": 1.6}
        ]
    }"#;

    fn app() -> (App, Sender<String>) {
        let mut app = App::new();
        app.add_plugins(TimeloopPlugin);
        let level = Level::new(SceneDesc::from_json(FIRST).unwrap(), PhysicsConfig::default())
            .unwrap();
        app.insert_resource(ActiveLevel(level));
        let (tx, rx) = crossbeam_channel::unbounded();
        app.insert_resource(LevelWatchReceiver(rx));
        app.add_systems(Update, apply_level_changes);
        (app, tx)
    }

    #[test]
    fn saved_level_replaces_the_running_one() {
        let (mut app, tx) = app();
        tx.send(SECOND.to_string()).unwrap();
        app.update();
        let level = &app.world().resource::<ActiveLevel>().0;
        assert_eq!(level.scene().name, "second");
        assert_eq!(level.tick_count(), 0);
    }

    #[test]
    fn broken_save_keeps_the_running_level() {
        let (mut app, tx) = app();
        tx.send("{ not json".to_string()).unwrap();
        tx.send(r#"{"name": "no exit", "bodies": []}"#.to_string())
            .unwrap();
        app.update();
        assert_eq!(app.world().resource::<ActiveLevel>().0.scene().name, "first");
    }

    #[test]
    fn only_the_newest_save_counts() {
        let (mut app, tx) = app();
        tx.send(SECOND.to_string()).unwrap();
        tx.send(FIRST.replace("first", "third")).unwrap();
        app.update();
        assert_eq!(app.world().resource::<ActiveLevel>().0.scene().name, "third");
    }
}
