//! Deterministic simulation core for a time-loop puzzle platformer: kinematic
//! bodies, carrying and stacking, buttons and elevators, and recorded lives that
//! replay alongside the live one.

pub mod actor;
pub mod actuator;
pub mod body;
pub mod category;
pub mod config;
pub mod events;
pub mod geometry;
pub mod intent;
pub mod level;
#[cfg(not(target_arch = "wasm32"))]
pub mod level_watcher;
pub mod ownership;
pub mod plugin;
pub mod raycast;
pub mod render;
pub mod replay;
pub mod scene;
pub mod simulation;
pub mod transport;
pub mod world;
