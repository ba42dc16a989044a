//! JSON level description and world construction.

use std::collections::BTreeMap;

use bevy::log::info;
use bevy::math::Vec2;
use serde::{Deserialize, Serialize};

use crate::actuator::Actuator;
use crate::body::Body;
use crate::category::{Category, CategoryMask};
use crate::config::PhysicsConfig;
use crate::geometry::Aabb;
use crate::world::{
    CarriableRole, Entity, EntityId, ExitState, KeyState, StackRole, SupportRole, Transporter,
    World,
};

fn default_travel() -> f32 {
    0.2
}

fn default_button_speed() -> f32 {
    2.0
}

fn default_elevator_speed() -> f32 {
    1.5
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BodyKind {
    Wall,
    Block,
    Button {
        /// Names of the elevators this button raises while occupied.
        #[serde(default)]
        controls: Vec<String>,
        #[serde(default = "default_travel")]
        travel: f32,
        #[serde(default = "default_button_speed")]
        speed: f32,
    },
    Elevator {
        rise: f32,
        #[serde(default = "default_elevator_speed")]
        speed: f32,
    },
    Exit {
        #[serde(default)]
        keys: u32,
    },
    Key {
        #[serde(default)]
        replicate_only: bool,
    },
}

/// One placed body. `x`/`y` is the center.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodyDesc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    #[serde(flatten)]
    pub kind: BodyKind,
}

/// Character grid; `#` is solid. Row 0 is the top row and `origin` is the
/// bottom-left corner of the grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileGrid {
    #[serde(default)]
    pub origin: Vec2,
    #[serde(default = "default_cell")]
    pub cell: f32,
    pub rows: Vec<String>,
}

fn default_cell() -> f32 {
    1.0
}

impl TileGrid {
    /// Solid runs of each row merged into one wall box per run.
    pub fn walls(&self) -> Vec<Aabb> {
        let mut walls = Vec::new();
        let height = self.rows.len();
        for (r, row) in self.rows.iter().enumerate() {
            let bottom = self.origin.y + (height - 1 - r) as f32 * self.cell;
            let mut run_start: Option<usize> = None;
            let cells: Vec<char> = row.chars().collect();
            for c in 0..=cells.len() {
                let solid = cells.get(c).is_some_and(|ch| *ch == '#');
                match (solid, run_start) {
                    (true, None) => run_start = Some(c),
                    (false, Some(start)) => {
                        let min = Vec2::new(self.origin.x + start as f32 * self.cell, bottom);
                        let max =
                            Vec2::new(self.origin.x + c as f32 * self.cell, bottom + self.cell);
                        walls.push(Aabb::from_min_max(min, max));
                        run_start = None;
                    }
                    _ => {}
                }
            }
        }
        walls
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneDesc {
    #[serde(default)]
    pub name: String,
    /// Position of the level in the campaign, reported on completion.
    #[serde(default)]
    pub ordinal: u32,
    /// Actor spawn center. Derived from the exit when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn: Option<Vec2>,
    #[serde(default)]
    pub bodies: Vec<BodyDesc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiles: Option<TileGrid>,
}

/// A freshly built world and where actors appear in it.
pub struct BuiltScene {
    pub world: World,
    pub spawn: Vec2,
}

impl SceneDesc {
    pub fn from_json(text: &str) -> Result<Self, String> {
        serde_json::from_str(text).map_err(|e| format!("Invalid scene JSON: {e}"))
    }

    pub fn load(path: &std::path::Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut names = BTreeMap::new();
        let mut exits = 0;
        for (i, body) in self.bodies.iter().enumerate() {
            let label = body.name.clone().unwrap_or_else(|| format!("body {i}"));
            if !(body.w > 0.0 && body.h > 0.0) {
                return Err(format!("{label} must have positive size"));
            }
            if let Some(name) = &body.name {
                if names.insert(name.as_str(), &body.kind).is_some() {
                    return Err(format!("Duplicate body name '{name}'"));
                }
            }
            match &body.kind {
                BodyKind::Exit { .. } => exits += 1,
                BodyKind::Elevator { rise, speed } if *rise < 0.0 || *speed <= 0.0 => {
                    return Err(format!("{label} needs a non-negative rise and positive speed"));
                }
                BodyKind::Button { travel, speed, .. } if *travel < 0.0 || *speed <= 0.0 => {
                    return Err(format!("{label} needs a non-negative travel and positive speed"));
                }
                _ => {}
            }
        }
        if exits != 1 {
            return Err(format!("Scene must have exactly one exit, found {exits}"));
        }
        for body in &self.bodies {
            let BodyKind::Button { controls, .. } = &body.kind else {
                continue;
            };
            for target in controls {
                match names.get(target.as_str()) {
                    Some(BodyKind::Elevator { .. }) => {}
                    Some(_) => {
                        return Err(format!(
                            "Button controls '{target}', which is not an elevator"
                        ))
                    }
                    None => return Err(format!("Button controls unknown elevator '{target}'")),
                }
            }
        }
        if let Some(tiles) = &self.tiles {
            if tiles.cell <= 0.0 {
                return Err("Tile cell size must be positive".to_string());
            }
        }
        Ok(())
    }

    /// Builds the scene bodies in declaration order, tile walls last.
    pub fn build(&self, config: &PhysicsConfig) -> Result<BuiltScene, String> {
        self.validate()?;
        let mut world = World::default();
        let mut buttons: Vec<(EntityId, &[String])> = Vec::new();

        for body in &self.bodies {
            let aabb = Aabb::from_center(body.x, body.y, body.w, body.h);
            let mut entity = match &body.kind {
                BodyKind::Wall => Entity::new(Category::Static, aabb),
                BodyKind::Block => block(aabb),
                BodyKind::Button {
                    travel, speed, ..
                } => {
                    let mut e = Entity::new(Category::SwitchPlate, aabb);
                    e.actuator = Some(Actuator::button(aabb.center.y, *travel, *speed, Vec::new()));
                    e.transporter = Some(Transporter {
                        passengers: CategoryMask::PASSENGERS,
                        passenger_only: true,
                    });
                    e
                }
                BodyKind::Elevator { rise, speed } => {
                    let mut e = Entity::new(Category::Moving, aabb);
                    e.actuator = Some(Actuator::elevator(aabb.center.y, *rise, *speed));
                    e.transporter = Some(Transporter {
                        passengers: CategoryMask::PASSENGERS,
                        passenger_only: false,
                    });
                    e
                }
                BodyKind::Exit { keys } => {
                    let mut e = Entity::new(Category::Exit, aabb);
                    e.exit = Some(ExitState::new(*keys));
                    e
                }
                BodyKind::Key { replicate_only } => {
                    let mut e = Entity::new(Category::Key, aabb);
                    e.key = Some(KeyState {
                        replicate_only: *replicate_only,
                    });
                    e
                }
            };
            entity.name = body.name.clone();
            let id = world.spawn(entity);
            if let BodyKind::Button { controls, .. } = &body.kind {
                buttons.push((id, controls));
            }
        }

        for (button, names) in buttons {
            let ids: Vec<EntityId> = names.iter().filter_map(|n| world.find(n)).collect();
            if let Some(crate::actuator::ActuatorRole::Button { controls, .. }) = world
                .get_mut(button)
                .and_then(|e| e.actuator.as_mut())
                .map(|a| &mut a.role)
            {
                *controls = ids;
            }
        }

        if let Some(tiles) = &self.tiles {
            let walls = tiles.walls();
            info!(
                "[Timeloop scene] {} tile rows merged into {} walls",
                tiles.rows.len(),
                walls.len()
            );
            for aabb in walls {
                world.spawn(Entity::new(Category::Static, aabb));
            }
        }

        let spawn = match self.spawn {
            Some(spawn) => spawn,
            None => {
                let exit = world
                    .exit()
                    .map(|e| e.body.aabb)
                    .ok_or_else(|| "Scene must have exactly one exit, found 0".to_string())?;
                Vec2::new(exit.center.x, exit.center.y - config.spawn_offset)
            }
        };
        Ok(BuiltScene { world, spawn })
    }
}

/// A dynamic, carriable, stackable box that carries what rests on it.
pub fn block(aabb: Aabb) -> Entity {
    let mut e = Entity::new(Category::Stackable, aabb);
    e.body = Body::dynamic(aabb, CategoryMask::STRUCTURES, CategoryMask::STACKABLES);
    e.carriable = Some(CarriableRole::default());
    e.support = Some(SupportRole::default());
    e.stack = Some(StackRole::default());
    e.transporter = Some(Transporter {
        passengers: CategoryMask::PASSENGERS,
        passenger_only: true,
    });
    e
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE: &str = r##"{
        "name": "lift",
        "ordinal": 3,
        "bodies": [
            {"kind": "wall", "x": 0, "y": -0.5, "w": 20, "h": 1},
            {"kind": "button", "name": "plate", "x": -3, "y": 0.1, "w": 1, "h": 0.2,
             "controls": ["lift"]},
            {"kind": "elevator", "name": "lift", "x": 3, "y": 0.25, "w": 2, "h": 0.5, "rise": 2},
            {"kind": "block", "x": 1, "y": 0.5, "w": 1, "h": 1},
            {"kind": "exit", "x": 6, "y": 0.8, "w": 1, "h": 1.6, "keys": 1},
            {"kind": "key", "x": 3, "y": 4, "w": 0.5, "h": 0.5, "replicate_only": true}
        ]
    }"##;

    #[test]
    fn scene_builds_roles_and_links_controls() {
        let scene = SceneDesc::from_json(SCENE).unwrap();
        let built = scene.build(&PhysicsConfig::default()).unwrap();
        let world = &built.world;
        let plate = world.find("plate").unwrap();
        let lift = world.find("lift").unwrap();
        assert_eq!(world.get(plate).unwrap().actuator.as_ref().unwrap().controls(), &[lift]);
        assert_eq!(world.get(lift).unwrap().category, Category::Moving);
        assert_eq!(world.exit().unwrap().exit.unwrap().keys_remaining, 1);
        let key = world.iter().find(|e| e.key.is_some()).unwrap();
        assert!(key.key.unwrap().replicate_only);
        // spawn sits under the exit center by the configured offset
        assert!((built.spawn.x - 6.0).abs() < 1e-6);
        assert!((built.spawn.y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn unknown_control_target_is_rejected() {
        let mut scene = SceneDesc::from_json(SCENE).unwrap();
        if let BodyKind::Button { controls, .. } = &mut scene.bodies[1].kind {
            controls.push("nowhere".to_string());
        }
        let err = scene.build(&PhysicsConfig::default()).err().unwrap();
        assert!(err.contains("nowhere"));
    }

    #[test]
    fn exactly_one_exit_required() {
        let mut scene = SceneDesc::from_json(SCENE).unwrap();
        scene.bodies.retain(|b| !matches!(b.kind, BodyKind::Exit { .. }));
        assert!(scene.validate().unwrap_err().contains("exactly one exit"));
    }

    #[test]
    fn zero_sized_body_is_rejected() {
        let mut scene = SceneDesc::from_json(SCENE).unwrap();
        scene.bodies[3].w = 0.0;
        assert!(scene.validate().is_err());
    }

    #[test]
    fn tile_runs_merge_into_walls() {
        let grid = TileGrid {
            origin: Vec2::new(-2.0, 0.0),
            cell: 1.0,
            rows: vec!["#..##".to_string(), "#####".to_string()],
        };
        let walls = grid.walls();
        assert_eq!(walls.len(), 3);
        // top row, single cell at the left edge
        assert_eq!(walls[0], Aabb::from_min_max(Vec2::new(-2.0, 1.0), Vec2::new(-1.0, 2.0)));
        assert_eq!(walls[1], Aabb::from_min_max(Vec2::new(1.0, 1.0), Vec2::new(3.0, 2.0)));
        assert_eq!(walls[2], Aabb::from_min_max(Vec2::new(-2.0, 0.0), Vec2::new(3.0, 1.0)));
    }

    #[test]
    fn explicit_spawn_wins() {
        let mut scene = SceneDesc::from_json(SCENE).unwrap();
        scene.spawn = Some(Vec2::new(-1.0, 0.5));
        let built = scene.build(&PhysicsConfig::default()).unwrap();
        assert_eq!(built.spawn, Vec2::new(-1.0, 0.5));
    }
}
