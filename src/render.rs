use std::collections::HashMap;

use bevy::prelude::*;

use crate::category::Category;
use crate::plugin::ActiveLevel;
use crate::world::{Entity as SimEntity, EntityId};

/// Screen pixels per world unit.
pub const PIXELS_PER_UNIT: f32 = 40.0;

/// Draws every active body of the level as a flat rectangle.
pub struct RenderPlugin;

impl Plugin for RenderPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<BodySprites>()
            .add_systems(Startup, spawn_camera)
            .add_systems(Update, sync_body_sprites.run_if(resource_exists::<ActiveLevel>));
    }
}

/// Sprite entity for each simulation body id.
#[derive(Resource, Default)]
pub struct BodySprites(pub HashMap<EntityId, Entity>);

#[derive(Component)]
pub struct BodySprite(pub EntityId);

/// Level rooms are built upward from a floor at y = 0.
const CAMERA_HEIGHT: f32 = 3.5;

fn spawn_camera(mut commands: Commands) {
    commands.spawn((
        Camera2d,
        Transform::from_xyz(0.0, CAMERA_HEIGHT * PIXELS_PER_UNIT, 0.0),
    ));
}

pub fn body_color(body: &SimEntity) -> Color {
    match body.category {
        Category::Static => Color::srgb(0.28, 0.3, 0.34),
        Category::Moving => Color::srgb(0.35, 0.5, 0.7),
        Category::SwitchPlate => Color::srgb(0.85, 0.55, 0.2),
        Category::Stackable => Color::srgb(0.6, 0.45, 0.3),
        Category::Actor => match body.actor.as_ref() {
            Some(actor) if actor.life.is_recording() => Color::srgb(0.9, 0.9, 0.95),
            _ => Color::srgba(0.55, 0.8, 0.95, 0.7),
        },
        Category::Exit => match body.exit {
            Some(exit) if exit.unlocked() => Color::srgb(0.3, 0.85, 0.4),
            _ => Color::srgb(0.7, 0.2, 0.2),
        },
        Category::Key => Color::srgb(0.95, 0.85, 0.2),
    }
}

/// Exits and keys sit behind everything that moves.
fn depth(category: Category) -> f32 {
    match category {
        Category::Exit | Category::Key => 0.0,
        Category::Actor => 2.0,
        _ => 1.0,
    }
}

fn sync_body_sprites(
    mut commands: Commands,
    level: Res<ActiveLevel>,
    mut sprites: ResMut<BodySprites>,
    mut query: Query<(&BodySprite, &mut Sprite, &mut Transform, &mut Visibility)>,
) {
    let world = level.0.world();

    // ids are reassigned on every rebuild, so stale sprites go first
    sprites.0.retain(|id, entity| {
        let keep = world.get(*id).is_some();
        if !keep {
            commands.entity(*entity).despawn();
        }
        keep
    });

    for sim in world.iter() {
        let size = sim.body.aabb.half * 2.0 * PIXELS_PER_UNIT;
        let translation = (sim.body.aabb.center * PIXELS_PER_UNIT).extend(depth(sim.category));
        let visibility = if sim.active {
            Visibility::Inherited
        } else {
            Visibility::Hidden
        };

        if let Some(entity) = sprites.0.get(&sim.id) {
            if let Ok((_, mut sprite, mut transform, mut vis)) = query.get_mut(*entity) {
                sprite.color = body_color(sim);
                sprite.custom_size = Some(size);
                transform.translation = translation;
                *vis = visibility;
            }
            continue;
        }

        let entity = commands
            .spawn((
                BodySprite(sim.id),
                Sprite {
                    color: body_color(sim),
                    custom_size: Some(size),
                    ..default()
                },
                Transform::from_translation(translation),
                visibility,
            ))
            .id();
        sprites.0.insert(sim.id, entity);
    }
}
