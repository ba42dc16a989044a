use bevy::math::Vec2;
use serde::Serialize;

use crate::category::CategoryMask;
use crate::geometry::{Aabb, Direction};
use crate::raycast::{EdgeCast, Raycaster};
use crate::world::{EntityId, World};

/// Per-side contact flags. Valid only for the tick that computed them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Contacts {
    pub above: bool,
    pub below: bool,
    pub left: bool,
    pub right: bool,
    /// What the body is standing on, when `below` came from a hit.
    pub ground: Option<EntityId>,
}

impl Contacts {
    pub fn get(&self, side: Direction) -> bool {
        match side {
            Direction::Left => self.left,
            Direction::Right => self.right,
            Direction::Up => self.above,
            Direction::Down => self.below,
        }
    }

    fn mark(&mut self, side: Direction, ground: Option<EntityId>) {
        match side {
            Direction::Left => self.left = true,
            Direction::Right => self.right = true,
            Direction::Up => self.above = true,
            Direction::Down => {
                self.below = true;
                if ground.is_some() {
                    self.ground = ground;
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Body {
    pub aabb: Aabb,
    pub velocity: Vec2,
    pub gravity_scale: f32,
    pub contacts: Contacts,
    /// Categories that stop this body from every direction.
    pub solid_mask: CategoryMask,
    /// Categories this body may land on from above but pass through otherwise.
    pub one_way_mask: CategoryMask,
}

impl Body {
    pub fn fixed(aabb: Aabb) -> Self {
        Self {
            aabb,
            velocity: Vec2::ZERO,
            gravity_scale: 0.0,
            contacts: Contacts::default(),
            solid_mask: CategoryMask::NONE,
            one_way_mask: CategoryMask::NONE,
        }
    }

    pub fn dynamic(aabb: Aabb, solid_mask: CategoryMask, one_way_mask: CategoryMask) -> Self {
        Self {
            gravity_scale: 1.0,
            solid_mask,
            one_way_mask,
            ..Self::fixed(aabb)
        }
    }

    pub fn grounded(&self) -> bool {
        self.contacts.below
    }

    /// Gravity applies only while airborne. A grounded body loses downward velocity.
    pub fn apply_gravity(&mut self, gravity: f32, max_fall_speed: f32, dt: f32) {
        if self.contacts.below {
            if self.velocity.y < 0.0 {
                self.velocity.y = 0.0;
            }
            return;
        }
        self.velocity.y -= gravity * self.gravity_scale * dt;
        self.velocity.y = self.velocity.y.max(-max_fall_speed);
    }

    /// Drops vertical velocity into whatever the last resolve ran into.
    pub fn settle_velocity(&mut self) {
        if (self.contacts.below && self.velocity.y < 0.0)
            || (self.contacts.above && self.velocity.y > 0.0)
        {
            self.velocity.y = 0.0;
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Resolution {
    pub displacement: Vec2,
    pub contacts: Contacts,
}

#[derive(Clone, Copy, Debug)]
pub struct ResolveOptions {
    /// Merge with the body's existing flags instead of starting clean.
    pub preserve_contacts: bool,
    pub one_way: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            preserve_contacts: false,
            one_way: true,
        }
    }
}

/// Collision-resolves `desired` for body `id` without moving it.
/// Horizontal first, then vertical shifted by the horizontal step.
/// Returns `None` for an unknown id.
pub fn resolve(
    world: &World,
    caster: &Raycaster,
    id: EntityId,
    desired: Vec2,
    options: ResolveOptions,
) -> Option<Resolution> {
    let body = &world.get(id)?.body;
    let skin = caster.skin;
    let exclude = [id];
    let mut contacts = if options.preserve_contacts {
        body.contacts
    } else {
        Contacts::default()
    };
    let mut d = desired;

    match Direction::from_dx(d.x) {
        Some(dir) => {
            let cast = EdgeCast {
                edge: dir,
                distance: d.x.abs() + skin,
                mask: body.solid_mask,
                shift: 0.0,
            };
            if let Some(hit) = caster.cast(world, &exclude, &body.aabb, &cast, |_| true) {
                d.x = (hit.distance - skin).max(0.0) * dir.sign();
                contacts.mark(dir, Some(hit.entity));
            }
        }
        None => {
            for side in [Direction::Left, Direction::Right] {
                let hit = touch(world, caster, &exclude, &body.aabb, side, body.solid_mask, 0.0);
                if let Some(hit) = hit {
                    contacts.mark(side, Some(hit));
                }
            }
        }
    }

    match Direction::from_dy(d.y) {
        Some(dir) => {
            let cast = EdgeCast {
                edge: dir,
                distance: d.y.abs() + skin,
                mask: body.solid_mask,
                shift: d.x,
            };
            if let Some(hit) = caster.cast(world, &exclude, &body.aabb, &cast, |_| true) {
                d.y = (hit.distance - skin).max(0.0) * dir.sign();
                contacts.mark(dir, Some(hit.entity));
            }
            if dir == Direction::Down && options.one_way && !body.one_way_mask.is_empty() {
                let bottom = body.aabb.bottom();
                let cast = EdgeCast {
                    edge: Direction::Down,
                    distance: d.y.abs() + skin,
                    mask: body.one_way_mask,
                    shift: d.x,
                };
                let below_only = |e: &crate::world::Entity| e.body.aabb.top() <= bottom + skin;
                if let Some(hit) = caster.cast(world, &exclude, &body.aabb, &cast, below_only) {
                    d.y = -(hit.distance - skin).max(0.0);
                    contacts.mark(Direction::Down, Some(hit.entity));
                }
            }
        }
        None => {
            let ceiling =
                touch(world, caster, &exclude, &body.aabb, Direction::Up, body.solid_mask, d.x);
            if let Some(hit) = ceiling {
                contacts.mark(Direction::Up, Some(hit));
            }
            let ground = touch(
                world,
                caster,
                &exclude,
                &body.aabb,
                Direction::Down,
                body.solid_mask,
                d.x,
            )
            .or_else(|| {
                if !options.one_way {
                    return None;
                }
                let bottom = body.aabb.bottom();
                let cast = EdgeCast {
                    edge: Direction::Down,
                    distance: skin * 2.0,
                    mask: body.one_way_mask,
                    shift: d.x,
                };
                caster
                    .cast(world, &exclude, &body.aabb, &cast, |e| {
                        e.body.aabb.top() <= bottom + skin
                    })
                    .map(|hit| hit.entity)
            });
            if let Some(hit) = ground {
                contacts.mark(Direction::Down, Some(hit));
            }
        }
    }

    Some(Resolution {
        displacement: d,
        contacts,
    })
}

/// Short probe for a neighbour touching `side`, without any motion.
fn touch(
    world: &World,
    caster: &Raycaster,
    exclude: &[EntityId],
    aabb: &Aabb,
    side: Direction,
    mask: CategoryMask,
    shift: f32,
) -> Option<EntityId> {
    if mask.is_empty() {
        return None;
    }
    let cast = EdgeCast {
        edge: side,
        distance: caster.skin * 2.0,
        mask,
        shift,
    };
    caster
        .cast(world, exclude, aabb, &cast, |_| true)
        .map(|hit| hit.entity)
}

/// Recomputes contact flags in place without moving the body.
pub fn refresh_contacts(world: &mut World, caster: &Raycaster, id: EntityId) -> Option<Contacts> {
    let resolution = resolve(world, caster, id, Vec2::ZERO, ResolveOptions::default())?;
    let entity = world.get_mut(id)?;
    entity.body.contacts = resolution.contacts;
    Some(resolution.contacts)
}

/// Moves the body by a resolution computed earlier this tick.
pub fn apply(world: &mut World, id: EntityId, resolution: &Resolution) {
    if let Some(entity) = world.get_mut(id) {
        entity.body.aabb.center += resolution.displacement;
        entity.body.contacts = resolution.contacts;
    }
}

/// Resolve and apply in one step. Returns the displacement actually taken.
pub fn move_body(
    world: &mut World,
    caster: &Raycaster,
    id: EntityId,
    desired: Vec2,
    options: ResolveOptions,
) -> Option<Vec2> {
    let resolution = resolve(world, caster, id, desired, options)?;
    apply(world, id, &resolution);
    Some(resolution.displacement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;
    use crate::world::Entity;

    const SKIN: f32 = 0.015;

    fn caster() -> Raycaster {
        Raycaster::new(SKIN, 6)
    }

    fn mover(world: &mut World, x: f32, y: f32) -> EntityId {
        let aabb = Aabb::from_center(x, y, 1.0, 1.0);
        let mut e = Entity::new(Category::Actor, aabb);
        e.body = Body::dynamic(aabb, CategoryMask::STRUCTURES, CategoryMask::STACKABLES);
        world.spawn(e)
    }

    fn solid(world: &mut World, category: Category, x: f32, y: f32, w: f32, h: f32) -> EntityId {
        world.spawn(Entity::new(category, Aabb::from_center(x, y, w, h)))
    }

    #[test]
    fn horizontal_resolve_stops_at_hit_minus_skin() {
        let mut world = World::default();
        let me = mover(&mut world, 0.0, 0.0);
        let wall = solid(&mut world, Category::Static, 2.0, 0.0, 1.0, 4.0);

        let r = resolve(&world, &caster(), me, Vec2::new(3.0, 0.0), ResolveOptions::default())
            .unwrap();
        // gap is 1.0; the ray hit lands at gap + skin
        assert!((r.displacement.x - 1.0).abs() < 1e-5);
        assert!(r.contacts.right);
        assert!(!r.contacts.left);

        let free = resolve(&world, &caster(), me, Vec2::new(0.5, 0.0), ResolveOptions::default())
            .unwrap();
        assert_eq!(free.displacement.x, 0.5);
        assert!(!free.contacts.right);

        // with the wall gone the full motion goes through
        world.get_mut(wall).unwrap().active = false;
        let open = resolve(&world, &caster(), me, Vec2::new(3.0, 0.0), ResolveOptions::default())
            .unwrap();
        assert_eq!(open.displacement.x, 3.0);
        assert!(!open.contacts.right);
    }

    #[test]
    fn resolve_does_not_move_the_body() {
        let mut world = World::default();
        let me = mover(&mut world, 0.0, 0.0);
        resolve(&world, &caster(), me, Vec2::new(1.0, 1.0), ResolveOptions::default()).unwrap();
        assert_eq!(world.aabb(me).unwrap().center, Vec2::ZERO);
    }

    #[test]
    fn falling_body_lands_and_records_ground() {
        let mut world = World::default();
        let me = mover(&mut world, 0.0, 2.0);
        let floor = solid(&mut world, Category::Static, 0.0, -0.5, 10.0, 1.0);

        let moved = move_body(
            &mut world,
            &caster(),
            me,
            Vec2::new(0.0, -3.0),
            ResolveOptions::default(),
        )
        .unwrap();
        assert!((moved.y + 1.5).abs() < 1e-5);
        let body = &world.get(me).unwrap().body;
        assert!(body.contacts.below);
        assert_eq!(body.contacts.ground, Some(floor));
        assert!((body.aabb.bottom() - 0.0).abs() < 1e-5);
    }

    #[test]
    fn diagonal_motion_resolves_horizontal_first() {
        let mut world = World::default();
        let me = mover(&mut world, 0.0, 2.0);
        solid(&mut world, Category::Static, 0.0, -0.5, 10.0, 1.0);
        solid(&mut world, Category::Static, 2.0, 2.0, 1.0, 6.0);

        let r = resolve(&world, &caster(), me, Vec2::new(2.0, -3.0), ResolveOptions::default())
            .unwrap();
        assert!((r.displacement.x - 1.0).abs() < 1e-5);
        assert!((r.displacement.y + 1.5).abs() < 1e-5);
        assert!(r.contacts.right && r.contacts.below);
    }

    #[test]
    fn one_way_pass_ignores_bodies_beside_the_faller() {
        let mut world = World::default();
        let me = mover(&mut world, 0.0, 0.5);
        // beside: its top is above our bottom, so we slide past it
        solid(&mut world, Category::Stackable, 0.6, 0.0, 1.0, 1.0);
        let floor = solid(&mut world, Category::Static, 0.0, -1.5, 10.0, 1.0);

        let r = resolve(&world, &caster(), me, Vec2::new(0.0, -2.0), ResolveOptions::default())
            .unwrap();
        assert!((r.displacement.y + 1.0).abs() < 1e-5);
        assert_eq!(r.contacts.ground, Some(floor));
    }

    #[test]
    fn one_way_pass_lands_on_body_fully_below() {
        let mut world = World::default();
        let me = mover(&mut world, 0.0, 2.0);
        let block = solid(&mut world, Category::Stackable, 0.0, 0.5, 1.0, 1.0);
        solid(&mut world, Category::Static, 0.0, -0.5, 10.0, 1.0);

        let r = resolve(&world, &caster(), me, Vec2::new(0.0, -2.0), ResolveOptions::default())
            .unwrap();
        assert!((r.displacement.y + 0.5).abs() < 1e-5);
        assert_eq!(r.contacts.ground, Some(block));

        // the same block does not stop horizontal motion
        let side = resolve(&world, &caster(), me, Vec2::new(3.0, 0.0), ResolveOptions::default())
            .unwrap();
        assert_eq!(side.displacement.x, 3.0);
    }

    #[test]
    fn refresh_keeps_resting_body_grounded() {
        let mut world = World::default();
        let me = mover(&mut world, 0.0, 0.5);
        solid(&mut world, Category::Static, 0.0, -0.5, 10.0, 1.0);
        solid(&mut world, Category::Static, 1.0, 0.5, 1.0, 1.0);

        let contacts = refresh_contacts(&mut world, &caster(), me).unwrap();
        assert!(contacts.below);
        assert!(contacts.right);
        assert!(!contacts.left && !contacts.above);
    }

    #[test]
    fn preserved_contacts_survive_resolve() {
        let mut world = World::default();
        let me = mover(&mut world, 0.0, 5.0);
        world.get_mut(me).unwrap().body.contacts.above = true;

        let fresh = resolve(&world, &caster(), me, Vec2::new(0.1, 0.0), ResolveOptions::default())
            .unwrap();
        assert!(!fresh.contacts.above);
        let kept = resolve(
            &world,
            &caster(),
            me,
            Vec2::new(0.1, 0.0),
            ResolveOptions {
                preserve_contacts: true,
                ..ResolveOptions::default()
            },
        )
        .unwrap();
        assert!(kept.contacts.above);
    }

    #[test]
    fn gravity_only_while_airborne() {
        let mut body = Body::dynamic(
            Aabb::from_center(0.0, 0.0, 1.0, 1.0),
            CategoryMask::STRUCTURES,
            CategoryMask::NONE,
        );
        body.apply_gravity(10.0, 5.0, 0.1);
        assert!((body.velocity.y + 1.0).abs() < 1e-6);
        for _ in 0..20 {
            body.apply_gravity(10.0, 5.0, 0.1);
        }
        assert_eq!(body.velocity.y, -5.0);
        body.contacts.below = true;
        body.apply_gravity(10.0, 5.0, 0.1);
        assert_eq!(body.velocity.y, 0.0);
    }
}
