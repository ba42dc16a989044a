use bevy::math::Vec2;

use crate::category::CategoryMask;
use crate::geometry::{Aabb, Direction};
use crate::world::{Entity, EntityId, World};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub entity: EntityId,
    pub point: Vec2,
    pub distance: f32,
}

/// One edge-sampled cast: rays leave `edge` of the box travelling outward.
#[derive(Clone, Copy, Debug)]
pub struct EdgeCast {
    pub edge: Direction,
    pub distance: f32,
    pub mask: CategoryMask,
    /// Slides every origin along the edge, e.g. by the horizontal step already taken.
    pub shift: f32,
}

/// Slab test against an axis-aligned box. Origins already inside report distance zero.
pub fn ray_aabb_distance(
    origin: Vec2,
    dir_normalized: Vec2,
    max_distance: f32,
    min: Vec2,
    max: Vec2,
) -> Option<f32> {
    let mut tmin = 0.0f32;
    let mut tmax = max_distance.max(0.0);

    for axis in 0..2 {
        let (o, d, mn, mx) = if axis == 0 {
            (origin.x, dir_normalized.x, min.x, max.x)
        } else {
            (origin.y, dir_normalized.y, min.y, max.y)
        };
        if d.abs() < 1e-6 {
            if o < mn || o > mx {
                return None;
            }
            continue;
        }
        let inv = 1.0 / d;
        let mut t1 = (mn - o) * inv;
        let mut t2 = (mx - o) * inv;
        if t1 > t2 {
            std::mem::swap(&mut t1, &mut t2);
        }
        tmin = tmin.max(t1);
        tmax = tmax.min(t2);
        if tmin > tmax {
            return None;
        }
    }

    (tmin <= max_distance).then_some(tmin)
}

/// Samples box edges with evenly spaced rays, inset by the skin width.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Raycaster {
    pub skin: f32,
    pub rays: usize,
}

impl Raycaster {
    pub fn new(skin: f32, rays: usize) -> Self {
        Self {
            skin: skin.max(0.0),
            rays: rays.max(2),
        }
    }

    /// Distance between neighbouring origins on `edge`.
    pub fn spacing(&self, aabb: &Aabb, edge: Direction) -> f32 {
        let inner = aabb.inset(self.skin);
        let span = if edge.is_horizontal() {
            inner.height()
        } else {
            inner.width()
        };
        span / (self.rays - 1) as f32
    }

    pub fn edge_origins(&self, aabb: &Aabb, edge: Direction, shift: f32) -> Vec<Vec2> {
        let inner = aabb.inset(self.skin);
        let spacing = self.spacing(aabb, edge);
        (0..self.rays)
            .map(|i| {
                let along = spacing * i as f32 + shift;
                match edge {
                    Direction::Left => Vec2::new(inner.left(), inner.bottom() + along),
                    Direction::Right => Vec2::new(inner.right(), inner.bottom() + along),
                    Direction::Up => Vec2::new(inner.left() + along, inner.top()),
                    Direction::Down => Vec2::new(inner.left() + along, inner.bottom()),
                }
            })
            .collect()
    }

    /// Nearest hit over all rays of the edge. Ties go to the lower entity id.
    pub fn cast(
        &self,
        world: &World,
        exclude: &[EntityId],
        aabb: &Aabb,
        cast: &EdgeCast,
        accept: impl Fn(&Entity) -> bool,
    ) -> Option<RayHit> {
        let mut best: Option<RayHit> = None;
        for origin in self.edge_origins(aabb, cast.edge, cast.shift) {
            for hit in self.ray_hits(world, exclude, origin, cast, &accept) {
                let closer = match best {
                    None => true,
                    Some(b) => {
                        hit.distance < b.distance
                            || (hit.distance == b.distance && hit.entity < b.entity)
                    }
                };
                if closer {
                    best = Some(hit);
                }
            }
        }
        best
    }

    /// Every body touched by any ray of the edge, once each at its nearest distance,
    /// sorted by distance then id.
    pub fn cast_all(
        &self,
        world: &World,
        exclude: &[EntityId],
        aabb: &Aabb,
        cast: &EdgeCast,
        accept: impl Fn(&Entity) -> bool,
    ) -> Vec<RayHit> {
        let mut hits: Vec<RayHit> = Vec::new();
        for origin in self.edge_origins(aabb, cast.edge, cast.shift) {
            for hit in self.ray_hits(world, exclude, origin, cast, &accept) {
                match hits.iter_mut().find(|h| h.entity == hit.entity) {
                    Some(existing) if hit.distance < existing.distance => *existing = hit,
                    Some(_) => {}
                    None => hits.push(hit),
                }
            }
        }
        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.entity.cmp(&b.entity))
        });
        hits
    }

    fn ray_hits<'a>(
        &self,
        world: &'a World,
        exclude: &'a [EntityId],
        origin: Vec2,
        cast: &'a EdgeCast,
        accept: &'a impl Fn(&Entity) -> bool,
    ) -> impl Iterator<Item = RayHit> + 'a {
        let dir = cast.edge.vector();
        world
            .active()
            .filter(move |e| cast.mask.contains(e.category) && !exclude.contains(&e.id))
            .filter(move |e| accept(*e))
            .filter_map(move |e| {
                let target = e.body.aabb;
                ray_aabb_distance(origin, dir, cast.distance, target.min(), target.max()).map(
                    |distance| RayHit {
                        entity: e.id,
                        point: origin + dir * distance,
                        distance,
                    },
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;

    fn wall(world: &mut World, x: f32, y: f32, w: f32, h: f32) -> EntityId {
        world.spawn(Entity::new(Category::Static, Aabb::from_center(x, y, w, h)))
    }

    #[test]
    fn slab_test_reports_entry_distance() {
        let d = ray_aabb_distance(
            Vec2::ZERO,
            Vec2::X,
            100.0,
            Vec2::new(10.0, -5.0),
            Vec2::new(15.0, 5.0),
        );
        assert_eq!(d, Some(10.0));
        let miss = ray_aabb_distance(
            Vec2::ZERO,
            Vec2::X,
            5.0,
            Vec2::new(10.0, -5.0),
            Vec2::new(15.0, 5.0),
        );
        assert_eq!(miss, None);
    }

    #[test]
    fn origin_inside_box_hits_at_zero() {
        let d = ray_aabb_distance(
            Vec2::ZERO,
            Vec2::Y,
            1.0,
            Vec2::new(-1.0, -1.0),
            Vec2::new(1.0, 1.0),
        );
        assert_eq!(d, Some(0.0));
    }

    #[test]
    fn ray_count_is_clamped_to_two() {
        let caster = Raycaster::new(0.015, 0);
        assert_eq!(caster.rays, 2);
        let aabb = Aabb::from_center(0.0, 0.0, 1.0, 1.0);
        let origins = caster.edge_origins(&aabb, Direction::Right, 0.0);
        assert_eq!(origins.len(), 2);
        assert!((origins[0].y - (-0.485)).abs() < 1e-6);
        assert!((origins[1].y - 0.485).abs() < 1e-6);
        assert!((origins[0].x - 0.485).abs() < 1e-6);
    }

    #[test]
    fn nearest_hit_wins_and_mask_filters() {
        let mut world = World::default();
        let me = world.spawn(Entity::new(
            Category::Actor,
            Aabb::from_center(0.0, 0.0, 1.0, 1.0),
        ));
        let far = wall(&mut world, 5.0, 0.0, 1.0, 4.0);
        let near = wall(&mut world, 3.0, 0.0, 1.0, 4.0);
        world.spawn(Entity::new(
            Category::Stackable,
            Aabb::from_center(1.5, 0.0, 1.0, 1.0),
        ));

        let caster = Raycaster::new(0.015, 6);
        let aabb = world.get(me).unwrap().body.aabb;
        let cast = EdgeCast {
            edge: Direction::Right,
            distance: 10.0,
            mask: CategoryMask::STRUCTURES,
            shift: 0.0,
        };
        let hit = caster.cast(&world, &[me], &aabb, &cast, |_| true).unwrap();
        assert_eq!(hit.entity, near);
        assert!((hit.distance - 2.015).abs() < 1e-5);

        let all = caster.cast_all(&world, &[me], &aabb, &cast, |_| true);
        let ids: Vec<_> = all.iter().map(|h| h.entity).collect();
        assert_eq!(ids, vec![near, far]);
    }

    #[test]
    fn inactive_bodies_are_not_hit() {
        let mut world = World::default();
        let me = world.spawn(Entity::new(
            Category::Actor,
            Aabb::from_center(0.0, 0.0, 1.0, 1.0),
        ));
        let w = wall(&mut world, 2.0, 0.0, 1.0, 1.0);
        world.get_mut(w).unwrap().active = false;
        let caster = Raycaster::new(0.015, 4);
        let aabb = world.get(me).unwrap().body.aabb;
        let cast = EdgeCast {
            edge: Direction::Right,
            distance: 5.0,
            mask: CategoryMask::STRUCTURES,
            shift: 0.0,
        };
        assert!(caster.cast(&world, &[me], &aabb, &cast, |_| true).is_none());
    }
}
