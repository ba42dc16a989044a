use bevy::math::Vec2;
use serde::{Deserialize, Serialize};

/// Cardinal direction used for ray edges, contact sides and blocked-movement flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    pub fn vector(self) -> Vec2 {
        match self {
            Direction::Left => Vec2::new(-1.0, 0.0),
            Direction::Right => Vec2::new(1.0, 0.0),
            Direction::Up => Vec2::new(0.0, 1.0),
            Direction::Down => Vec2::new(0.0, -1.0),
        }
    }

    pub fn is_horizontal(self) -> bool {
        matches!(self, Direction::Left | Direction::Right)
    }

    /// Direction of travel along x for a signed displacement. Zero has no direction.
    pub fn from_dx(dx: f32) -> Option<Self> {
        if dx > 0.0 {
            Some(Direction::Right)
        } else if dx < 0.0 {
            Some(Direction::Left)
        } else {
            None
        }
    }

    pub fn from_dy(dy: f32) -> Option<Self> {
        if dy > 0.0 {
            Some(Direction::Up)
        } else if dy < 0.0 {
            Some(Direction::Down)
        } else {
            None
        }
    }

    pub fn sign(self) -> f32 {
        match self {
            Direction::Right | Direction::Up => 1.0,
            Direction::Left | Direction::Down => -1.0,
        }
    }
}

/// Axis-aligned box stored as center plus half extents.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub center: Vec2,
    pub half: Vec2,
}

impl Aabb {
    pub fn new(center: Vec2, half: Vec2) -> Self {
        Self {
            center,
            half: half.abs(),
        }
    }

    pub fn from_center(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(Vec2::new(x, y), Vec2::new(width / 2.0, height / 2.0))
    }

    pub fn from_min_max(min: Vec2, max: Vec2) -> Self {
        Self::new((min + max) / 2.0, (max - min) / 2.0)
    }

    pub fn min(&self) -> Vec2 {
        self.center - self.half
    }

    pub fn max(&self) -> Vec2 {
        self.center + self.half
    }

    pub fn left(&self) -> f32 {
        self.center.x - self.half.x
    }

    pub fn right(&self) -> f32 {
        self.center.x + self.half.x
    }

    pub fn bottom(&self) -> f32 {
        self.center.y - self.half.y
    }

    pub fn top(&self) -> f32 {
        self.center.y + self.half.y
    }

    pub fn width(&self) -> f32 {
        self.half.x * 2.0
    }

    pub fn height(&self) -> f32 {
        self.half.y * 2.0
    }

    pub fn translated(&self, delta: Vec2) -> Self {
        Self {
            center: self.center + delta,
            half: self.half,
        }
    }

    /// Shrinks every side by `amount`, never past the center.
    pub fn inset(&self, amount: f32) -> Self {
        Self {
            center: self.center,
            half: (self.half - Vec2::splat(amount)).max(Vec2::ZERO),
        }
    }

    /// Strict overlap: boxes that only share an edge do not overlap.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.left() < other.right()
            && self.right() > other.left()
            && self.bottom() < other.top()
            && self.top() > other.bottom()
    }

    /// Overlap or contact within `tolerance` on both axes.
    pub fn touches(&self, other: &Aabb, tolerance: f32) -> bool {
        self.left() <= other.right() + tolerance
            && self.right() >= other.left() - tolerance
            && self.bottom() <= other.top() + tolerance
            && self.top() >= other.bottom() - tolerance
    }

    pub fn overlaps_horizontally(&self, other: &Aabb) -> bool {
        self.left() < other.right() && self.right() > other.left()
    }
}

/// `a` lies fully left of `b`, allowing `margin` of overlap.
pub fn is_to_left(a: &Aabb, b: &Aabb, margin: f32) -> bool {
    a.right() <= b.left() + margin
}

pub fn is_to_right(a: &Aabb, b: &Aabb, margin: f32) -> bool {
    a.left() >= b.right() - margin
}

pub fn is_to_side(a: &Aabb, b: &Aabb, margin: f32) -> bool {
    is_to_left(a, b, margin) || is_to_right(a, b, margin)
}

/// `a` rests on or above the top of `b` and is not off to either side.
pub fn is_directly_above(a: &Aabb, b: &Aabb, margin: f32) -> bool {
    a.bottom() >= b.top() - margin && !is_to_side(a, b, margin)
}

pub fn center_is_above(a: &Aabb, b: &Aabb) -> bool {
    a.center.y > b.center.y
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_follow_center_and_half_extents() {
        let b = Aabb::from_center(1.0, 2.0, 4.0, 2.0);
        assert_eq!(b.left(), -1.0);
        assert_eq!(b.right(), 3.0);
        assert_eq!(b.bottom(), 1.0);
        assert_eq!(b.top(), 3.0);
        assert_eq!(Aabb::from_min_max(b.min(), b.max()), b);
    }

    #[test]
    fn touching_boxes_do_not_overlap() {
        let a = Aabb::from_center(0.0, 0.0, 2.0, 2.0);
        let b = Aabb::from_center(2.0, 0.0, 2.0, 2.0);
        assert!(!a.overlaps(&b));
        assert!(a.touches(&b, 0.0));
        assert!(is_to_left(&a, &b, 0.0));
        assert!(is_to_side(&b, &a, 0.0));
    }

    #[test]
    fn side_margin_tolerates_small_overlap() {
        let a = Aabb::from_center(0.0, 0.0, 2.0, 2.0);
        let b = Aabb::from_center(1.8, 0.0, 2.0, 2.0);
        assert!(!is_to_left(&a, &b, 0.0));
        assert!(is_to_left(&a, &b, 0.3));
    }

    #[test]
    fn directly_above_requires_horizontal_overlap() {
        let floor = Aabb::from_center(0.0, 0.0, 4.0, 1.0);
        let rider = Aabb::from_center(0.0, 1.0, 1.0, 1.0);
        let beside = Aabb::from_center(3.0, 1.0, 1.0, 1.0);
        assert!(is_directly_above(&rider, &floor, 0.0));
        assert!(!is_directly_above(&beside, &floor, 0.0));
    }
}
