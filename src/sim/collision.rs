//! Axis-aligned collision tests for the runner
//!
//! Everything in the playfield is a box. The runner's box is shrunk before
//! testing so near misses stay near misses.

use glam::Vec2;

/// Axis-aligned rectangle, `pos` is the top-left corner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub pos: Vec2,
    pub size: Vec2,
}

impl Rect {
    pub fn new(pos: Vec2, size: Vec2) -> Self {
        Self { pos, size }
    }

    pub fn min(&self) -> Vec2 {
        self.pos
    }

    pub fn max(&self) -> Vec2 {
        self.pos + self.size
    }

    pub fn center(&self) -> Vec2 {
        self.pos + self.size * 0.5
    }

    /// Shrink by `dx` on the left and right and `dy` on the top and bottom
    pub fn inset(&self, dx: f32, dy: f32) -> Self {
        let size = (self.size - Vec2::new(dx * 2.0, dy * 2.0)).max(Vec2::ZERO);
        Self {
            pos: self.pos + Vec2::new(dx, dy),
            size,
        }
    }

    /// Strict overlap; touching edges do not count
    pub fn overlaps(&self, other: &Rect) -> bool {
        let (a_min, a_max) = (self.min(), self.max());
        let (b_min, b_max) = (other.min(), other.max());
        a_min.x < b_max.x && a_max.x > b_min.x && a_min.y < b_max.y && a_max.y > b_min.y
    }
}

/// Move `item` up to `step` pixels toward `target` if it is within `radius`
///
/// Returns true when the item was pulled.
pub fn magnet_pull(item: &mut Vec2, target: Vec2, radius: f32, step: f32) -> bool {
    let delta = target - *item;
    let dist = delta.length();
    if dist > radius || dist <= f32::EPSILON {
        return false;
    }
    *item += delta / dist * step.min(dist);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap() {
        let a = Rect::new(Vec2::ZERO, Vec2::splat(10.0));
        let b = Rect::new(Vec2::new(5.0, 5.0), Vec2::splat(10.0));
        let c = Rect::new(Vec2::new(10.0, 0.0), Vec2::splat(10.0));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c), "touching edges are not a hit");
    }

    #[test]
    fn test_inset_turns_graze_into_miss() {
        let runner = Rect::new(Vec2::new(60.0, 290.0), Vec2::new(40.0, 60.0));
        let obstacle = Rect::new(Vec2::new(95.0, 290.0), Vec2::new(30.0, 60.0));
        assert!(runner.overlaps(&obstacle));
        assert!(!runner.inset(10.0, 5.0).overlaps(&obstacle));
    }

    #[test]
    fn test_inset_never_negative() {
        let r = Rect::new(Vec2::ZERO, Vec2::splat(4.0)).inset(10.0, 10.0);
        assert_eq!(r.size, Vec2::ZERO);
    }

    #[test]
    fn test_magnet_pull() {
        let mut coin = Vec2::new(100.0, 0.0);
        assert!(magnet_pull(&mut coin, Vec2::ZERO, 250.0, 15.0));
        assert!((coin.x - 85.0).abs() < 1e-4);

        let mut far = Vec2::new(300.0, 0.0);
        assert!(!magnet_pull(&mut far, Vec2::ZERO, 250.0, 15.0));
        assert_eq!(far.x, 300.0);

        // Does not overshoot the target
        let mut close = Vec2::new(5.0, 0.0);
        assert!(magnet_pull(&mut close, Vec2::ZERO, 250.0, 15.0));
        assert!(close.length() < 1e-4);
    }
}
