use std::iter::FusedIterator;

use nalgebra::{Point2, Vector2};

pub type ScreenPoint = Point2<u32>;
pub type ScreenSize = Vector2<u32>;

/// Rectangular region of the canvas rendered by a single job.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Tile {
    pub origin: ScreenPoint,
    pub size: ScreenSize,
}

impl Tile {
    pub fn new(origin: ScreenPoint, size: ScreenSize) -> Self {
        Tile { origin, size }
    }

    /// Tile covering a whole canvas of the given size.
    pub fn from_size(size: ScreenSize) -> Self {
        Tile::new(ScreenPoint::origin(), size)
    }

    pub fn width(&self) -> u32 {
        self.size.x
    }

    pub fn height(&self) -> u32 {
        self.size.y
    }

    /// Exclusive bottom right corner, clamped to `u32::MAX` on both axes.
    pub fn max(&self) -> ScreenPoint {
        ScreenPoint::new(
            self.origin.x.saturating_add(self.size.x),
            self.origin.y.saturating_add(self.size.y),
        )
    }

    /// Exclusive bottom right corner, `None` if it doesn't fit into `u32`.
    pub fn checked_max(&self) -> Option<ScreenPoint> {
        Some(ScreenPoint::new(
            self.origin.x.checked_add(self.size.x)?,
            self.origin.y.checked_add(self.size.y)?,
        ))
    }

    pub fn area(&self) -> u64 {
        self.size.x as u64 * self.size.y as u64
    }

    pub fn is_empty(&self) -> bool {
        self.size.x == 0 || self.size.y == 0
    }

    pub fn contains(&self, point: ScreenPoint) -> bool {
        let max = self.max();
        point.x >= self.origin.x && point.y >= self.origin.y && point.x < max.x && point.y < max.y
    }

    /// True if `other` lies completely inside this tile.
    pub fn contains_tile(&self, other: &Tile) -> bool {
        let Some(other_max) = other.checked_max() else {
            return false;
        };
        let max = self.max();
        other.origin.x >= self.origin.x
            && other.origin.y >= self.origin.y
            && other_max.x <= max.x
            && other_max.y <= max.y
    }

    /// True if the two tiles share at least one pixel.
    pub fn overlaps(&self, other: &Tile) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        let (max, other_max) = (self.max(), other.max());
        self.origin.x < other_max.x
            && other.origin.x < max.x
            && self.origin.y < other_max.y
            && other.origin.y < max.y
    }

    /// Create an iterator over pixel positions inside the tile,
    /// in C order (x changes first, then y)
    pub fn internal_points(&self) -> InternalPoints {
        if self.is_empty() {
            InternalPoints::empty()
        } else {
            InternalPoints {
                min_x: self.origin.x,
                max: self.max(),
                cursor: self.origin,
            }
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct InternalPoints {
    min_x: u32,
    max: ScreenPoint,

    cursor: ScreenPoint,
}

impl InternalPoints {
    fn empty() -> Self {
        InternalPoints {
            min_x: 0,
            max: ScreenPoint::origin(),
            cursor: ScreenPoint::origin(),
        }
    }
}

impl Iterator for InternalPoints {
    type Item = ScreenPoint;

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.len();
        (len, Some(len))
    }

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.y >= self.max.y {
            return None;
        }

        let ret = self.cursor;

        debug_assert!(self.cursor.x < self.max.x);
        self.cursor.x += 1;
        if self.cursor.x >= self.max.x {
            self.cursor.x = self.min_x;
            self.cursor.y += 1;
        }

        Some(ret)
    }
}

impl ExactSizeIterator for InternalPoints {
    fn len(&self) -> usize {
        if self.cursor.y >= self.max.y {
            0
        } else {
            let row_width = (self.max.x - self.min_x) as usize;
            let whole_rows = (self.max.y - self.cursor.y - 1) as usize;
            let current_row = (self.max.x - self.cursor.x) as usize;
            whole_rows * row_width + current_row
        }
    }
}

impl FusedIterator for InternalPoints {}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert2::assert;
    use proptest::prelude::*;
    use test_strategy::proptest;

    pub(crate) fn tile_strategy() -> impl Strategy<Value = Tile> {
        (0..100u32, 0..100u32, 0..50u32, 0..50u32)
            .prop_map(|(x, y, w, h)| Tile::new(ScreenPoint::new(x, y), ScreenSize::new(w, h)))
    }

    /// Goes through the whole iterator and checks that at every step iterator's size hint is equal
    /// to its reported length and equal to the expected number of elements.
    fn check_exact_length<T: ExactSizeIterator>(mut iterator: T, expected_length: usize) {
        let mut remaining = expected_length;
        loop {
            assert!(iterator.len() == remaining);
            assert!(iterator.size_hint() == (remaining, Some(remaining)));
            if iterator.next().is_none() {
                break;
            }
            remaining -= 1;
        }
        assert!(remaining == 0);
    }

    #[proptest]
    fn internal_points_cover_tile(#[strategy(tile_strategy())] tile: Tile) {
        let mut seen = vec![false; tile.area() as usize];
        for p in tile.internal_points() {
            assert!(tile.contains(p));
            let index = (p.x - tile.origin.x) + (p.y - tile.origin.y) * tile.width();
            assert!(!seen[index as usize]);
            seen[index as usize] = true;
        }
        assert!(seen.into_iter().all(|v| v));
    }

    #[proptest]
    fn internal_points_exact_length(#[strategy(tile_strategy())] tile: Tile) {
        check_exact_length(tile.internal_points(), tile.area() as usize);
    }

    #[proptest]
    fn overlap_is_symmetric(
        #[strategy(tile_strategy())] a: Tile,
        #[strategy(tile_strategy())] b: Tile,
    ) {
        assert!(a.overlaps(&b) == b.overlaps(&a));
        let shares_pixel = a.internal_points().any(|p| b.contains(p));
        assert!(a.overlaps(&b) == shares_pixel);
    }

    #[test]
    fn touching_tiles_do_not_overlap() {
        let left = Tile::new(ScreenPoint::new(0, 0), ScreenSize::new(10, 10));
        let right = Tile::new(ScreenPoint::new(10, 0), ScreenSize::new(10, 10));
        let below = Tile::new(ScreenPoint::new(0, 10), ScreenSize::new(10, 10));
        assert!(!left.overlaps(&right));
        assert!(!left.overlaps(&below));
        assert!(left.overlaps(&Tile::new(ScreenPoint::new(9, 9), ScreenSize::new(1, 1))));
    }

    #[test]
    fn contains_tile() {
        let canvas = Tile::from_size(ScreenSize::new(100, 50));
        let size = ScreenSize::new(40, 40);
        assert!(canvas.contains_tile(&Tile::new(ScreenPoint::new(60, 10), size)));
        assert!(!canvas.contains_tile(&Tile::new(ScreenPoint::new(61, 10), size)));
    }

    #[test]
    fn corner_past_u32_range() {
        let tile = Tile::new(ScreenPoint::new(u32::MAX - 5, 0), ScreenSize::new(10, 10));
        assert!(tile.checked_max() == None);
        assert!(tile.max() == ScreenPoint::new(u32::MAX, 10));

        let canvas = Tile::from_size(ScreenSize::new(100, 100));
        assert!(!canvas.contains_tile(&tile));
        assert!(!canvas.overlaps(&tile));
        let everything = Tile::from_size(ScreenSize::new(u32::MAX, u32::MAX));
        assert!(!everything.contains_tile(&tile));
        assert!(everything.overlaps(&tile));
    }
}
