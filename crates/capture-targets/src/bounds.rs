use serde::{Deserialize, Serialize};

/// A position in physical pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0, y: 0 };

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }
}

/// A size in physical pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels covered.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned rectangle in physical pixels.
///
/// Edges are half-open: a rect at `x` with width `w` covers columns
/// `x..x + w`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rect anchored at the origin with the given size.
    pub fn from_size(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    /// Build a rect from two opposite corners in any order, as produced by a
    /// mouse drag.
    pub fn from_corners(a: Point, b: Point) -> Self {
        let left = a.x.min(b.x);
        let top = a.y.min(b.y);
        let right = a.x.max(b.x);
        let bottom = a.y.max(b.y);
        Self::from_edges(left as i64, top as i64, right as i64, bottom as i64)
    }

    fn from_edges(left: i64, top: i64, right: i64, bottom: i64) -> Self {
        Self {
            x: left as i32,
            y: top as i32,
            width: (right - left).max(0) as u32,
            height: (bottom - top).max(0) as u32,
        }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn left(&self) -> i64 {
        self.x as i64
    }

    pub fn top(&self) -> i64 {
        self.y as i64
    }

    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    pub fn is_empty(&self) -> bool {
        self.size().is_empty()
    }

    /// Whether `other` lies entirely within this rect.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        self.left() <= other.left()
            && self.top() <= other.top()
            && self.right() >= other.right()
            && self.bottom() >= other.bottom()
    }

    /// Overlapping area of two rects, or `None` when they do not overlap.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let left = self.left().max(other.left());
        let top = self.top().max(other.top());
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if right <= left || bottom <= top {
            return None;
        }

        Some(Self::from_edges(left, top, right, bottom))
    }

    /// Smallest rect covering both.
    pub fn union(&self, other: &Rect) -> Rect {
        let left = self.left().min(other.left());
        let top = self.top().min(other.top());
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Self::from_edges(left, top, right, bottom)
    }

    /// Offset by `(dx, dy)`. `None` when the new origin leaves the `i32` range.
    pub fn translate(&self, dx: i32, dy: i32) -> Option<Rect> {
        self.offset_by(dx as i64, dy as i64)
    }

    /// Express this rect relative to `origin`.
    pub fn relative_to(&self, origin: Point) -> Option<Rect> {
        self.offset_by(-(origin.x as i64), -(origin.y as i64))
    }

    fn offset_by(&self, dx: i64, dy: i64) -> Option<Rect> {
        let x = i32::try_from(self.left() + dx).ok()?;
        let y = i32::try_from(self.top() + dy).ok()?;
        Some(Rect::new(x, y, self.width, self.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_corners_normalizes_drag_direction() {
        let forward = Rect::from_corners(Point::new(10, 10), Point::new(110, 60));
        let backward = Rect::from_corners(Point::new(110, 60), Point::new(10, 10));
        let mixed = Rect::from_corners(Point::new(110, 10), Point::new(10, 60));

        assert_eq!(forward, Rect::new(10, 10, 100, 50));
        assert_eq!(backward, forward);
        assert_eq!(mixed, forward);
    }

    #[test]
    fn zero_length_drag_is_empty() {
        let rect = Rect::from_corners(Point::new(5, 5), Point::new(5, 40));
        assert!(rect.is_empty());
    }

    #[test]
    fn intersection_clips_to_overlap() {
        let frame = Rect::new(0, 0, 1920, 1080);
        let region = Rect::new(1900, 1000, 100, 100);

        assert_eq!(frame.intersection(&region), Some(Rect::new(1900, 1000, 20, 80)));
        assert_eq!(frame.intersection(&Rect::new(-50, -50, 40, 40)), None);
        // Touching edges do not overlap
        assert_eq!(frame.intersection(&Rect::new(1920, 0, 10, 10)), None);
    }

    #[test]
    fn contains_and_union() {
        let a = Rect::new(-1920, 0, 1920, 1080);
        let b = Rect::new(0, 0, 2560, 1440);

        let union = a.union(&b);
        assert_eq!(union, Rect::new(-1920, 0, 4480, 1440));
        assert!(union.contains_rect(&a));
        assert!(union.contains_rect(&b));
        assert!(!a.contains_rect(&b));
    }

    #[test]
    fn relative_to_moves_origin() {
        let rect = Rect::new(2000, 100, 50, 50);
        assert_eq!(rect.relative_to(Point::new(1920, 0)), Some(Rect::new(80, 100, 50, 50)));
    }

    #[test]
    fn offsets_past_i32_range_are_rejected() {
        let rect = Rect::new(i32::MAX - 10, 0, 20, 20);
        assert_eq!(rect.translate(11, 0), None);
        assert_eq!(rect.translate(10, 5), Some(Rect::new(i32::MAX, 5, 20, 20)));
        assert_eq!(Rect::new(0, 0, 1, 1).relative_to(Point::new(i32::MIN, 0)), None);
    }
}
