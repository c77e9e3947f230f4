pub mod bounds;

pub use bounds::{Point, Rect, Size};

use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct DisplayId(u64);

impl DisplayId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for DisplayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DisplayId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| "Invalid display ID".to_string())
    }
}

/// A monitor and its position on the virtual desktop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Display {
    id: DisplayId,
    name: Option<String>,
    bounds: Rect,
}

impl Display {
    pub fn new(id: DisplayId, bounds: Rect) -> Self {
        Self {
            id,
            name: None,
            bounds,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn id(&self) -> DisplayId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Bounds in desktop coordinates.
    pub fn physical_bounds(&self) -> Rect {
        self.bounds
    }

    pub fn physical_size(&self) -> Size {
        self.bounds.size()
    }
}

/// What a capture session records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetKind {
    /// A single monitor.
    Display(DisplayId),
    /// Every monitor, composed into one virtual desktop surface.
    Desktop,
}

/// A capturable target together with its native frame size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureTarget {
    kind: TargetKind,
    size: Size,
}

impl CaptureTarget {
    pub fn new(kind: TargetKind, size: Size) -> Self {
        Self { kind, size }
    }

    pub fn display(display: &Display) -> Self {
        Self::new(TargetKind::Display(display.id()), display.physical_size())
    }

    pub fn desktop(size: Size) -> Self {
        Self::new(TargetKind::Desktop, size)
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    /// Native frame size delivered by a capture of this target.
    pub fn size(&self) -> Size {
        self.size
    }

    /// Full-frame bounds in target coordinates.
    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.size)
    }
}

/// Result of mapping a selection onto a capture target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedCapture {
    pub target: CaptureTarget,
    /// Region in the target's coordinate space.
    pub region: Rect,
}

/// The set of displays making up the desktop.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DisplayLayout {
    displays: Vec<Display>,
}

impl DisplayLayout {
    pub fn new(displays: Vec<Display>) -> Self {
        Self { displays }
    }

    pub fn displays(&self) -> &[Display] {
        &self.displays
    }

    /// Bounding box of all displays in desktop coordinates.
    pub fn union_bounds(&self) -> Option<Rect> {
        let mut displays = self.displays.iter();
        let first = displays.next()?.physical_bounds();
        Some(displays.fold(first, |acc, d| acc.union(&d.physical_bounds())))
    }

    /// First display that wholly contains `rect` (desktop coordinates).
    pub fn containing(&self, rect: &Rect) -> Option<&Display> {
        self.displays
            .iter()
            .find(|d| d.physical_bounds().contains_rect(rect))
    }

    /// Map a selection made on a full-desktop overlay onto a capture target.
    ///
    /// `selection` is relative to the overlay, whose origin sits at the
    /// top-left of [`union_bounds`](Self::union_bounds). A selection that fits
    /// on one display captures only that display; anything spanning displays
    /// captures the whole desktop. Returns `None` for an empty selection, an
    /// empty layout, or a selection whose desktop position overflows.
    pub fn resolve(&self, selection: Rect) -> Option<ResolvedCapture> {
        if selection.is_empty() {
            return None;
        }

        let union = self.union_bounds()?;
        let desktop_rect = selection.translate(union.x, union.y)?;

        if let Some(monitor) = self.containing(&desktop_rect) {
            let region = desktop_rect.relative_to(monitor.physical_bounds().origin())?;
            let display_id = monitor.id();
            tracing::debug!(display = %display_id, ?region, "selection fits on one display");
            return Some(ResolvedCapture {
                target: CaptureTarget::display(monitor),
                region,
            });
        }

        tracing::debug!(?selection, "selection spans displays, capturing desktop");
        Some(ResolvedCapture {
            target: CaptureTarget::desktop(union.size()),
            region: selection,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dual_layout() -> DisplayLayout {
        DisplayLayout::new(vec![
            Display::new(DisplayId::new(1), Rect::new(0, 0, 1920, 1080)).with_name("primary"),
            Display::new(DisplayId::new(2), Rect::new(-1280, 0, 1280, 1024)),
        ])
    }

    #[test]
    fn union_covers_negative_origin() {
        let layout = dual_layout();
        assert_eq!(layout.union_bounds(), Some(Rect::new(-1280, 0, 3200, 1080)));
        assert_eq!(DisplayLayout::default().union_bounds(), None);
    }

    #[test]
    fn selection_on_one_display_is_display_relative() {
        let layout = dual_layout();
        // Overlay x=1290 is desktop x=10 on the primary display
        let resolved = layout.resolve(Rect::new(1290, 10, 100, 50)).unwrap();

        assert_eq!(resolved.target.kind(), TargetKind::Display(DisplayId::new(1)));
        assert_eq!(resolved.target.size(), Size::new(1920, 1080));
        assert_eq!(resolved.region, Rect::new(10, 10, 100, 50));
    }

    #[test]
    fn selection_on_secondary_display() {
        let layout = dual_layout();
        let resolved = layout.resolve(Rect::new(0, 0, 200, 200)).unwrap();

        assert_eq!(resolved.target.kind(), TargetKind::Display(DisplayId::new(2)));
        assert_eq!(resolved.region, Rect::new(0, 0, 200, 200));
    }

    #[test]
    fn spanning_selection_captures_desktop() {
        let layout = dual_layout();
        let selection = Rect::new(1200, 100, 200, 100);
        let resolved = layout.resolve(selection).unwrap();

        assert_eq!(resolved.target.kind(), TargetKind::Desktop);
        assert_eq!(resolved.target.size(), Size::new(3200, 1080));
        assert_eq!(resolved.region, selection);
    }

    #[test]
    fn empty_selection_does_not_resolve() {
        assert!(dual_layout().resolve(Rect::new(10, 10, 0, 20)).is_none());
    }

    #[test]
    fn overflowing_selection_does_not_resolve() {
        let layout = DisplayLayout::new(vec![Display::new(
            DisplayId::new(1),
            Rect::new(i32::MAX - 100, 0, 100, 100),
        )]);
        assert!(layout.resolve(Rect::new(i32::MAX, 0, 10, 10)).is_none());
    }

    #[test]
    fn display_id_parses() {
        assert_eq!("42".parse::<DisplayId>(), Ok(DisplayId::new(42)));
        assert!("abc".parse::<DisplayId>().is_err());
    }
}
