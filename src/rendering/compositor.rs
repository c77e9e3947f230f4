//! Region compositor.
//!
//! Owns one region-sized destination surface. Every processed frame clears it
//! to opaque black and copies the part of the source frame that overlaps the
//! region into it, so pixels the source does not cover stay black.

use std::sync::Arc;

use capture_targets::{Point, Rect, Size};

use crate::capture::SourceFrame;
use crate::error::{GifSnapError, GifSnapResult};
use crate::gpu::{ClearColor, GpuDevice, SurfaceDescriptor};
use crate::timestamp::Timestamp;

/// A composed frame handed to an encoding sink.
///
/// Borrows the compositor's surface, so it is only valid for the duration of
/// the sink call that receives it.
#[derive(Debug)]
pub struct ComposedFrame<'a, S> {
    surface: &'a S,
    size: Size,
    timestamp: Timestamp,
}

impl<'a, S> ComposedFrame<'a, S> {
    pub fn new(surface: &'a S, size: Size, timestamp: Timestamp) -> Self {
        Self {
            surface,
            size,
            timestamp,
        }
    }

    pub fn surface(&self) -> &'a S {
        self.surface
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

/// Crops source frames to a fixed region.
pub struct FrameCompositor<D: GpuDevice> {
    device: Arc<D>,
    surface: D::Surface,
    region: Rect,
    target_size: Size,
    composed: bool,
}

impl<D: GpuDevice> std::fmt::Debug for FrameCompositor<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCompositor")
            .field("region", &self.region)
            .field("target_size", &self.target_size)
            .field("composed", &self.composed)
            .finish_non_exhaustive()
    }
}

impl<D: GpuDevice> FrameCompositor<D> {
    /// Allocate the destination surface for `region` of a `target_size` source.
    pub fn new(device: Arc<D>, target_size: Size, region: Rect) -> GifSnapResult<Self> {
        if region.is_empty() {
            return Err(GifSnapError::InvalidRegion(format!(
                "Region {:?} has no pixels",
                region
            )));
        }

        let target_bounds = Rect::from_size(target_size);
        if target_bounds.intersection(&region).is_none() {
            return Err(GifSnapError::InvalidRegion(format!(
                "Region {:?} does not overlap target {}",
                region, target_size
            )));
        }
        let max_dimension = device.max_surface_dimension();
        if region.width > max_dimension || region.height > max_dimension {
            return Err(GifSnapError::InvalidRegion(format!(
                "Region {} exceeds the {} pixel surface limit",
                region.size(),
                max_dimension
            )));
        }

        let surface = device.create_surface(&SurfaceDescriptor::bgra(
            "Composed Region",
            region.size(),
        ))?;

        if !target_bounds.contains_rect(&region) {
            log::warn!(
                "[COMPOSITOR] Region {:?} extends past target {}; uncovered pixels stay black",
                region,
                target_size
            );
        }
        log::debug!(
            "[COMPOSITOR] Created {} surface for region at ({}, {})",
            region.size(),
            region.x,
            region.y
        );

        Ok(Self {
            device,
            surface,
            region,
            target_size,
            composed: false,
        })
    }

    pub fn region(&self) -> Rect {
        self.region
    }

    pub fn target_size(&self) -> Size {
        self.target_size
    }

    /// Whether at least one frame has been processed.
    pub fn has_composed(&self) -> bool {
        self.composed
    }

    pub fn surface(&self) -> &D::Surface {
        &self.surface
    }

    /// Compose `frame` into the destination surface.
    pub fn process(
        &mut self,
        frame: &SourceFrame<D::Surface>,
    ) -> GifSnapResult<ComposedFrame<'_, D::Surface>> {
        self.device
            .clear_surface(&self.surface, ClearColor::OPAQUE_BLACK)?;

        let frame_bounds = Rect::from_size(frame.size);
        match self.region.intersection(&frame_bounds) {
            Some(overlap) => {
                let dst_origin = Point::new(overlap.x - self.region.x, overlap.y - self.region.y);
                self.device
                    .copy_region(&frame.surface, overlap, &self.surface, dst_origin)?;
            }
            None => {
                log::debug!(
                    "[COMPOSITOR] Region {:?} outside {} frame; emitting black",
                    self.region,
                    frame.size
                );
            }
        }

        self.composed = true;
        Ok(ComposedFrame::new(
            &self.surface,
            self.region.size(),
            frame.timestamp,
        ))
    }

    /// Reissue the last composed contents under `timestamp`.
    pub fn repeat_frame(&self, timestamp: Timestamp) -> ComposedFrame<'_, D::Surface> {
        ComposedFrame::new(&self.surface, self.region.size(), timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{SoftwareDevice, SoftwareSurface};

    /// Source whose pixel at (x, y) is [x, y, 7, 255].
    fn coordinate_frame(device: &SoftwareDevice, size: Size, ms: u64) -> SourceFrame<SoftwareSurface> {
        let surface = device
            .create_surface(&SurfaceDescriptor::bgra("source", size))
            .unwrap();
        let mut bgra = Vec::with_capacity(size.area() as usize * 4);
        for y in 0..size.height {
            for x in 0..size.width {
                bgra.extend_from_slice(&[x as u8, y as u8, 7, 255]);
            }
        }
        device.write_surface(&surface, &bgra).unwrap();
        SourceFrame::new(Arc::new(surface), size, Timestamp::from_millis(ms))
    }

    fn pixel(bgra: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * width + x) * 4) as usize;
        [bgra[i], bgra[i + 1], bgra[i + 2], bgra[i + 3]]
    }

    #[test]
    fn test_empty_region_rejected() {
        let device = Arc::new(SoftwareDevice::new());
        let result = FrameCompositor::new(device, Size::new(100, 100), Rect::new(0, 0, 0, 10));
        assert!(matches!(result, Err(GifSnapError::InvalidRegion(_))));
    }

    #[test]
    fn test_contained_region_is_cropped() {
        let device = Arc::new(SoftwareDevice::new());
        let size = Size::new(200, 100);
        let mut compositor =
            FrameCompositor::new(Arc::clone(&device), size, Rect::new(10, 10, 100, 50)).unwrap();
        let frame = coordinate_frame(&device, size, 33);

        let composed = compositor.process(&frame).unwrap();
        assert_eq!(composed.size(), Size::new(100, 50));
        assert_eq!(composed.timestamp(), Timestamp::from_millis(33));

        let out = device.read_surface(compositor.surface()).unwrap();
        assert_eq!(pixel(&out, 100, 0, 0), [10, 10, 7, 255]);
        assert_eq!(pixel(&out, 100, 99, 49), [109, 59, 7, 255]);
        assert!(compositor.has_composed());
    }

    #[test]
    fn test_partial_overlap_keeps_region_placement() {
        let device = Arc::new(SoftwareDevice::new());
        let size = Size::new(64, 64);
        // Region hangs 8px off the right and bottom edges
        let mut compositor =
            FrameCompositor::new(Arc::clone(&device), size, Rect::new(40, 48, 32, 24)).unwrap();
        let frame = coordinate_frame(&device, size, 0);

        compositor.process(&frame).unwrap();
        let out = device.read_surface(compositor.surface()).unwrap();

        assert_eq!(pixel(&out, 32, 0, 0), [40, 48, 7, 255]);
        assert_eq!(pixel(&out, 32, 23, 15), [63, 63, 7, 255]);
        assert_eq!(pixel(&out, 32, 24, 0), [0, 0, 0, 255]);
        assert_eq!(pixel(&out, 32, 0, 16), [0, 0, 0, 255]);
        assert_eq!(pixel(&out, 32, 31, 23), [0, 0, 0, 255]);
    }

    #[test]
    fn test_negative_origin_overlap() {
        let device = Arc::new(SoftwareDevice::new());
        let size = Size::new(16, 16);
        let mut compositor =
            FrameCompositor::new(Arc::clone(&device), size, Rect::new(-4, -2, 8, 8)).unwrap();
        let frame = coordinate_frame(&device, size, 0);

        compositor.process(&frame).unwrap();
        let out = device.read_surface(compositor.surface()).unwrap();

        assert_eq!(pixel(&out, 8, 0, 0), [0, 0, 0, 255]);
        assert_eq!(pixel(&out, 8, 4, 2), [0, 0, 7, 255]);
        assert_eq!(pixel(&out, 8, 7, 7), [3, 5, 7, 255]);
    }

    #[test]
    fn test_region_outside_smaller_frame_is_black() {
        let device = Arc::new(SoftwareDevice::new());
        let mut compositor =
            FrameCompositor::new(Arc::clone(&device), Size::new(32, 32), Rect::new(20, 20, 4, 4))
                .unwrap();
        // The source delivered a frame smaller than the target it announced
        let frame = coordinate_frame(&device, Size::new(16, 16), 0);

        compositor.process(&frame).unwrap();
        let out = device.read_surface(compositor.surface()).unwrap();
        assert!(out.chunks_exact(4).all(|px| px == [0, 0, 0, 255]));
        assert_eq!(device.stats().copies, 0);
    }

    #[test]
    fn test_region_must_overlap_target() {
        let device = Arc::new(SoftwareDevice::new());
        let err = FrameCompositor::new(
            Arc::clone(&device),
            Size::new(64, 64),
            Rect::new(5000, 5000, 16, 16),
        )
        .unwrap_err();
        assert!(matches!(err, GifSnapError::InvalidRegion(_)));
        assert_eq!(device.stats().surfaces_created, 0);
    }

    #[test]
    fn test_oversized_region_rejected() {
        let device = Arc::new(SoftwareDevice::with_max_dimension(128));
        let err = FrameCompositor::new(
            Arc::clone(&device),
            Size::new(64, 64),
            Rect::new(0, 0, 129, 16),
        )
        .unwrap_err();
        assert!(matches!(err, GifSnapError::InvalidRegion(_)));

        let err = FrameCompositor::new(
            Arc::clone(&device),
            Size::new(64, 64),
            Rect::new(0, 0, u32::MAX, u32::MAX),
        )
        .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(device.stats().surfaces_created, 0);
    }

    #[test]
    fn test_repeat_frame_reuses_content() {
        let device = Arc::new(SoftwareDevice::new());
        let size = Size::new(32, 32);
        let mut compositor =
            FrameCompositor::new(Arc::clone(&device), size, Rect::new(4, 4, 8, 8)).unwrap();
        let frame = coordinate_frame(&device, size, 10);

        compositor.process(&frame).unwrap();
        let before = device.read_surface(compositor.surface()).unwrap();
        let ops = device.stats().composite_ops();

        let repeated = compositor.repeat_frame(Timestamp::from_millis(50));
        assert_eq!(repeated.timestamp(), Timestamp::from_millis(50));
        assert_eq!(repeated.size(), Size::new(8, 8));

        assert_eq!(device.stats().composite_ops(), ops);
        assert_eq!(device.read_surface(compositor.surface()).unwrap(), before);
    }

    #[test]
    fn test_gpu_failure_is_returned() {
        let device = Arc::new(SoftwareDevice::new());
        let size = Size::new(32, 32);
        let mut compositor =
            FrameCompositor::new(Arc::clone(&device), size, Rect::new(0, 0, 8, 8)).unwrap();
        let frame = coordinate_frame(&device, size, 0);

        device.fail_next_copy();
        assert!(matches!(
            compositor.process(&frame),
            Err(GifSnapError::GpuError(_))
        ));
    }
}
