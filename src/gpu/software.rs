//! CPU-memory GPU device.
//!
//! Surfaces are plain BGRA buffers. Semantics match the wgpu backend
//! (bounds-checked copies, full-surface clears) and every operation is
//! counted, which lets callers verify exactly which surface work a pipeline
//! performed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use capture_targets::{Point, Rect, Size};
use parking_lot::Mutex;

use super::{ClearColor, GpuDevice, SurfaceDescriptor, BYTES_PER_PIXEL};
use crate::error::{GifSnapError, GifSnapResult};

/// Handle to a surface owned by a [`SoftwareDevice`].
#[derive(Clone)]
pub struct SoftwareSurface {
    id: u64,
    label: &'static str,
    size: Size,
    pixels: Arc<Mutex<Vec<u8>>>,
}

impl SoftwareSurface {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    fn row_bytes(&self) -> usize {
        (self.size.width * BYTES_PER_PIXEL) as usize
    }
}

impl std::fmt::Debug for SoftwareSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareSurface")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("size", &self.size)
            .finish()
    }
}

/// Snapshot of the operations a device has executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub surfaces_created: u64,
    pub clears: u64,
    pub copies: u64,
    pub writes: u64,
    pub reads: u64,
}

impl DeviceStats {
    /// Clears plus copies: the work the compositor issues.
    pub fn composite_ops(&self) -> u64 {
        self.clears + self.copies
    }
}

#[derive(Default)]
struct Counters {
    surfaces_created: AtomicU64,
    clears: AtomicU64,
    copies: AtomicU64,
    writes: AtomicU64,
    reads: AtomicU64,
}

/// Per-axis surface limit, matching wgpu's default `max_texture_dimension_2d`.
pub const DEFAULT_MAX_DIMENSION: u32 = 8192;

/// In-memory implementation of [`GpuDevice`].
pub struct SoftwareDevice {
    next_id: AtomicU64,
    counters: Counters,
    fail_next_copy: AtomicBool,
    max_dimension: u32,
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::with_max_dimension(DEFAULT_MAX_DIMENSION)
    }
}

impl SoftwareDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            next_id: AtomicU64::new(0),
            counters: Counters::default(),
            fail_next_copy: AtomicBool::new(false),
            max_dimension,
        }
    }

    pub fn stats(&self) -> DeviceStats {
        DeviceStats {
            surfaces_created: self.counters.surfaces_created.load(Ordering::SeqCst),
            clears: self.counters.clears.load(Ordering::SeqCst),
            copies: self.counters.copies.load(Ordering::SeqCst),
            writes: self.counters.writes.load(Ordering::SeqCst),
            reads: self.counters.reads.load(Ordering::SeqCst),
        }
    }

    /// Make the next `copy_region` fail as if the device reported an error.
    pub fn fail_next_copy(&self) {
        self.fail_next_copy.store(true, Ordering::SeqCst);
    }
}

fn check_inside(rect: Rect, size: Size, what: &str) -> GifSnapResult<()> {
    if rect.is_empty() || !Rect::from_size(size).contains_rect(&rect) {
        return Err(GifSnapError::GpuError(format!(
            "{} box {:?} outside surface {}",
            what, rect, size
        )));
    }
    Ok(())
}

impl GpuDevice for SoftwareDevice {
    type Surface = SoftwareSurface;

    fn max_surface_dimension(&self) -> u32 {
        self.max_dimension
    }

    fn create_surface(&self, desc: &SurfaceDescriptor) -> GifSnapResult<SoftwareSurface> {
        let byte_len = desc.validate(self.max_dimension)?;

        self.counters.surfaces_created.fetch_add(1, Ordering::SeqCst);
        Ok(SoftwareSurface {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            label: desc.label,
            size: desc.size,
            pixels: Arc::new(Mutex::new(vec![0u8; byte_len])),
        })
    }

    fn surface_size(&self, surface: &SoftwareSurface) -> Size {
        surface.size
    }

    fn clear_surface(&self, surface: &SoftwareSurface, color: ClearColor) -> GifSnapResult<()> {
        self.counters.clears.fetch_add(1, Ordering::SeqCst);
        let pixel = color.to_bgra8();
        let mut pixels = surface.pixels.lock();
        for chunk in pixels.chunks_exact_mut(BYTES_PER_PIXEL as usize) {
            chunk.copy_from_slice(&pixel);
        }
        Ok(())
    }

    fn copy_region(
        &self,
        src: &SoftwareSurface,
        src_rect: Rect,
        dst: &SoftwareSurface,
        dst_origin: Point,
    ) -> GifSnapResult<()> {
        self.counters.copies.fetch_add(1, Ordering::SeqCst);

        if self.fail_next_copy.swap(false, Ordering::SeqCst) {
            return Err(GifSnapError::GpuError("Injected copy failure".to_string()));
        }
        if src.id == dst.id {
            return Err(GifSnapError::GpuError(
                "Source and destination of a copy must differ".to_string(),
            ));
        }

        check_inside(src_rect, src.size, "Source")?;
        let dst_rect = Rect::new(dst_origin.x, dst_origin.y, src_rect.width, src_rect.height);
        check_inside(dst_rect, dst.size, "Destination")?;

        let src_pixels = src.pixels.lock();
        let mut dst_pixels = dst.pixels.lock();

        let bpp = BYTES_PER_PIXEL as usize;
        let span = src_rect.width as usize * bpp;
        for row in 0..src_rect.height as usize {
            let src_start =
                (src_rect.y as usize + row) * src.row_bytes() + src_rect.x as usize * bpp;
            let dst_start =
                (dst_origin.y as usize + row) * dst.row_bytes() + dst_origin.x as usize * bpp;
            dst_pixels[dst_start..dst_start + span]
                .copy_from_slice(&src_pixels[src_start..src_start + span]);
        }
        Ok(())
    }

    fn write_surface(&self, surface: &SoftwareSurface, bgra: &[u8]) -> GifSnapResult<()> {
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        let mut pixels = surface.pixels.lock();
        if bgra.len() != pixels.len() {
            return Err(GifSnapError::GpuError(format!(
                "Upload of {} bytes does not match surface of {} bytes",
                bgra.len(),
                pixels.len()
            )));
        }
        pixels.copy_from_slice(bgra);
        Ok(())
    }

    fn read_surface(&self, surface: &SoftwareSurface) -> GifSnapResult<Vec<u8>> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        Ok(surface.pixels.lock().clone())
    }
}
