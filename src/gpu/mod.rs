//! GPU surface operations used by the capture pipeline.
//!
//! The compositor never touches pixels on the CPU: it only allocates a
//! surface, clears it and issues sub-resource copies. Those operations are
//! expressed by [`GpuDevice`] so the same pipeline runs on a wgpu device or on
//! the in-memory [`SoftwareDevice`].
//!
//! ## Backends
//! - `wgpu_device`: wgpu device/queue, BGRA8 textures, render-pass clears
//! - `software`: CPU-memory surfaces with operation counters

pub mod software;
pub mod wgpu_device;

pub use software::{DeviceStats, SoftwareDevice, SoftwareSurface};
pub use wgpu_device::{WgpuDevice, WgpuSurface};

use capture_targets::{Point, Rect, Size};

use crate::error::{GifSnapError, GifSnapResult};

/// Bytes per pixel of every surface (32-bit BGRA).
pub const BYTES_PER_PIXEL: u32 = 4;

/// Pixel layout of capture and composed surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceFormat {
    /// 8-bit blue, green, red, alpha; normalized.
    Bgra8Unorm,
}

/// Parameters for allocating a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceDescriptor {
    pub label: &'static str,
    pub size: Size,
    pub format: SurfaceFormat,
}

impl SurfaceDescriptor {
    pub fn bgra(label: &'static str, size: Size) -> Self {
        Self {
            label,
            size,
            format: SurfaceFormat::Bgra8Unorm,
        }
    }

    /// Tightly packed byte length of the surface contents, or `None` when it
    /// does not fit in memory.
    pub fn byte_len(&self) -> Option<usize> {
        usize::try_from(self.size.area())
            .ok()?
            .checked_mul(BYTES_PER_PIXEL as usize)
    }

    /// Check the size against a device's per-axis limit and return the byte
    /// length of the contents.
    pub fn validate(&self, max_dimension: u32) -> GifSnapResult<usize> {
        if self.size.is_empty() {
            return Err(GifSnapError::GpuError(format!(
                "Cannot create empty surface '{}'",
                self.label
            )));
        }
        if self.size.width > max_dimension || self.size.height > max_dimension {
            return Err(GifSnapError::GpuError(format!(
                "Surface '{}' of {} exceeds the {} pixel limit",
                self.label, self.size, max_dimension
            )));
        }
        self.byte_len().ok_or_else(|| {
            GifSnapError::GpuError(format!("Surface '{}' of {} is too large", self.label, self.size))
        })
    }
}

/// RGBA clear color with components in 0.0-1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearColor {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl ClearColor {
    pub const OPAQUE_BLACK: ClearColor = ClearColor {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };

    /// The color as one BGRA8 pixel.
    pub fn to_bgra8(&self) -> [u8; 4] {
        let quantize = |c: f64| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        [
            quantize(self.b),
            quantize(self.g),
            quantize(self.r),
            quantize(self.a),
        ]
    }
}

/// A device able to allocate BGRA surfaces and copy between them.
///
/// Surfaces are handles: every operation takes `&Self::Surface` and the
/// device mutates the contents behind it. Operations on one device are
/// executed in submission order.
pub trait GpuDevice: Send + Sync + 'static {
    type Surface: Send + Sync + 'static;

    /// Largest width or height `create_surface` accepts.
    fn max_surface_dimension(&self) -> u32;

    /// Allocate a surface usable as clear target, copy source, copy
    /// destination and sampled texture.
    fn create_surface(&self, desc: &SurfaceDescriptor) -> GifSnapResult<Self::Surface>;

    fn surface_size(&self, surface: &Self::Surface) -> Size;

    /// Fill the whole surface with `color`.
    fn clear_surface(&self, surface: &Self::Surface, color: ClearColor) -> GifSnapResult<()>;

    /// Copy `src_rect` of `src` into `dst` with its top-left at `dst_origin`.
    ///
    /// Both boxes must lie inside their surfaces.
    fn copy_region(
        &self,
        src: &Self::Surface,
        src_rect: Rect,
        dst: &Self::Surface,
        dst_origin: Point,
    ) -> GifSnapResult<()>;

    /// Upload tightly packed BGRA pixels covering the whole surface.
    fn write_surface(&self, surface: &Self::Surface, bgra: &[u8]) -> GifSnapResult<()>;

    /// Read the whole surface back as tightly packed BGRA pixels.
    fn read_surface(&self, surface: &Self::Surface) -> GifSnapResult<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_color_bgra() {
        assert_eq!(ClearColor::OPAQUE_BLACK.to_bgra8(), [0, 0, 0, 255]);

        let red = ClearColor {
            r: 1.0,
            g: 0.0,
            b: 0.0,
            a: 1.0,
        };
        assert_eq!(red.to_bgra8(), [0, 0, 255, 255]);
    }

    #[test]
    fn test_descriptor_byte_len() {
        let desc = SurfaceDescriptor::bgra("region", Size::new(100, 50));
        assert_eq!(desc.byte_len(), Some(100 * 50 * 4));
        assert_eq!(desc.format, SurfaceFormat::Bgra8Unorm);
    }

    #[test]
    fn test_descriptor_validate() {
        let desc = SurfaceDescriptor::bgra("region", Size::new(100, 50));
        assert_eq!(desc.validate(8192).unwrap(), 100 * 50 * 4);
        assert!(desc.validate(64).is_err());

        let huge = SurfaceDescriptor::bgra("huge", Size::new(u32::MAX, u32::MAX));
        assert!(huge.validate(u32::MAX).is_err());
        assert!(SurfaceDescriptor::bgra("empty", Size::new(0, 4))
            .validate(8192)
            .is_err());
    }
}
