//! wgpu device setup and surface operations.
//!
//! Handles GPU device/queue initialization, BGRA texture allocation,
//! render-pass clears, texture-to-texture copies and readback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use capture_targets::{Point, Rect, Size};

use super::{ClearColor, GpuDevice, SurfaceDescriptor, SurfaceFormat, BYTES_PER_PIXEL};
use crate::error::{GifSnapError, GifSnapResult};

/// wgpu requires buffer rows in texture copies to be aligned to 256 bytes.
const COPY_ROW_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

/// A BGRA8 texture owned by a [`WgpuDevice`].
#[derive(Clone, Debug)]
pub struct WgpuSurface {
    texture: wgpu::Texture,
    size: Size,
}

impl WgpuSurface {
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }
}

/// GPU device backed by wgpu.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    lost: Arc<AtomicBool>,
}

impl WgpuDevice {
    /// Create a device on the high-performance adapter.
    pub fn new() -> GifSnapResult<Self> {
        pollster::block_on(Self::new_async())
    }

    async fn new_async() -> GifSnapResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| GifSnapError::GpuError(format!("Failed to find GPU adapter: {}", e)))?;

        let adapter_name = adapter.get_info().name;
        log::info!("[GPU] Using adapter: {}", adapter_name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("gifsnap capture device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| GifSnapError::GpuError(format!("Failed to create GPU device: {}", e)))?;

        Ok(Self::from_parts(device, queue, adapter_name))
    }

    /// Wrap an existing device and queue.
    pub fn from_parts(device: wgpu::Device, queue: wgpu::Queue, adapter_name: String) -> Self {
        let lost = Arc::new(AtomicBool::new(false));
        let lost_flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            log::error!("[GPU] Device lost ({:?}): {}", reason, message);
            lost_flag.store(true, Ordering::SeqCst);
        });

        Self {
            device,
            queue,
            adapter_name,
            lost,
        }
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn ensure_alive(&self) -> GifSnapResult<()> {
        if self.lost.load(Ordering::SeqCst) {
            return Err(GifSnapError::GpuDeviceLost(self.adapter_name.clone()));
        }
        Ok(())
    }

    /// Run `f` inside validation and out-of-memory error scopes so that
    /// failures come back as errors instead of reaching the uncaptured
    /// error handler.
    fn scoped<T>(&self, what: &str, f: impl FnOnce() -> T) -> GifSnapResult<T> {
        self.ensure_alive()?;

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());

        if let Some(err) = validation.or(out_of_memory) {
            return Err(GifSnapError::GpuError(format!("{} failed: {}", what, err)));
        }
        Ok(value)
    }

    fn texture_format(format: SurfaceFormat) -> wgpu::TextureFormat {
        match format {
            SurfaceFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        }
    }

    fn extent(size: Size) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: size.width,
            height: size.height,
            depth_or_array_layers: 1,
        }
    }

    fn copy_info(texture: &wgpu::Texture, origin: Point) -> wgpu::TexelCopyTextureInfo<'_> {
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d {
                x: origin.x.max(0) as u32,
                y: origin.y.max(0) as u32,
                z: 0,
            },
            aspect: wgpu::TextureAspect::All,
        }
    }
}

fn check_inside(rect: Rect, size: Size, what: &str) -> GifSnapResult<()> {
    if rect.is_empty() || !Rect::from_size(size).contains_rect(&rect) {
        return Err(GifSnapError::GpuError(format!(
            "{} box {:?} outside texture {}",
            what, rect, size
        )));
    }
    Ok(())
}

impl GpuDevice for WgpuDevice {
    type Surface = WgpuSurface;

    fn max_surface_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    fn create_surface(&self, desc: &SurfaceDescriptor) -> GifSnapResult<WgpuSurface> {
        desc.validate(self.max_surface_dimension())?;

        let texture = self.scoped("Texture creation", || {
            self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(desc.label),
                size: Self::extent(desc.size),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: Self::texture_format(desc.format),
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC
                    | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            })
        })?;

        Ok(WgpuSurface {
            texture,
            size: desc.size,
        })
    }

    fn surface_size(&self, surface: &WgpuSurface) -> Size {
        surface.size
    }

    fn clear_surface(&self, surface: &WgpuSurface, color: ClearColor) -> GifSnapResult<()> {
        self.scoped("Clear", || {
            let view = surface
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default());
            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Clear Encoder"),
                });

            {
                let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Clear Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color {
                                r: color.r,
                                g: color.g,
                                b: color.b,
                                a: color.a,
                            }),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
            }

            self.queue.submit(Some(encoder.finish()));
        })
    }

    fn copy_region(
        &self,
        src: &WgpuSurface,
        src_rect: Rect,
        dst: &WgpuSurface,
        dst_origin: Point,
    ) -> GifSnapResult<()> {
        check_inside(src_rect, src.size, "Source")?;
        check_inside(
            Rect::new(dst_origin.x, dst_origin.y, src_rect.width, src_rect.height),
            dst.size,
            "Destination",
        )?;

        self.scoped("Region copy", || {
            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Region Copy Encoder"),
                });

            encoder.copy_texture_to_texture(
                Self::copy_info(&src.texture, src_rect.origin()),
                Self::copy_info(&dst.texture, dst_origin),
                Self::extent(src_rect.size()),
            );

            self.queue.submit(Some(encoder.finish()));
        })
    }

    fn write_surface(&self, surface: &WgpuSurface, bgra: &[u8]) -> GifSnapResult<()> {
        let expected = surface.size.area() as usize * BYTES_PER_PIXEL as usize;
        if bgra.len() != expected {
            return Err(GifSnapError::GpuError(format!(
                "Upload of {} bytes does not match texture of {} bytes",
                bgra.len(),
                expected
            )));
        }

        self.scoped("Texture upload", || {
            self.queue.write_texture(
                Self::copy_info(&surface.texture, Point::ZERO),
                bgra,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(BYTES_PER_PIXEL * surface.size.width),
                    rows_per_image: Some(surface.size.height),
                },
                Self::extent(surface.size),
            );
        })
    }

    fn read_surface(&self, surface: &WgpuSurface) -> GifSnapResult<Vec<u8>> {
        let Size { width, height } = surface.size;
        let bytes_per_row = BYTES_PER_PIXEL * width;
        let padded_bytes_per_row = bytes_per_row.div_ceil(COPY_ROW_ALIGNMENT) * COPY_ROW_ALIGNMENT;
        let buffer_size = (padded_bytes_per_row * height) as u64;

        let buffer = self.scoped("Readback", || {
            let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Surface Readback Buffer"),
                size: buffer_size,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            });

            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Surface Readback Encoder"),
                });

            encoder.copy_texture_to_buffer(
                Self::copy_info(&surface.texture, Point::ZERO),
                wgpu::TexelCopyBufferInfo {
                    buffer: &buffer,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(padded_bytes_per_row),
                        rows_per_image: Some(height),
                    },
                },
                Self::extent(surface.size),
            );

            self.queue.submit(Some(encoder.finish()));
            buffer
        })?;

        let buffer_slice = buffer.slice(..);
        let (tx, rx) = crossbeam_channel::bounded(1);
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| GifSnapError::GpuError(format!("Device poll failed: {}", e)))?;
        rx.recv()
            .map_err(|_| GifSnapError::GpuError("Readback callback dropped".to_string()))?
            .map_err(|e| GifSnapError::GpuError(format!("Failed to map readback buffer: {}", e)))?;

        let pixels = {
            let mapped = buffer_slice.get_mapped_range();
            if padded_bytes_per_row == bytes_per_row {
                mapped.to_vec()
            } else {
                // Rows are padded to COPY_ROW_ALIGNMENT
                mapped
                    .chunks_exact(padded_bytes_per_row as usize)
                    .take(height as usize)
                    .flat_map(|row| &row[..bytes_per_row as usize])
                    .copied()
                    .collect()
            }
        };
        buffer.unmap();

        Ok(pixels)
    }
}
