//! GIF encoding with gifski.
//!
//! Composed frames are read back from the GPU, converted to RGBA and fed to a
//! gifski collector while a writer thread streams the GIF to disk.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use capture_targets::Size;
use gifski::Settings as GifskiSettings;

use super::EncodingSink;
use crate::config::CaptureConfig;
use crate::error::{GifSnapError, GifSnapResult};
use crate::gpu::GpuDevice;
use crate::rendering::ComposedFrame;
use crate::timestamp::Timestamp;

/// Convert tightly packed BGRA pixels to RGBA.
pub fn bgra_to_rgba(bgra: &[u8]) -> Vec<rgb::RGBA8> {
    bgra.chunks_exact(4)
        .map(|px| rgb::RGBA8::new(px[2], px[1], px[0], px[3]))
        .collect()
}

/// Sink writing composed frames to an animated GIF file.
pub struct GifSink<D: GpuDevice> {
    device: Arc<D>,
    path: PathBuf,
    size: Size,
    max_frames: Option<usize>,
    collector: Option<gifski::Collector>,
    writer: Option<JoinHandle<GifSnapResult<()>>>,
    frames_written: usize,
    first_timestamp: Option<Timestamp>,
    last_timestamp: Option<Timestamp>,
    bytes_written: Option<u64>,
}

impl<D: GpuDevice> GifSink<D> {
    /// Create `path` and start the writer thread for frames of `size`.
    pub fn new(
        device: Arc<D>,
        path: impl AsRef<Path>,
        size: Size,
        config: &CaptureConfig,
    ) -> GifSnapResult<Self> {
        if size.is_empty() {
            return Err(GifSnapError::EncoderError(format!(
                "Cannot encode {} frames",
                size
            )));
        }

        let quality = config.gif_quality.clamp(1, 100);
        // Quality: 1-100 maps to gifski's quality 1-100
        let settings = GifskiSettings {
            quality: quality as u8,
            fast: quality < 50, // Use fast mode for lower quality
            repeat: gifski::Repeat::Infinite,
            ..Default::default()
        };

        let (collector, writer) = gifski::new(settings)?;

        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;

        let handle = thread::Builder::new()
            .name("gifsnap-gif-writer".to_string())
            .spawn(move || -> GifSnapResult<()> {
                let mut out = BufWriter::new(file);
                writer.write(&mut out, &mut gifski::progress::NoProgress {})?;
                out.flush()?;
                Ok(())
            })
            .map_err(|e| {
                GifSnapError::EncoderError(format!("Failed to spawn GIF writer: {}", e))
            })?;

        log::info!(
            "[GIF] Encoding {} frames to {:?} (quality {})",
            size,
            path,
            quality
        );

        Ok(Self {
            device,
            path,
            size,
            max_frames: config.max_frames,
            collector: Some(collector),
            writer: Some(handle),
            frames_written: 0,
            first_timestamp: None,
            last_timestamp: None,
            bytes_written: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> usize {
        self.frames_written
    }

    /// Size of the finished file, once flushed.
    pub fn bytes_written(&self) -> Option<u64> {
        self.bytes_written
    }

    fn join_writer(&mut self) -> GifSnapResult<()> {
        // Dropping the collector tells the writer no more frames are coming
        self.collector.take();
        match self.writer.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| GifSnapError::EncoderError("GIF writer thread panicked".to_string()))?,
            None => Ok(()),
        }
    }
}

impl<D: GpuDevice> EncodingSink<D::Surface> for GifSink<D> {
    fn process(&mut self, frame: &ComposedFrame<'_, D::Surface>) -> GifSnapResult<()> {
        if frame.size() != self.size {
            return Err(GifSnapError::EncoderError(format!(
                "Frame size {} does not match GIF size {}",
                frame.size(),
                self.size
            )));
        }

        let Some(collector) = self.collector.as_mut() else {
            return Err(GifSnapError::EncoderError(
                "GIF already finished".to_string(),
            ));
        };

        if self.last_timestamp == Some(frame.timestamp()) {
            log::debug!("[GIF] Skipping frame with repeated timestamp {}", frame.timestamp());
            return Ok(());
        }
        if self.max_frames.is_some_and(|max| self.frames_written >= max) {
            return Ok(());
        }

        let bgra = self.device.read_surface(frame.surface())?;
        let pixels = bgra_to_rgba(&bgra);
        let img = imgref::Img::new(pixels, self.size.width as usize, self.size.height as usize);

        let first = *self.first_timestamp.get_or_insert(frame.timestamp());
        let presentation_timestamp = frame.timestamp().duration_since(first).as_secs_f64();

        collector.add_frame_rgba(self.frames_written, img, presentation_timestamp)?;

        self.frames_written += 1;
        self.last_timestamp = Some(frame.timestamp());
        if self.max_frames == Some(self.frames_written) {
            log::warn!(
                "[GIF] Frame limit {} reached, ignoring further frames",
                self.frames_written
            );
        }
        Ok(())
    }

    fn finish_and_flush(&mut self) -> GifSnapResult<()> {
        if self.writer.is_none() {
            log::warn!("[GIF] finish_and_flush called twice for {:?}", self.path);
            return Ok(());
        }

        let result = self.join_writer();

        if self.frames_written == 0 {
            if let Err(e) = std::fs::remove_file(&self.path) {
                log::warn!("[GIF] Failed to remove empty GIF {:?}: {}", self.path, e);
            }
            return Err(GifSnapError::EncoderError("No frames to encode".to_string()));
        }
        result?;

        let size = std::fs::metadata(&self.path).map(|m| m.len())?;
        self.bytes_written = Some(size);
        log::info!(
            "[GIF] Wrote {} frames ({} bytes) to {:?}",
            self.frames_written,
            size,
            self.path
        );
        Ok(())
    }
}

impl<D: GpuDevice> Drop for GifSink<D> {
    fn drop(&mut self) {
        if self.writer.is_some() {
            if let Err(e) = self.join_writer() {
                log::warn!("[GIF] Unfinished GIF {:?} dropped: {}", self.path, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{SoftwareDevice, SurfaceDescriptor};

    fn solid_surface(
        device: &SoftwareDevice,
        size: Size,
        bgra: [u8; 4],
    ) -> crate::gpu::SoftwareSurface {
        let surface = device
            .create_surface(&SurfaceDescriptor::bgra("gif frame", size))
            .unwrap();
        device
            .write_surface(&surface, &bgra.repeat(size.area() as usize))
            .unwrap();
        surface
    }

    #[test]
    fn test_bgra_to_rgba() {
        let rgba = bgra_to_rgba(&[1, 2, 3, 4, 10, 20, 30, 40]);
        assert_eq!(rgba, vec![rgb::RGBA8::new(3, 2, 1, 4), rgb::RGBA8::new(30, 20, 10, 40)]);
    }

    #[test]
    fn test_writes_gif_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.gif");
        let device = Arc::new(SoftwareDevice::new());
        let size = Size::new(16, 16);

        let mut sink = GifSink::new(Arc::clone(&device), &path, size, &CaptureConfig::default())
            .unwrap();

        let red = solid_surface(&device, size, [0, 0, 255, 255]);
        let blue = solid_surface(&device, size, [255, 0, 0, 255]);
        sink.process(&ComposedFrame::new(&red, size, Timestamp::from_millis(0)))
            .unwrap();
        sink.process(&ComposedFrame::new(&blue, size, Timestamp::from_millis(33)))
            .unwrap();
        // Same timestamp as the previous frame is skipped
        sink.process(&ComposedFrame::new(&red, size, Timestamp::from_millis(33)))
            .unwrap();
        sink.process(&ComposedFrame::new(&red, size, Timestamp::from_millis(66)))
            .unwrap();

        sink.finish_and_flush().unwrap();

        assert_eq!(sink.frames_written(), 3);
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"GIF89a"));
        assert_eq!(sink.bytes_written(), Some(bytes.len() as u64));
    }

    #[test]
    fn test_max_frames_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("limited.gif");
        let device = Arc::new(SoftwareDevice::new());
        let size = Size::new(8, 8);
        let config = CaptureConfig {
            max_frames: Some(2),
            ..Default::default()
        };

        let mut sink = GifSink::new(Arc::clone(&device), &path, size, &config).unwrap();
        let surface = solid_surface(&device, size, [0, 255, 0, 255]);
        for ms in [0, 33, 66, 100] {
            sink.process(&ComposedFrame::new(&surface, size, Timestamp::from_millis(ms)))
                .unwrap();
        }
        sink.finish_and_flush().unwrap();

        assert_eq!(sink.frames_written(), 2);
        // Only the frames that were encoded were read back
        assert_eq!(device.stats().reads, 2);
    }

    #[test]
    fn test_no_frames_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.gif");
        let device = Arc::new(SoftwareDevice::new());

        let mut sink =
            GifSink::new(device, &path, Size::new(8, 8), &CaptureConfig::default()).unwrap();
        let err = sink.finish_and_flush().unwrap_err();

        assert!(matches!(err, GifSnapError::EncoderError(_)));
        assert!(!path.exists());
    }

    #[test]
    fn test_no_frames_with_file_already_gone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.gif");
        let device = Arc::new(SoftwareDevice::new());

        let mut sink =
            GifSink::new(device, &path, Size::new(8, 8), &CaptureConfig::default()).unwrap();
        std::fs::remove_file(&path).unwrap();

        // Cleanup failure is logged; the missing-frames error still wins
        let err = sink.finish_and_flush().unwrap_err();
        assert!(matches!(err, GifSnapError::EncoderError(_)));
        assert!(sink.finish_and_flush().is_ok());
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let device = Arc::new(SoftwareDevice::new());
        let mut sink = GifSink::new(
            Arc::clone(&device),
            dir.path().join("mismatch.gif"),
            Size::new(8, 8),
            &CaptureConfig::default(),
        )
        .unwrap();

        let surface = solid_surface(&device, Size::new(4, 4), [0, 0, 0, 255]);
        let result = sink.process(&ComposedFrame::new(&surface, Size::new(4, 4), Timestamp::ZERO));
        assert!(matches!(result, Err(GifSnapError::EncoderError(_))));
    }
}
