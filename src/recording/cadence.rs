//! Frame cadence normalization.
//!
//! Capture sources only deliver frames when the screen changes, so a static
//! region produces long gaps. The cadence driver reissues the last composed
//! frame whenever nothing reached the sink for one interval.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};

use super::CaptureController;
use crate::capture::CaptureBackend;
use crate::error::{GifSnapError, GifSnapResult};
use crate::gpu::GpuDevice;

/// Background thread that repeats stale frames on a controller.
pub struct CadenceDriver {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<u64>>,
    interval: Duration,
}

impl CadenceDriver {
    pub fn spawn<D, B>(controller: CaptureController<D, B>, interval: Duration) -> GifSnapResult<Self>
    where
        D: GpuDevice,
        B: CaptureBackend<D::Surface>,
    {
        if interval.is_zero() {
            return Err(GifSnapError::ConfigError(
                "Cadence interval must be positive".to_string(),
            ));
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("gifsnap-cadence".to_string())
            .spawn(move || {
                let mut repeats = 0u64;
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        // Stop requested or driver dropped
                        _ => break,
                    }

                    match controller.repeat_if_stale(interval) {
                        Ok(true) => repeats += 1,
                        Ok(false) => {}
                        Err(e) => log::warn!("[CADENCE] Repeat frame failed: {}", e),
                    }
                }
                repeats
            })
            .map_err(|e| GifSnapError::Other(format!("Failed to spawn cadence thread: {}", e)))?;

        log::info!("[CADENCE] Repeating stale frames every {:?}", interval);

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
            interval,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Stop the thread and wait for it. Returns the number of repeated frames.
    pub fn stop(mut self) -> u64 {
        self.shutdown()
    }

    fn shutdown(&mut self) -> u64 {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        let repeats = match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                log::error!("[CADENCE] Cadence thread panicked");
                0
            }),
            None => return 0,
        };
        log::debug!("[CADENCE] Stopped after {} repeated frames", repeats);
        repeats
    }
}

impl Drop for CadenceDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}
