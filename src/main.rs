use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use gifsnap_lib::config::{get_repeat_interval, set_config};
use gifsnap_lib::{
    CadenceDriver, CaptureConfig, CaptureController, Display, DisplayId, DisplayLayout, GifSink,
    GifSnapError, GifSnapResult, GpuDevice, PatternBackend, Rect, SoftwareDevice, WgpuDevice,
};

/// Record a screen region to an animated GIF.
///
/// Frames come from a synthetic test pattern rendered on the selected GPU
/// device, so the full capture pipeline runs without a compositor.
#[derive(Parser, Debug)]
#[command(name = "gifsnap", version)]
struct Cli {
    /// Output GIF path
    #[arg(short, long, default_value = "capture.gif")]
    output: PathBuf,

    /// Selection in overlay coordinates: x,y,width,height
    #[arg(short, long, value_parser = parse_rect, default_value = "100,100,320,240")]
    region: Rect,

    /// Display bounds in desktop coordinates: x,y,width,height (repeatable)
    #[arg(long = "display", value_parser = parse_rect)]
    displays: Vec<Rect>,

    /// Source frame rate
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Recording length in milliseconds
    #[arg(short, long, default_value_t = 3000)]
    duration_ms: u64,

    /// JSON capture config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Repeat the last frame after this many idle milliseconds
    #[arg(long)]
    repeat_ms: Option<u64>,

    /// Use the wgpu device instead of the software device
    #[arg(long)]
    gpu: bool,
}

fn parse_rect(s: &str) -> Result<Rect, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let &[x, y, w, h] = parts.as_slice() else {
        return Err(format!("expected x,y,width,height, got '{}'", s));
    };
    let coord = |v: &str| v.parse::<i32>().map_err(|e| format!("'{}': {}", v, e));
    let extent = |v: &str| v.parse::<u32>().map_err(|e| format!("'{}': {}", v, e));
    let rect = Rect::new(coord(x)?, coord(y)?, extent(w)?, extent(h)?);
    if rect.is_empty() {
        return Err(format!("'{}' has no area", s));
    }
    Ok(rect)
}

fn layout_from(displays: &[Rect]) -> DisplayLayout {
    if displays.is_empty() {
        return DisplayLayout::new(vec![Display::new(
            DisplayId::new(1),
            Rect::new(0, 0, 1920, 1080),
        )]);
    }
    DisplayLayout::new(
        displays
            .iter()
            .enumerate()
            .map(|(i, bounds)| Display::new(DisplayId::new(i as u64 + 1), *bounds))
            .collect(),
    )
}

fn load_config(cli: &Cli) -> GifSnapResult<CaptureConfig> {
    let mut config = match &cli.config {
        Some(path) => CaptureConfig::load(path)?,
        None => CaptureConfig::default(),
    };
    if cli.repeat_ms.is_some() {
        config.repeat_interval_ms = cli.repeat_ms;
    }
    config.validate();
    set_config(config.clone());
    Ok(config)
}

fn run<D: GpuDevice>(device: Arc<D>, cli: &Cli, config: &CaptureConfig) -> GifSnapResult<()> {
    let layout = layout_from(&cli.displays);
    let resolved = layout.resolve(cli.region).ok_or_else(|| {
        GifSnapError::InvalidRegion(format!("{:?} is not on any display", cli.region))
    })?;

    let backend = PatternBackend::new(Arc::clone(&device), cli.fps);
    let controller = CaptureController::new(Arc::clone(&device), backend);
    let sink = GifSink::new(
        Arc::clone(&device),
        &cli.output,
        resolved.region.size(),
        config,
    )?;

    controller.start(&resolved.target, resolved.region, sink)?;

    let cadence = match get_repeat_interval() {
        Some(interval) => Some(CadenceDriver::spawn(controller.clone(), interval)?),
        None => None,
    };

    std::thread::sleep(Duration::from_millis(cli.duration_ms));

    if let Some(cadence) = cadence {
        cadence.stop();
    }
    let stats = controller.stats().unwrap_or_default();
    controller.stop()?;

    println!(
        "Saved {} ({} frames, {} repeated)",
        cli.output.display(),
        stats.frames_delivered,
        stats.frames_repeated
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = load_config(&cli).and_then(|config| {
        if cli.gpu {
            run(Arc::new(WgpuDevice::new()?), &cli, &config)
        } else {
            run(Arc::new(SoftwareDevice::new()), &cli, &config)
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
