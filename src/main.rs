//! Canvas Camera CLI
//!
//! Runs a capture session against the simulated camera backend and prints
//! one line per delivered frame result.

use canvas_camera::{
    capture::{Facing, FileConfig, MockBackend, OutputMode},
    output::{Emission, ImagePayload},
    session::{CameraService, PipelineStats},
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "canvas-camera", version, about = "Camera preview capture demo")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many frame results (0 runs until Ctrl-C)
    #[arg(short = 'n', long, default_value_t = 30)]
    frames: u64,

    /// Directory for file mode output
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Use the front lens
    #[arg(long)]
    front: bool,

    /// Emit thumbnails scaled by this ratio
    #[arg(long, value_name = "RATIO")]
    thumbnail: Option<f64>,

    /// Write frames to files instead of data URIs
    #[arg(long)]
    file: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn describe(image: &ImagePayload) -> String {
    match &image.emission {
        Emission::Data(uri) => format!("data[{} bytes]", uri.len()),
        Emission::File(path) => path.display().to_string(),
    }
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Canvas Camera v{}", canvas_camera::VERSION);

    let mut config = match &args.config {
        Some(path) => match FileConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => FileConfig::default(),
    };
    if let Some(dir) = args.cache_dir {
        config.output.cache_dir = dir;
    }
    if args.front {
        config.capture.camera_facing = Facing::Front;
    }
    if let Some(ratio) = args.thumbnail {
        config.capture.has_thumbnail = true;
        config.capture.thumbnail_ratio = ratio;
    }
    if args.file {
        config.capture.output_mode = OutputMode::File;
    }

    let backend = MockBackend::new();
    let control = backend.control();
    let mut service = match CameraService::new(backend, &config.output) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Failed to start camera service: {}", e);
            std::process::exit(1);
        }
    };

    #[cfg(feature = "metrics")]
    {
        if config.metrics.port != 0 {
            spawn_metrics_server(config.metrics.port, service.stats());
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst)) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }

    let stream = match service.start_capture(&config.capture.to_options()) {
        Ok(stream) => stream,
        Err(failure) => {
            eprintln!("Failed to start capture: {}", failure);
            std::process::exit(1);
        }
    };
    let mut source = control.spawn_frame_source(config.capture.fps);

    let mut delivered = 0u64;
    while running.load(Ordering::SeqCst) {
        match stream.recv_timeout(Duration::from_millis(200)) {
            Ok(result) => {
                delivered += 1;
                let images = &result.output.images;
                println!(
                    "frame {:>4}: fullsize={} thumbnail={}",
                    delivered,
                    images.fullsize.as_ref().map(describe).unwrap_or_default(),
                    images.thumbnail.as_ref().map(describe).unwrap_or_else(|| "-".into()),
                );
                if args.frames > 0 && delivered >= args.frames {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Capture stream closed");
                break;
            }
        }
    }

    source.stop();
    if let Err(failure) = service.stop_capture() {
        warn!("Stop failed: {}", failure);
    }
    report(&service.stats());
    service.destroy();
}

fn report(stats: &PipelineStats) {
    info!(
        received = stats.frames_received(),
        delivered = stats.frames_delivered(),
        dropped = stats.frames_dropped(),
        artifacts = stats.artifacts_written(),
        restarts = stats.restarts(),
        "Done"
    );
}

#[cfg(feature = "metrics")]
fn spawn_metrics_server(port: u16, stats: Arc<PipelineStats>) {
    use canvas_camera::metrics::{MetricsRegistry, MetricsServer, MetricsServerConfig};

    let registry = match MetricsRegistry::new() {
        Ok(registry) => registry,
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            return;
        }
    };
    let server = MetricsServer::new(MetricsServerConfig::with_port(port), registry, stats);

    let spawned = std::thread::Builder::new()
        .name("metrics-server".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .enable_io()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!("Metrics runtime failed: {}", e);
                    return;
                }
            };
            if let Err(e) = runtime.block_on(server.run()) {
                warn!("Metrics server stopped: {}", e);
            }
        });
    if let Err(e) = spawned {
        warn!("Could not spawn metrics thread: {}", e);
    }
}
