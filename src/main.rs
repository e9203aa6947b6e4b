//! Headless driver: loads a set of images through the session exactly as
//! the viewer would, then reports what ended up on the GPU.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, ArgGroup, Parser};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use walkdir::WalkDir;

use swipe_compare::config::Configuration;
use swipe_compare::gpu::{HeadlessUploader, TextureUploader, WgpuUploader};
use swipe_compare::session::{CompositeMode, Session};
use swipe_compare::texture;

#[derive(Debug, Parser)]
#[command(name = "swipe-compare", about = "Load images for side-by-side comparison")]
#[command(group(ArgGroup::new("mode").args(["split", "columns"])))]
struct Cli {
    /// Image files or directories to import
    #[arg(required = true, value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Start in split view once two images are loaded
    #[arg(long)]
    split: bool,

    /// Start with side-by-side columns once two images are loaded
    #[arg(long)]
    columns: bool,

    /// Path to YAML config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Upload to a real GPU device instead of the in-memory uploader
    #[arg(long)]
    gpu: bool,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let level = match verbosity {
                0 => "info",
                1 => "debug",
                _ => "trace",
            };
            EnvFilter::new(level)
                .add_directive("wgpu=warn".parse()?)
                .add_directive("wgpu_core=warn".parse()?)
                .add_directive("wgpu_hal=warn".parse()?)
                .add_directive("naga=warn".parse()?)
        }
    };
    fmt().with_env_filter(filter).with_target(true).init();
    Ok(())
}

/// Expands directories into the supported images below them.
fn collect_paths(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for input in inputs {
        if !input.is_dir() {
            paths.push(input.clone());
            continue;
        }
        let before = paths.len();
        for entry in WalkDir::new(input)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            if texture::is_supported(entry.path()) {
                paths.push(entry.into_path());
            }
        }
        info!(dir = %input.display(), found = paths.len() - before, "directory scanned");
    }
    paths
}

fn load_config(path: Option<&Path>) -> Result<Configuration> {
    let cfg = match path {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Configuration::default(),
    };
    cfg.validated().context("validating configuration")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let mut cfg = load_config(cli.config.as_deref())?;
    if cli.split {
        cfg.composite = CompositeMode::Split;
    } else if cli.columns {
        cfg.composite = CompositeMode::SideBySide;
    }

    let mut uploader: Box<dyn TextureUploader> = if cli.gpu {
        Box::new(WgpuUploader::headless().context("opening GPU device")?)
    } else {
        Box::new(HeadlessUploader::new())
    };

    let mut session = Session::new(&cfg);
    let paths = collect_paths(&cli.paths);
    let queued = session.import_files(&paths, true);
    if queued == 0 {
        bail!("none of the given paths is a supported image");
    }
    info!(queued, workers = session.pool().worker_count(), "import started");

    let started = Instant::now();
    let deadline = started + cfg.settle_timeout;
    loop {
        session
            .process_uploads(uploader.as_mut())
            .context("uploading textures")?;
        if session.is_settled() {
            break;
        }
        if Instant::now() >= deadline {
            warn!(
                outstanding = session.pool().outstanding(),
                "timed out waiting for imports"
            );
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        composite = ?session.composite(),
        "import finished"
    );

    for (index, image) in session.images().iter().enumerate() {
        let (width, height) = image.texture().dimensions();
        info!(
            index,
            id = %image.id(),
            name = image.file_name(),
            width,
            height,
            format = ?image.texture().format(),
            status = ?image.texture().status(),
            encoding = %image.encoding(),
            gpu_id = image.texture().raw_id(),
            top = session.top_index() == Some(index),
            compare = session.compare_index() == Some(index),
            "image"
        );
    }

    session.shutdown();
    Ok(())
}
