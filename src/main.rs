//! scanflow - replay raw scanner captures through the acquisition pipeline
//! and save the resulting pages as PNG.

use anyhow::{Context, Result, bail};
use clap::Parser;
use humansize::{BINARY, format_size};
use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::Level;

use scanflow::{
    ColorMode, FillMode, Parameters, ReadStatus, ScanArea, ScanSettings, ScanSource, Scanner,
    ScannerConfig, Transport, WorkerBackend, find_profile, plan_scan,
};
use scanflow_io::{SyntheticScan, Throttled, open_capture};

#[derive(Parser, Debug)]
#[command(name = "scanflow")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Replay raw scanner streams through the acquisition pipeline")]
struct Cli {
    /// Raw capture to replay. Without it a synthetic test page is generated.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Scanner configuration (JSON).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the model from the configuration.
    #[arg(long)]
    model: Option<String>,

    #[arg(short, long, default_value_t = 150)]
    resolution: u32,

    #[arg(long, default_value = "color24")]
    mode: ColorMode,

    #[arg(long, default_value = "flatbed")]
    source: ScanSource,

    /// raw, last, raster, white, black or color:RRGGBB
    #[arg(long, default_value = "last")]
    fill: FillMode,

    #[arg(long, default_value_t = 50.0)]
    width_mm: f64,

    #[arg(long, default_value_t = 50.0)]
    height_mm: f64,

    /// Pages to read; more than one only makes sense for feeder sources.
    #[arg(short, long, default_value_t = 1)]
    pages: usize,

    /// Per-read latency of the simulated link, in milliseconds.
    #[arg(long, default_value_t = 0)]
    latency_ms: u64,

    #[arg(short, long, default_value = "./pages")]
    output: PathBuf,

    /// -v for debug output, -vv for trace.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    let mut config = match &cli.config {
        Some(path) => ScannerConfig::from_path(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => ScannerConfig::default(),
    };
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }

    let settings = ScanSettings {
        resolution: cli.resolution,
        mode: cli.mode,
        source: cli.source,
        area: ScanArea::new(0.0, 0.0, cli.width_mm, cli.height_mm),
        fill: cli.fill,
        ..Default::default()
    };

    let mut scanner = if matches!(config.backend, WorkerBackend::Process { .. }) {
        Scanner::open_helper(config.clone()).context("Failed to open scanner")?
    } else {
        let transport = build_transport(&cli, &config, &settings)?;
        Scanner::open(transport, config.clone()).context("Failed to open scanner")?
    };
    scanner
        .set_settings(settings)
        .context("Scanner rejected the settings")?;

    std::fs::create_dir_all(&cli.output)
        .with_context(|| format!("Failed to create {}", cli.output.display()))?;

    let started = Instant::now();
    let mut total = 0u64;
    for page in 1..=cli.pages {
        let Some(bytes) = scan_page(&mut scanner, page, &cli.output, &running)? else {
            println!("\nScan interrupted on page {page}");
            break;
        };
        total += bytes;
    }

    println!(
        "Read {} in {:.1}s into {}",
        format_size(total, BINARY),
        started.elapsed().as_secs_f64(),
        cli.output.display()
    );
    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn build_transport(
    cli: &Cli,
    config: &ScannerConfig,
    settings: &ScanSettings,
) -> Result<Box<dyn Transport>> {
    let transport: Box<dyn Transport> = match &cli.input {
        Some(path) => open_capture(path)
            .with_context(|| format!("Failed to open capture: {}", path.display()))?,
        None => {
            let profile = find_profile(&config.model)?;
            let plan = plan_scan(profile, settings, config.warmup)?;
            let scan = SyntheticScan::new(plan.format, plan.layout, plan.delays);
            // each sheet ends three quarters down the requested area
            let page_end = (plan.lines * 3 / 4).max(plan.delays.max());
            let marker = plan.boundary.detect.then_some(page_end);
            let mut stream = Vec::new();
            for _ in 0..cli.pages {
                stream.extend_from_slice(&scan.row_tagged(plan.lines, marker));
            }
            Box::new(scanflow_io::MemoryTransport::new(stream))
        }
    };

    if cli.latency_ms > 0 {
        Ok(Box::new(Throttled::new(
            transport,
            Duration::from_millis(cli.latency_ms),
        )))
    } else {
        Ok(transport)
    }
}

/// Reads one page and saves it. `None` if the user interrupted the scan.
fn scan_page(
    scanner: &mut Scanner,
    page: usize,
    output: &Path,
    running: &AtomicBool,
) -> Result<Option<u64>> {
    scanner
        .start()
        .with_context(|| format!("Failed to start page {page}"))?;
    let params = scanner.parameters()?;

    let pb = ProgressBar::new(params.total_bytes());
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:50.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .context("invalid progress bar template")?
            .progress_chars("##-"),
    );

    let mut data = Vec::with_capacity(params.total_bytes() as usize);
    let mut chunk = vec![0u8; params.bytes_per_line.max(1) * 32];
    loop {
        if !running.load(Ordering::SeqCst) {
            scanner.cancel();
            pb.abandon();
            return Ok(None);
        }
        match scanner
            .read(&mut chunk)
            .with_context(|| format!("Read failed on page {page}"))?
        {
            ReadStatus::Data(n) => {
                data.extend_from_slice(&chunk[..n]);
                pb.set_position(data.len() as u64);
            }
            ReadStatus::Pending => std::thread::sleep(Duration::from_millis(1)),
            ReadStatus::EndOfData => break,
        }
    }
    pb.finish_and_clear();

    let path = output.join(format!("page-{page:03}.png"));
    save_png(&path, &params, scanner.settings().mode, &data)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!(
        "Page {page}: {}x{} px, {} -> {}",
        params.pixels_per_line,
        params.lines,
        format_size(data.len() as u64, BINARY),
        path.display()
    );
    Ok(Some(data.len() as u64))
}

fn save_png(path: &Path, params: &Parameters, mode: ColorMode, data: &[u8]) -> Result<()> {
    let width = params.pixels_per_line as u32;
    let height = params.lines as u32;
    let wide = |bytes: &[u8]| -> Vec<u16> {
        bytes
            .chunks_exact(2)
            .map(|s| u16::from_le_bytes([s[0], s[1]]))
            .collect()
    };

    match mode {
        ColorMode::Lineart => {
            let mut pixels = Vec::with_capacity(params.pixels_per_line * params.lines);
            for row in data.chunks_exact(params.bytes_per_line) {
                for x in 0..params.pixels_per_line {
                    let black = row[x / 8] & (0x80 >> (x % 8)) != 0;
                    pixels.push(if black { 0 } else { 255 });
                }
            }
            save(GrayImage::from_raw(width, height, pixels), path)
        }
        ColorMode::Gray8 => save(GrayImage::from_raw(width, height, data.to_vec()), path),
        ColorMode::Color24 => save(RgbImage::from_raw(width, height, data.to_vec()), path),
        ColorMode::Gray16 => save(
            ImageBuffer::<Luma<u16>, _>::from_raw(width, height, wide(data)),
            path,
        ),
        ColorMode::Color48 => save(
            ImageBuffer::<Rgb<u16>, _>::from_raw(width, height, wide(data)),
            path,
        ),
    }
}

fn save<P>(image: Option<ImageBuffer<P, Vec<P::Subpixel>>>, path: &Path) -> Result<()>
where
    P: image::Pixel + image::PixelWithColorType,
    [P::Subpixel]: image::EncodableLayout,
{
    let Some(image) = image else {
        bail!("page data does not match its parameters");
    };
    image.save(path)?;
    Ok(())
}
