use anyhow::{bail, Context, Result};
use camnode_core::bus::BUS_NAME;
use camnode_core::load_camera_info;
use camnode_hw::{Camera, DeviceSpec, FrameSource};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Instant;

mod proxy;

use proxy::CameraNodeProxy;

#[derive(Parser)]
#[command(name = "camnode", about = "camnode camera node CLI")]
struct Cli {
    /// Talk to a daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List V4L2 capture devices
    Devices,
    /// Capture frames directly from a camera (bypasses the daemon)
    Test {
        /// Device index or path
        #[arg(short, long, default_value = "0")]
        device: String,
        /// Number of frames to capture
        #[arg(short, long, default_value_t = 30)]
        frames: usize,
    },
    /// Show daemon status
    Status,
    /// Print the camera info the daemon is publishing
    Info,
    /// Send a calibration YAML (as written by a calibration tool) to the daemon
    SetInfo {
        /// Calibration file
        file: PathBuf,
    },
    /// Save the latest published frame as an image file
    Snapshot {
        /// Output path; the format follows the extension (e.g. .png)
        output: PathBuf,
    },
    /// Print a line for every published frame
    Watch {
        /// Stop after this many frames
        #[arg(short, long)]
        count: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices => list_devices(),
        Commands::Test { device, frames } => run_test(&device, frames),
        Commands::Status => {
            let proxy = connect(cli.system).await?;
            print_json(&proxy.status().await?)
        }
        Commands::Info => {
            let proxy = connect(cli.system).await?;
            print_json(&proxy.get_camera_info().await?)
        }
        Commands::SetInfo { file } => set_info(&connect(cli.system).await?, &file).await,
        Commands::Snapshot { output } => {
            let proxy = connect(cli.system).await?;
            let (width, height, encoding, data) = proxy.capture_image().await?;
            save_bgr8(&output, width, height, &encoding, data)?;
            println!("Saved {width}x{height} frame to {}", output.display());
            Ok(())
        }
        Commands::Watch { count } => watch(&connect(cli.system).await?, count).await,
    }
}

async fn connect(system: bool) -> Result<CameraNodeProxy<'static>> {
    let conn = if system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("cannot connect to D-Bus")?;

    // Proxy creation succeeds even with nobody on the bus name; ask the bus.
    let has_owner = zbus::fdo::DBusProxy::new(&conn)
        .await?
        .name_has_owner(zbus::names::BusName::try_from(BUS_NAME)?)
        .await
        .context("cannot query D-Bus for camnoded")?;
    require_owner(has_owner, system)?;

    Ok(CameraNodeProxy::new(&conn).await?)
}

fn require_owner(has_owner: bool, system: bool) -> Result<()> {
    if !has_owner {
        let bus = if system { "system" } else { "session" };
        bail!("camnoded is not running on the {bus} bus ({BUS_NAME} has no owner)");
    }
    Ok(())
}

fn print_json(raw: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

async fn set_info(proxy: &CameraNodeProxy<'_>, file: &Path) -> Result<()> {
    let mut info =
        load_camera_info(file).with_context(|| format!("cannot read {}", file.display()))?;
    // camera_name is not a frame id; let the daemon apply its own.
    info.header.frame_id.clear();
    let (success, message) = proxy
        .set_camera_info(&serde_json::to_string(&info)?)
        .await?;
    if !success {
        bail!("{message}");
    }
    println!("{message}");
    Ok(())
}

async fn watch(proxy: &CameraNodeProxy<'_>, count: Option<usize>) -> Result<()> {
    let mut frames = proxy.receive_frame_published().await?;
    let mut seen = 0usize;
    while let Some(signal) = frames.next().await {
        let args = signal.args()?;
        println!("{}.{:09} {}", args.sec, args.nanosec, args.frame_id);
        seen += 1;
        if count.is_some_and(|n| seen >= n) {
            break;
        }
    }
    Ok(())
}

fn list_devices() -> Result<()> {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No video capture devices found");
        return Ok(());
    }
    for d in devices {
        println!("{}\t{}\t{}\t{}", d.path, d.name, d.driver, d.bus);
    }
    Ok(())
}

fn run_test(device: &str, frames: usize) -> Result<()> {
    let spec = DeviceSpec::parse(device);
    let mut camera = Camera::open(&spec, 640, 480)?;
    let (width, height) = camera.resolution();
    println!(
        "Opened {} at {width}x{height} ({:?})",
        camera.device_path, camera.fourcc
    );

    let start = Instant::now();
    let mut failures = 0usize;
    for _ in 0..frames {
        match camera.next_frame() {
            Ok(frame) => tracing::debug!(seq = frame.sequence, bytes = frame.data.len(), "frame"),
            Err(e) => {
                failures += 1;
                tracing::warn!(error = %e, "capture failed");
            }
        }
    }
    let elapsed = start.elapsed().as_secs_f64();
    let captured = frames - failures;
    println!(
        "Captured {captured}/{frames} frames in {elapsed:.2}s ({:.1} fps)",
        if elapsed > 0.0 { captured as f64 / elapsed } else { 0.0 }
    );
    if captured == 0 && frames > 0 {
        bail!("no frames captured");
    }
    Ok(())
}

/// Write a bgr8 frame to disk, converting to RGB for the encoder.
fn save_bgr8(path: &Path, width: u32, height: u32, encoding: &str, mut data: Vec<u8>) -> Result<()> {
    if encoding != "bgr8" {
        bail!("unsupported encoding {encoding}");
    }
    for px in data.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
    let img = image::RgbImage::from_raw(width, height, data)
        .context("frame data does not match its dimensions")?;
    img.save(path)
        .with_context(|| format!("cannot write {}", path.display()))?;
    Ok(())
}
