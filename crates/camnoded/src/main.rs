use anyhow::{Context, Result};
use camnode_core::bus::{BUS_NAME, OBJECT_PATH};
use camnode_hw::Camera;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
#[cfg(test)]
mod testing;
mod topics;

use config::{Args, BusKind, Config};
use dbus_interface::CameraService;
use topics::Topics;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_args(Args::parse(), &config::home_dir())?;
    tracing::info!(
        device = %config.device,
        frame_rate = config.frame_rate,
        namespace = %config.namespace,
        "camnoded starting"
    );

    // Fail fast if the camera is unavailable.
    let camera = Camera::open(&config.device, config.width, config.height)
        .with_context(|| format!("failed to open video device {}", config.device))?;
    camera.set_frame_rate(config.frame_rate.round().max(1.0) as u32);

    let topics = Topics::new(&config.namespace);
    let relay_rx = topics.camera_info.subscribe();
    let settings = config.node_settings();
    let engine = engine::spawn_engine(camera, settings.clone(), topics)?;

    let builder = match config.bus {
        BusKind::Session => zbus::connection::Builder::session()?,
        BusKind::System => zbus::connection::Builder::system()?,
    };
    let conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, CameraService::new(engine.clone()))?
        .build()
        .await
        .context("failed to register on D-Bus")?;

    let relay = tokio::spawn(dbus_interface::relay_frames(conn.clone(), relay_rx));

    let status = engine.status().await?;
    tracing::info!(
        image_topic = %status.image_topic,
        camera_info_topic = %status.camera_info_topic,
        service = %status.service,
        yaml = %settings.camera_info_path.display(),
        bus_name = BUS_NAME,
        "camnoded ready"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("camnoded shutting down");

    // The relay holds a connection clone; stop it before closing the bus.
    relay.abort();
    let _ = relay.await;
    if let Err(e) = conn.close().await {
        tracing::debug!(error = %e, "D-Bus connection close failed");
    }
    Ok(())
}
