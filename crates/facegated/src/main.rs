use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

const BUS_NAME: &str = "org.freedesktop.Facegate1";
const OBJECT_PATH: &str = "/org/freedesktop/Facegate1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facegated starting");

    let config = config::Config::load();
    tracing::info!(
        db = %config.db_path.display(),
        auth_threshold = config.auth_threshold,
        match_threshold = config.match_threshold,
        descriptor_dim = config.descriptor_dim,
        "configuration resolved"
    );

    let engine = engine::spawn_engine(&config).context("failed to start matching engine")?;
    let use_system_bus = config.system_bus;
    let service = dbus_interface::FacegateService::new(engine, config);

    let builder = if use_system_bus {
        zbus::connection::Builder::system()?
    } else {
        zbus::connection::Builder::session()?
    };
    let _connection = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("failed to register D-Bus service")?;

    tracing::info!(bus = BUS_NAME, system = use_system_bus, "facegated ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("facegated shutting down");

    Ok(())
}
