use anyhow::Result;
use logique::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    tracing::info!(name = version::NAME, version = version::VERSION, "starting");

    let runtime: Arc<dyn runtime::ContainerRuntime> = Arc::new(runtime::DockerRuntime::connect()?);
    if let Err(e) = runtime.ping().await {
        tracing::warn!(error = %e, "container runtime not reachable; serving fallbacks until it is");
    }
    let sysinfo_repo = Arc::new(sysinfo_repo::SysinfoRepo::new());
    let telemetry = Arc::new(telemetry::Telemetry::new(runtime, sysinfo_repo, &app_config));
    let broadcaster = Arc::new(broadcaster::Broadcaster::new(
        telemetry.clone(),
        app_config.streaming.subscriber_buffer,
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let invalidator_handle = invalidator::spawn(invalidator::InvalidatorDeps {
        telemetry: telemetry.clone(),
        broadcaster: broadcaster.clone(),
        shutdown_rx,
    });

    let app = routes::app(telemetry, broadcaster, app_config.clone());
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
            let _ = invalidator_handle.await;
        }
    }

    Ok(())
}
