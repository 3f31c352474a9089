use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;

use timetable::observability::{CONNECTIONS_ACTIVE, CONNECTIONS_REJECTED_TOTAL, CONNECTIONS_TOTAL};
use timetable::search::SearchConfig;
use timetable::semester::SemesterManager;
use timetable::wire;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r,
            _ = sigterm.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("TIMETABLE_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    timetable::observability::init(metrics_port)?;

    let port = std::env::var("TIMETABLE_PORT").unwrap_or_else(|_| "5433".into());
    let bind = std::env::var("TIMETABLE_BIND").unwrap_or_else(|_| "0.0.0.0".into());
    let data_dir = std::env::var("TIMETABLE_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let password = std::env::var("TIMETABLE_PASSWORD").unwrap_or_else(|_| "timetable".into());
    let max_connections: usize = env_or("TIMETABLE_MAX_CONNECTIONS", 256);
    let compact_threshold: u64 = env_or("TIMETABLE_COMPACT_THRESHOLD", 1000);
    let search = SearchConfig::from_env();

    let tls_cert = std::env::var("TIMETABLE_TLS_CERT").ok();
    let tls_key = std::env::var("TIMETABLE_TLS_KEY").ok();
    let tls_acceptor = timetable::tls::load_tls_acceptor(tls_cert.as_deref(), tls_key.as_deref())?;

    std::fs::create_dir_all(&data_dir)?;

    let semesters = Arc::new(SemesterManager::new(PathBuf::from(&data_dir), compact_threshold));
    let semaphore = Arc::new(Semaphore::new(max_connections));

    let addr = format!("{bind}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("timetable listening on {addr}");
    info!("  data_dir: {data_dir}");
    info!("  max_connections: {max_connections}");
    info!("  tls: {}", if tls_acceptor.is_some() { "enabled" } else { "disabled" });
    info!(
        "  search: suggest step {}m, resolve step {}m, limit {}",
        search.suggest_step_minutes, search.resolve_step_minutes, search.suggestion_limit
    );

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (socket, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!("accept error: {e}");
                        continue;
                    }
                };

                let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                    tracing::warn!("connection limit reached, rejecting {peer}");
                    metrics::counter!(CONNECTIONS_REJECTED_TOTAL).increment(1);
                    continue;
                };

                info!("connection from {peer}");
                metrics::counter!(CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(CONNECTIONS_ACTIVE).increment(1.0);
                let semesters = semesters.clone();
                let password = password.clone();
                let search = search.clone();
                let tls = tls_acceptor.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = wire::process_connection(socket, semesters, password, search, tls).await {
                        tracing::error!("connection error from {peer}: {e}");
                    }
                    metrics::gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
                });
            }
            signal = &mut shutdown => {
                if let Err(e) = signal {
                    tracing::warn!("signal handler failed: {e}");
                }
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    info!("draining connections...");
    let drain_deadline = tokio::time::sleep(Duration::from_secs(10));
    tokio::pin!(drain_deadline);

    loop {
        if semaphore.available_permits() == max_connections {
            info!("all connections drained");
            break;
        }
        tokio::select! {
            _ = &mut drain_deadline => {
                let remaining = max_connections - semaphore.available_permits();
                tracing::warn!("drain timeout, {remaining} connections still open");
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }
    }

    semesters.shutdown();
    info!(semesters = semesters.open_semesters().len(), "timetable stopped");
    Ok(())
}
