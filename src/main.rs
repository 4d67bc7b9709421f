//! Skeleton-to-OSC server: control listener on UDP, sensor frames on TCP.

use std::io::BufRead;
use std::sync::Arc;

use anyhow::{Context, Result};

use kinect_osc::config::{Config, DEFAULT_CONFIG_PATH};
use kinect_osc::ingest::FrameServer;
use kinect_osc::listener::ControlListener;
use kinect_osc::pump::DataPump;
use kinect_osc::session::SessionRegistry;

fn print_sessions(registry: &SessionRegistry) {
    let sessions = registry.sessions();
    if sessions.is_empty() {
        log::info!("No active sessions");
        return;
    }
    for session in sessions {
        let config = session.snapshot();
        log::info!(
            "{}: retries={} active_requests={}",
            session.client(),
            session.retries(),
            config.has_any_active_request()
        );
    }
}

/// Console input: 's' toggles dancer swap, 'l' lists sessions, 'q' quits
fn spawn_console(pump: Arc<DataPump>, registry: Arc<SessionRegistry>) -> Result<()> {
    std::thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match line.trim() {
                    "s" => {
                        let swapped = pump.toggle_dancer_swap();
                        log::info!("Dancer swap: {}", if swapped { "ON" } else { "OFF" });
                    }
                    "l" => print_sessions(&registry),
                    "q" => {
                        log::info!("Shutting down");
                        registry.end_all();
                        std::process::exit(0);
                    }
                    "" => {}
                    other => log::warn!("Unknown command: {}", other),
                }
            }
        })
        .context("failed to spawn console thread")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path);

    log::info!("kinect-osc ({})", env!("GIT_VERSION"));
    log::info!("Control: udp://{}", config.control.listen_addr);
    log::info!("Frames: tcp://{}", config.frames.listen_addr);
    log::info!(
        "Sessions: liveness {} ms x {}, max {}",
        config.session.liveness_period_ms,
        config.session.max_retries,
        config.session.max_sessions
    );
    log::info!("Press 's' + Enter to swap dancers, 'l' to list sessions, 'q' to quit");

    let registry = Arc::new(SessionRegistry::new(
        config.session.settings(),
        config.session.max_sessions,
    ));
    let pump = Arc::new(DataPump::with_bundle_limits(
        Arc::clone(&registry),
        config.bundle.max_bundle_size,
        config.bundle.message_size_estimate,
    ));
    pump.set_dancer_swap(config.orientation.dancer_swap);

    let listener = ControlListener::bind(config.control.listen_addr, Arc::clone(&registry))
        .with_context(|| format!("failed to bind control socket {}", config.control.listen_addr))?;
    let _listener = listener.spawn().context("failed to start control listener")?;

    spawn_console(Arc::clone(&pump), Arc::clone(&registry))?;

    let frames = FrameServer::bind(config.frames.listen_addr, pump)
        .await
        .with_context(|| format!("failed to bind frame socket {}", config.frames.listen_addr))?;
    frames.run().await?;
    Ok(())
}
