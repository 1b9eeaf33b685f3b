pub mod audio;
pub mod config;
pub mod console;
pub mod metrics;
pub mod pipeline;
pub mod session;
pub mod state_machine;
pub mod transport;

use audio::MicSource;
use config::CaptureConfig;
use session::{run_session_loop, CaptureSession};
use transport::WsConnector;

pub fn run() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // wss:// endpoints need a process-wide rustls provider
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        log::debug!("rustls crypto provider already installed");
    }

    let config = CaptureConfig::from_env();
    match serde_json::to_string(&config) {
        Ok(json) => log::info!("mic-relay starting: {}", json),
        Err(e) => log::warn!("Failed to serialize config: {}", e),
    }

    let endpoint = match config.endpoint() {
        Ok(endpoint) => endpoint,
        Err(e) => {
            log::error!("Invalid endpoint: {}", e);
            return;
        }
    };

    // Device acquire and release block the session task briefly; a second
    // worker keeps the WebSocket tasks moving meanwhile
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Failed to start tokio runtime: {}", e);
            return;
        }
    };

    runtime.block_on(async move {
        let source = MicSource::new(config.device.clone(), config.block_size);
        let (session, events) = CaptureSession::new(source, WsConnector::new(), endpoint);
        let handle = session.handle();

        let session_task = tokio::spawn(run_session_loop(session, events));

        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        if let Err(e) = console::run_console(&handle, stdin).await {
            log::error!("Console failed: {}", e);
        }

        handle.shutdown();
        if let Err(e) = session_task.await {
            log::error!("Session loop panicked: {}", e);
        }
    });

    // A pending stdin read would otherwise block runtime drop
    runtime.shutdown_background();
    log::info!("mic-relay exited");
}
