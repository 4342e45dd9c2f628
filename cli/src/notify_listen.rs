use anyhow::Result;
use lib_notify::{CredentialContext, Listener, Notification, NotificationClient};
use std::sync::Arc;
use tokio::signal;

mod listen_logic;
use listen_logic::{config, logger};

fn logging_listener(key: String) -> Listener {
    Arc::new(move |notification: &Notification| {
        let title = notification.title.as_deref().unwrap_or("-");
        let message = notification.message.as_deref().unwrap_or("");
        match (&notification.service_name, &notification.severity) {
            (Some(service), Some(severity)) => {
                log::info!("[{}] {} {}: {} ({})", key, service, severity, message, title)
            }
            _ => log::info!(
                "[{}] {}: {} ({})",
                key,
                notification.kind.as_deref().unwrap_or("notification"),
                message,
                title
            ),
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Explicitly install the default crypto provider for rustls (wss:// endpoints)
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = config::load_config();
    let log_dir = config.log_dir.clone().unwrap_or_else(|| "./logs".into());
    let log_level = config.log_level.clone().unwrap_or_else(|| "info".to_string());
    logger::setup_logging(&log_dir, &log_level)?;

    let client = NotificationClient::new(config.client_config());

    let keys = config.keys.clone().unwrap_or_else(|| vec!["*".to_string()]);
    let listeners: Vec<(String, Listener)> = keys
        .into_iter()
        .map(|key| {
            let listener = logging_listener(key.clone());
            client.subscribe(&key, &listener);
            (key, listener)
        })
        .collect();
    log::info!(
        "Listening on keys: {}",
        listeners.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>().join(", ")
    );

    let role = config.role.clone().unwrap_or_else(|| "customer".to_string());
    let credentials = match &config.token {
        Some(token) => CredentialContext::bearer(token),
        None => CredentialContext::anonymous(),
    };

    if let Err(e) = client.connect(&role, &credentials).await {
        log::warn!("Initial connect failed ({}); automatic reconnection continues in the background.", e);
    }

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        log::info!("SIGTERM received, initiating shutdown.");
                    }
                    Err(e) => {
                        log::warn!("Cannot listen for SIGTERM: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }

    client.disconnect().await;
    for (key, listener) in &listeners {
        client.unsubscribe(key, listener);
    }

    log::info!("Shutdown complete.");
    Ok(())
}
