use std::sync::Arc;

use anyhow::Context as _;
use aws_config::BehaviorVersion;
use pigeonhole::{
    Config, Publisher, Transport, Validator,
    api::{self, AppState},
    secret::{SecretCache, SecretStore, ssm::SsmSecretStore},
    shutdown, telemetry,
    transport::{layers::JsonLayer, sqs::SqsQueue},
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    telemetry::init(&config.logging).context("Failed to initialize tracing")?;

    tracing::info!(
        bind_addr = %config.bind_addr,
        queue_url = %config.queue_url,
        "Starting pigeonhole api"
    );

    let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;

    let secrets = Arc::new(SecretCache::new(SsmSecretStore::new(
        aws_sdk_ssm::Client::new(&sdk_config),
        config.token_parameter()?,
    )));
    secrets
        .load()
        .await
        .context("Failed to load API token from secret store")?;

    let queue = SqsQueue::new(aws_sdk_sqs::Client::new(&sdk_config), &config.queue_url);
    let publisher = Publisher::new(Transport::new(queue).layer(JsonLayer));
    let validator = Validator::new(Arc::clone(&secrets));

    let cancel = shutdown::cancel_on_signal();
    refresh_on_hangup(Arc::clone(&secrets), cancel.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!(bind_addr = %config.bind_addr, "Listening");

    axum::serve(listener, api::router(AppState::new(validator, publisher)))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("HTTP server failed")?;

    tracing::info!("Pigeonhole api stopped");
    Ok(())
}

/// Reload the API token from the secret store on every SIGHUP.
#[cfg(unix)]
fn refresh_on_hangup<S: SecretStore + 'static>(
    secrets: Arc<SecretCache<S>>,
    cancel: CancellationToken,
) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(error) => {
            tracing::warn!(%error, "Failed to register SIGHUP handler, token refresh disabled");
            return;
        }
    };

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                    if let Err(error) = secrets.refresh().await {
                        tracing::error!(%error, "Failed to refresh API token, keeping the cached one");
                    }
                }
            }
        }
    });
}

#[cfg(not(unix))]
fn refresh_on_hangup<S: SecretStore + 'static>(
    _secrets: Arc<SecretCache<S>>,
    _cancel: CancellationToken,
) {
}
