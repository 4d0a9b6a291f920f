use anyhow::Context as _;
use aws_config::BehaviorVersion;
use pigeonhole::{
    Archiver, Config, Poller, Processor,
    archive::s3::S3ObjectStore,
    shutdown, telemetry,
    transport::sqs::SqsQueue,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    telemetry::init(&config.logging).context("Failed to initialize tracing")?;

    let bucket = config.bucket()?;
    tracing::info!(
        queue_url = %config.queue_url,
        bucket,
        interval_secs = config.poller.interval.as_secs(),
        max_messages = config.poller.max_messages,
        "Starting pigeonhole worker"
    );

    let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;

    let archiver = Archiver::new(S3ObjectStore::new(aws_sdk_s3::Client::new(&sdk_config), bucket));
    let queue = SqsQueue::new(aws_sdk_sqs::Client::new(&sdk_config), &config.queue_url);
    let poller = Poller::new(queue, Processor::new(archiver), config.poller);

    poller.run_every(shutdown::cancel_on_signal()).await;

    tracing::info!("Pigeonhole worker stopped");
    Ok(())
}
