use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::{
    archive::ObjectStore,
    clock::{Clock, SystemClock},
    consumer::{ConsumerHook, DefaultConsumerHook, Processor, Ticker, correlation_id_of},
    transport::{ReceiveRequest, ReceivedMessage, Receiver, TransportError},
};

/// Poll cycle settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Time between the starts of two cycles.
    pub interval: Duration,
    /// Batch size, at most 10 on SQS.
    pub max_messages: i32,
    /// Long-poll wait of each receive, at most 20 seconds on SQS.
    pub wait_time: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_messages: 10,
            wait_time: Duration::from_secs(20),
        }
    }
}

impl PollerConfig {
    /// The receive parameters of one cycle.
    pub fn receive_request(&self) -> ReceiveRequest {
        ReceiveRequest {
            max_messages: self.max_messages,
            wait_time: self.wait_time,
        }
    }
}

/// Counts of what happened in one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub received: usize,
    pub processed: usize,
    pub failed: usize,
    pub deleted: usize,
    pub delete_failures: usize,
}

/// Periodic queue poller.
///
/// Each cycle receives one batch and handles its messages one after another.
/// A message is deleted only after it has been archived; failed messages are
/// left on the queue for redelivery and never stop the rest of the batch.
///
/// Generic parameters:
/// - `R`: Queue receiver
/// - `O`: Object store the processor archives into
/// - `C`: Clock used by the archiver
/// - `HK`: Hook implementation for lifecycle events
pub struct Poller<R, O, C = SystemClock, HK = DefaultConsumerHook> {
    receiver: R,
    processor: Processor<O, C>,
    config: PollerConfig,
    hook: HK,
}

impl<R, O, C> Poller<R, O, C, DefaultConsumerHook>
where
    R: Receiver,
    O: ObjectStore,
    C: Clock,
{
    /// Create a new poller with the default hook implementation.
    pub fn new(receiver: R, processor: Processor<O, C>, config: PollerConfig) -> Self {
        Self {
            receiver,
            processor,
            config,
            hook: DefaultConsumerHook,
        }
    }
}

impl<R, O, C, HK> Poller<R, O, C, HK>
where
    R: Receiver,
    O: ObjectStore,
    C: Clock,
    HK: ConsumerHook,
{
    /// Replace the consumer hook while keeping all other generics unchanged.
    pub fn with_hook<HK2: ConsumerHook>(self, hook: HK2) -> Poller<R, O, C, HK2> {
        Poller {
            receiver: self.receiver,
            processor: self.processor,
            config: self.config,
            hook,
        }
    }

    /// The schedule and receive settings this poller runs with.
    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Run a single poll cycle.
    ///
    /// Only a failed receive is an error; per-message failures are reported
    /// through the hook and counted in the returned [`CycleReport`].
    #[tracing::instrument(skip_all)]
    pub async fn poll_once(&self) -> Result<CycleReport, TransportError> {
        let batch = self
            .receiver
            .receive(self.config.receive_request())
            .await
            .map_err(|e| {
                let error = TransportError::receiver(e.into());
                self.hook.on_receive_error(&error);
                error
            })?;

        if batch.is_empty() {
            self.hook.on_empty_batch();
            return Ok(CycleReport::default());
        }

        self.hook.on_batch_received(batch.len());

        let mut report = CycleReport {
            received: batch.len(),
            ..CycleReport::default()
        };
        for message in &batch {
            self.handle(message, &mut report).await;
        }

        Ok(report)
    }

    async fn handle(&self, message: &ReceivedMessage, report: &mut CycleReport) {
        let correlation_id = correlation_id_of(message);
        if correlation_id.is_unknown() {
            self.hook.on_missing_correlation_id(message);
        }

        match self.processor.process(message.body(), &correlation_id).await {
            Ok(key) => {
                report.processed += 1;
                self.hook.on_message_processed(message, &correlation_id, &key);

                match self.receiver.delete(message).await {
                    Ok(()) => {
                        report.deleted += 1;
                        self.hook.on_message_deleted(message, &correlation_id);
                    }
                    Err(e) => {
                        report.delete_failures += 1;
                        let error = TransportError::receiver(e.into());
                        self.hook.on_delete_error(message, &correlation_id, &error);
                    }
                }
            }
            Err(error) => {
                report.failed += 1;
                self.hook.on_message_failed(message, &correlation_id, &error);
            }
        }
    }

    /// Run poll cycles on every tick until `cancel` is triggered.
    ///
    /// A cycle that has started is always finished before the loop checks for
    /// cancellation again, so shutdown never abandons a half-handled batch.
    #[tracing::instrument(skip_all)]
    pub async fn run<T: Ticker>(self, mut ticker: T, cancel: CancellationToken) {
        self.hook.on_startup();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    // Receive errors are already reported; the next tick retries.
                    let _ = self.poll_once().await;
                }
            }
        }

        self.hook.on_shutdown();
    }

    /// Run poll cycles every `config.interval`, starting immediately.
    ///
    /// Ticks missed while a cycle overran are not made up: the next cycle
    /// starts one full interval after the late one, so cycles never overlap.
    pub async fn run_every(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.run(interval, cancel).await
    }
}
