use crate::capture::ExchangeReady;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("no consumer is attached")]
    NoConsumer,
    #[error("consumer channel is full")]
    ChannelFull,
    #[error("consumer channel is closed")]
    ChannelClosed,
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook answered with status {0}")]
    Status(u16),
}

/// Downstream consumer of ready exchanges.
#[async_trait]
pub trait ExchangeSink: Send + Sync {
    async fn deliver(&self, ready: &ExchangeReady) -> Result<(), DeliveryError>;

    fn name(&self) -> &'static str;
}

/// In-process channel that a consumer may attach to at any time.
///
/// Until a consumer attaches, delivery fails with [`DeliveryError::NoConsumer`]
/// and the emitter's retry/persist path takes over.
#[derive(Debug)]
pub struct ChannelSink {
    capacity: usize,
    sender: Mutex<Option<mpsc::Sender<ExchangeReady>>>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            sender: Mutex::new(None),
        }
    }

    /// Attach a consumer, replacing any previous one.
    pub fn attach(&self) -> mpsc::Receiver<ExchangeReady> {
        let (tx, rx) = mpsc::channel(self.capacity);
        *self.sender.lock() = Some(tx);
        rx
    }

    pub fn detach(&self) {
        self.sender.lock().take();
    }

    pub fn is_attached(&self) -> bool {
        self.sender
            .lock()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }
}

#[async_trait]
impl ExchangeSink for ChannelSink {
    async fn deliver(&self, ready: &ExchangeReady) -> Result<(), DeliveryError> {
        let mut sender = self.sender.lock();
        let Some(tx) = sender.as_ref() else {
            return Err(DeliveryError::NoConsumer);
        };
        match tx.try_send(ready.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DeliveryError::ChannelFull),
            Err(TrySendError::Closed(_)) => {
                sender.take();
                Err(DeliveryError::ChannelClosed)
            }
        }
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

/// POSTs each event as JSON.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl ExchangeSink for WebhookSink {
    async fn deliver(&self, ready: &ExchangeReady) -> Result<(), DeliveryError> {
        let response = self.client.post(&self.url).json(ready).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Status(status.as_u16()))
        }
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

/// Writes each event to the log. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl ExchangeSink for LogSink {
    async fn deliver(&self, ready: &ExchangeReady) -> Result<(), DeliveryError> {
        info!(
            schema_id = %ready.schema_id,
            correlation_key = %ready.correlation_key,
            revision = ready.revision,
            state = ready.state.as_str(),
            status = ready.response.as_ref().map(|r| r.status),
            "Exchange ready"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
