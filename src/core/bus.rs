//! In-process event bus
//!
//! `publish` delivers on the caller's task, to every handler of the topic in
//! subscription order. A handler answering `RetryAfter(d)` is re-invoked with
//! the same event after sleeping `d`, until it succeeds or fails; only then
//! does the next handler run. Failures and panics are logged and skip to the
//! next handler.
//!
//! # Example
//! ```ignore
//! let bus = EventBus::new();
//! bus.subscribe(topics::COIN_CREATED, |event: Event| async move {
//!     tracing::info!(?event, "coin created");
//!     HandlerOutcome::Handled
//! });
//! bus.publish(Event::new(&payload)?).await;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use tracing::{debug, error, warn};

use super::events::Event;
use crate::error::AppError;

/// Result of one handler invocation
#[derive(Debug)]
pub enum HandlerOutcome {
    Handled,
    /// Delivery to this handler stops; other handlers still run
    Failed(AppError),
    /// Redeliver the same event to the same handler after the delay
    RetryAfter(Duration),
}

impl From<crate::error::Result<()>> for HandlerOutcome {
    fn from(result: crate::error::Result<()>) -> Self {
        match result {
            Ok(()) => HandlerOutcome::Handled,
            Err(e) => match e.retry_after() {
                Some(delay) => HandlerOutcome::RetryAfter(delay),
                None => HandlerOutcome::Failed(e),
            },
        }
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> HandlerOutcome;
}

#[async_trait]
impl<F, Fut> EventHandler for F
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerOutcome> + Send + 'static,
{
    async fn handle(&self, event: &Event) -> HandlerOutcome {
        (self)(event.clone()).await
    }
}

type HandlerList = Vec<Arc<dyn EventHandler>>;

#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<&'static str, HandlerList>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<H>(&self, topic: &'static str, handler: H)
    where
        H: EventHandler + 'static,
    {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        handlers.entry(topic).or_default().push(Arc::new(handler));
        debug!(topic, "Handler subscribed");
    }

    #[cfg(test)]
    pub(crate) fn handler_count(&self, topic: &str) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(topic)
            .map_or(0, Vec::len)
    }

    pub async fn publish(&self, event: Event) {
        // Snapshot so handlers can publish or subscribe while we deliver
        let handlers: HandlerList = self
            .handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(event.topic())
            .cloned()
            .unwrap_or_default();

        debug!(topic = event.topic(), handlers = handlers.len(), "Publishing event");

        for (index, handler) in handlers.iter().enumerate() {
            deliver(handler.as_ref(), &event, index).await;
        }
    }
}

async fn deliver(handler: &dyn EventHandler, event: &Event, index: usize) {
    loop {
        let outcome = AssertUnwindSafe(handler.handle(event)).catch_unwind().await;
        match outcome {
            Ok(HandlerOutcome::Handled) => return,
            Ok(HandlerOutcome::RetryAfter(delay)) => {
                warn!(
                    topic = event.topic(),
                    handler = index,
                    delay_ms = delay.as_millis() as u64,
                    "Handler asked for redelivery"
                );
                tokio::time::sleep(delay).await;
            }
            Ok(HandlerOutcome::Failed(e)) => {
                error!(topic = event.topic(), handler = index, error = %e, "Event handler failed");
                return;
            }
            Err(_) => {
                error!(topic = event.topic(), handler = index, "Event handler panicked");
                return;
            }
        }
    }
}
