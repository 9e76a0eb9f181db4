//! In-process event bus
//!
//! Producers [`publish`](EventBus::publish) into an unbounded FIFO queue; a
//! single dispatch loop ([`run`](EventBus::run)) takes one event at a time
//! and awaits every subscriber in registration order before moving on.
//!
//! ```text
//! producer ─┐
//! producer ─┼─► unbounded queue ─► run() ─► subscriber 1 ─► subscriber 2 ─► ...
//! producer ─┘
//! ```
//!
//! A slow subscriber therefore stalls delivery of every later event to every
//! subscriber. Failure handling follows the configured [`DispatchPolicy`].

use crate::config::{BusConfig, DispatchPolicy};
use crate::error::BusError;
use crate::event::Event;
use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::{error, info};

/// A consumer registered on the bus
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Handle one event. Returning an error is a dispatch failure.
    async fn on_event(&self, event: &Event) -> Result<()>;
}

/// Adapts an async closure into a [`Subscriber`]
struct FnSubscriber<F> {
    name: String,
    handler: F,
}

#[async_trait]
impl<F, Fut> Subscriber for FnSubscriber<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_event(&self, event: &Event) -> Result<()> {
        (self.handler)(event.clone()).await
    }
}

/// Ordered, unbounded event queue with fan-out dispatch
pub struct EventBus {
    config: BusConfig,
    sender: mpsc::UnboundedSender<Event>,
    // Taken by the dispatch loop; `None` once `run()` started.
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Event>>>,
    subscribers: RwLock<Vec<Arc<dyn Subscriber>>>,
    published: AtomicU64,
    dispatched: AtomicU64,
    failed: AtomicU64,
}

impl EventBus {
    /// Create a bus with the default fail-fast policy
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    pub fn with_config(config: BusConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            config,
            sender,
            receiver: Mutex::new(Some(receiver)),
            subscribers: RwLock::new(Vec::new()),
            published: AtomicU64::new(0),
            dispatched: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Register a subscriber. Registration order is dispatch order.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        info!(subscriber = subscriber.name(), "subscriber registered");
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscriber);
    }

    /// Register an async closure as a subscriber
    pub fn subscribe_fn<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.subscribe(Arc::new(FnSubscriber {
            name: name.into(),
            handler,
        }));
    }

    /// Queue an event for dispatch. Returns once queued, not once handled.
    ///
    /// The event is counted before it is queued, so a reader that loads
    /// [`dispatched_count`](Self::dispatched_count) before
    /// [`published_count`](Self::published_count) never sees more dispatched
    /// than published.
    ///
    /// # Errors
    ///
    /// [`BusError::Closed`] once the dispatch loop has terminated.
    pub fn publish(&self, event: Event) -> Result<(), BusError> {
        self.published.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(event).is_err() {
            self.published.fetch_sub(1, Ordering::SeqCst);
            return Err(BusError::Closed);
        }
        Ok(())
    }

    /// Dispatch loop. Runs until a fatal subscriber failure.
    ///
    /// Cancel by dropping the future (or aborting its task); queued events
    /// are discarded.
    ///
    /// # Errors
    ///
    /// [`BusError::AlreadyRunning`] if another loop owns the queue, and
    /// [`BusError::Subscriber`] under [`DispatchPolicy::FailFast`].
    pub async fn run(&self) -> Result<(), BusError> {
        let mut receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(BusError::AlreadyRunning)?;

        info!(
            subscribers = self.subscriber_count(),
            policy = ?self.config.dispatch_policy,
            "event bus dispatch loop started"
        );

        while let Some(event) = receiver.recv().await {
            self.dispatch(&event).await?;
        }
        Ok(())
    }

    async fn dispatch(&self, event: &Event) -> Result<(), BusError> {
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for subscriber in &subscribers {
            let Err(source) = subscriber.on_event(event).await else {
                continue;
            };
            self.failed.fetch_add(1, Ordering::Relaxed);
            let detail = format!("{source:#}");
            error!(
                subscriber = subscriber.name(),
                event_type = %event.event_type(),
                error = %detail,
                "subscriber failed"
            );
            if self.config.dispatch_policy == DispatchPolicy::FailFast {
                return Err(BusError::Subscriber {
                    subscriber: subscriber.name().to_string(),
                    event_type: event.event_type(),
                    source,
                });
            }
        }

        self.dispatched.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn dispatch_policy(&self) -> DispatchPolicy {
        self.config.dispatch_policy
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Events accepted by `publish`
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }

    /// Events the dispatch loop finished delivering
    pub fn dispatched_count(&self) -> u64 {
        self.dispatched.load(Ordering::SeqCst)
    }

    /// Individual subscriber failures
    pub fn failed_dispatch_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("policy", &self.config.dispatch_policy)
            .field("subscribers", &self.subscriber_count())
            .field("published", &self.published_count())
            .field("dispatched", &self.dispatched_count())
            .finish()
    }
}
