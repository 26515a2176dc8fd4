//! Typed event bridge over the native contactless reader.
//!
//! The bridge owns the subscriber registry and the single-session guard.
//! `start_session` settles from the same terminal event the subscribers
//! observe, via a one-shot latch, so there is exactly one source of
//! truth for a session's outcome.
//!
//! # Thread safety
//!
//! Registry and latch use poisoned-lock recovery: a panicking handler
//! must not wedge the bridge for the rest of the process.

use payflow_token::CardData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::{ContactlessPort, EventSink, ReaderError, ReaderEvent, ReaderEventKind};

/// Handler invoked on event dispatch. Handlers must not block; they run
/// inline on the dispatching context.
pub type EventHandler = Arc<dyn Fn(&ReaderEvent) + Send + Sync>;

struct SubscriberEntry {
    id: u64,
    kind: ReaderEventKind,
    handler: EventHandler,
}

type SessionLatch = Mutex<Option<oneshot::Sender<Result<CardData, ReaderError>>>>;

struct BridgeInner {
    port: Arc<dyn ContactlessPort>,
    subscribers: RwLock<Vec<SubscriberEntry>>,
    next_id: AtomicU64,
    reading: AtomicBool,
    latch: SessionLatch,
}

impl BridgeInner {
    /// Notify matching subscribers, then settle the session latch on
    /// terminal events. Subscribers see the event before the awaiting
    /// caller does, so state transitions are already observable when
    /// `start_session` returns.
    fn dispatch(self: &Arc<Self>, event: ReaderEvent) {
        debug!(?event, "reader event");

        let handlers: Vec<EventHandler> = {
            let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
            subscribers
                .iter()
                .filter(|entry| entry.kind == event.kind())
                .map(|entry| entry.handler.clone())
                .collect()
        };
        for handler in handlers {
            handler(&event);
        }

        match &event {
            ReaderEvent::CardDataReady(card) => {
                self.reading.store(false, Ordering::SeqCst);
                self.settle(Ok(card.clone()));
            }
            ReaderEvent::ReadError { message } => {
                self.reading.store(false, Ordering::SeqCst);
                self.settle(Err(ReaderError::Read(message.clone())));
            }
            ReaderEvent::SessionStopped => {
                self.reading.store(false, Ordering::SeqCst);
                // Only settles when no terminal event arrived first.
                self.settle(Err(ReaderError::Cancelled));
            }
            _ => {}
        }
    }

    fn settle(&self, outcome: Result<CardData, ReaderError>) {
        let sender = self
            .latch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(tx) = sender {
            // Receiver may have been dropped by a caller that gave up.
            let _ = tx.send(outcome);
        }
    }
}

/// Process-wide adapter from the native reader to a typed event stream.
///
/// At most one logical session is open at a time; a second
/// `start_session` while one is active fails with
/// [`ReaderError::AlreadyReading`] instead of starting a concurrent
/// session.
pub struct ReaderBridge {
    inner: Arc<BridgeInner>,
}

impl ReaderBridge {
    pub fn new(port: Arc<dyn ContactlessPort>) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                port,
                subscribers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                reading: AtomicBool::new(false),
                latch: Mutex::new(None),
            }),
        }
    }

    /// Whether the platform has the contactless capability.
    pub async fn is_supported(&self) -> bool {
        self.inner.port.is_supported().await
    }

    /// Whether the contactless radio is enabled in system settings.
    pub async fn is_enabled(&self) -> bool {
        self.inner.port.is_enabled().await
    }

    /// Whether a read session is currently active.
    pub fn is_reading(&self) -> bool {
        self.inner.reading.load(Ordering::SeqCst)
    }

    /// Subscribe a handler to one event kind. The returned subscription
    /// unsubscribes idempotently; dropping it without unsubscribing
    /// leaves the handler registered.
    pub fn subscribe(
        &self,
        kind: ReaderEventKind,
        handler: impl Fn(&ReaderEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let mut subscribers = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner());
        subscribers.push(SubscriberEntry {
            id,
            kind,
            handler: Arc::new(handler),
        });
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Begin a foreground read session.
    ///
    /// The returned future settles from the same terminal event the
    /// subscribers receive: `CardDataReady` resolves it, `ReadError`
    /// rejects it, and a stop before either rejects with `Cancelled`.
    /// The authoritative outcome is still the event stream; this value
    /// is a convenience for call-site sequencing.
    pub async fn start_session(&self) -> Result<CardData, ReaderError> {
        if self.inner.reading.swap(true, Ordering::SeqCst) {
            warn!("start_session rejected: session already active");
            return Err(ReaderError::AlreadyReading);
        }

        let (tx, rx) = oneshot::channel();
        *self.inner.latch.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);

        // The sink holds only a weak reference: events arriving after the
        // bridge is gone are dropped instead of mutating freed state.
        let weak: Weak<BridgeInner> = Arc::downgrade(&self.inner);
        let sink: EventSink = Arc::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.dispatch(event);
            }
        });

        if let Err(err) = self.inner.port.start(sink).await {
            self.inner.reading.store(false, Ordering::SeqCst);
            self.inner.latch.lock().unwrap_or_else(|e| e.into_inner()).take();
            return Err(err);
        }

        match rx.await {
            Ok(outcome) => outcome,
            // Latch dropped without settling; treat as a cancelled session.
            Err(_) => Err(ReaderError::Cancelled),
        }
    }

    /// Stop the current session. Idempotent and safe from any state; the
    /// bridge synthesizes a `SessionStopped` dispatch when a session was
    /// active, so subscribers converge even if the native layer omits
    /// its own stop event. A new `start_session` may follow immediately.
    pub async fn stop_session(&self) {
        self.inner.port.stop().await;
        if self.inner.reading.load(Ordering::SeqCst) {
            self.inner.dispatch(ReaderEvent::SessionStopped);
        }
    }
}

/// Disposer for one subscription. `unsubscribe` is idempotent and safe
/// to call after the bridge itself is gone.
pub struct Subscription {
    id: u64,
    inner: Weak<BridgeInner>,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut subscribers = inner.subscribers.write().unwrap_or_else(|e| e.into_inner());
            subscribers.retain(|entry| entry.id != self.id);
        }
    }
}
