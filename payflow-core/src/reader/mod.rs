//! Contactless reader abstraction.
//!
//! The native reader (Android NFC module or a test double) sits behind
//! [`ContactlessPort`]. It reports events only through the sink handed
//! to `start`; [`bridge::ReaderBridge`] turns that into a typed,
//! subscribable stream and enforces the single-session invariant.
//!
//! Event kinds are a closed sum type shared by the bridge and the state
//! machine; there are no string event names anywhere.

mod bridge;

pub use bridge::{ReaderBridge, Subscription};

use async_trait::async_trait;
use payflow_token::CardData;
use std::sync::Arc;

/// Discrete events emitted during a read session.
///
/// For a given session events arrive in the order
/// `SessionStarted → [TagDetected] → (CardDataReady | ReadError) →
/// SessionStopped`, but `SessionStopped` may be omitted by the native
/// layer after a terminal event.
#[derive(Clone, Debug, PartialEq)]
pub enum ReaderEvent {
    SessionStarted,
    TagDetected,
    CardDataReady(CardData),
    SessionStopped,
    ReadError { message: String },
}

impl ReaderEvent {
    pub fn kind(&self) -> ReaderEventKind {
        match self {
            ReaderEvent::SessionStarted => ReaderEventKind::SessionStarted,
            ReaderEvent::TagDetected => ReaderEventKind::TagDetected,
            ReaderEvent::CardDataReady(_) => ReaderEventKind::CardDataReady,
            ReaderEvent::SessionStopped => ReaderEventKind::SessionStopped,
            ReaderEvent::ReadError { .. } => ReaderEventKind::ReadError,
        }
    }
}

/// Event kind, used as a subscription filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReaderEventKind {
    SessionStarted,
    TagDetected,
    CardDataReady,
    SessionStopped,
    ReadError,
}

/// Errors surfaced by the bridge and the underlying reader.
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    /// A read session is already active; wait for it to finish instead
    /// of retrying.
    #[error("a read session is already active")]
    AlreadyReading,

    /// The session ended without a card read or error.
    #[error("read session cancelled")]
    Cancelled,

    /// The native layer failed to start a session.
    #[error("failed to start read session: {0}")]
    StartFailed(String),

    /// Hardware-level read failure, message passed through from the
    /// native layer.
    #[error("card read failed: {0}")]
    Read(String),
}

/// Sink through which the native layer reports events back onto the
/// application side. The bridge never retries internally; one native
/// failure is one `ReadError` event.
pub type EventSink = Arc<dyn Fn(ReaderEvent) + Send + Sync>;

/// The native contactless reader capability.
///
/// Capability queries answer `false` rather than erroring on platforms
/// without the hardware. `start` must return promptly; the read itself
/// runs on a platform thread and reports back through the sink.
#[async_trait]
pub trait ContactlessPort: Send + Sync {
    async fn is_supported(&self) -> bool;
    async fn is_enabled(&self) -> bool;
    async fn start(&self, sink: EventSink) -> Result<(), ReaderError>;
    async fn stop(&self);
}
