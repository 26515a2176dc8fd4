//! Test doubles for the contactless reader.
//!
//! `ScriptedReader` replays a fixed event sequence into the bridge's
//! sink, so transaction flows can be exercised without hardware. Events
//! are replayed inline during `start`, which keeps tests deterministic;
//! the bridge's latch is armed before `start` is called, so inline
//! delivery is indistinguishable from asynchronous delivery.

use async_trait::async_trait;
use payflow_token::CardData;

use crate::reader::{ContactlessPort, EventSink, ReaderError, ReaderEvent};

/// A scripted stand-in for the native reader.
pub struct ScriptedReader {
    supported: bool,
    enabled: bool,
    script: Vec<ReaderEvent>,
}

impl ScriptedReader {
    /// Replay an arbitrary event script on every `start`.
    pub fn with_script(script: Vec<ReaderEvent>) -> Self {
        Self {
            supported: true,
            enabled: true,
            script,
        }
    }

    /// A full successful read: started, tag detected, card data.
    pub fn success(card: CardData) -> Self {
        Self::with_script(vec![
            ReaderEvent::SessionStarted,
            ReaderEvent::TagDetected,
            ReaderEvent::CardDataReady(card),
        ])
    }

    /// A session that fails at the hardware level after starting.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::with_script(vec![
            ReaderEvent::SessionStarted,
            ReaderEvent::ReadError {
                message: message.into(),
            },
        ])
    }

    /// A session that starts and then waits forever for a tap; only a
    /// stop will end it.
    pub fn hanging() -> Self {
        Self::with_script(vec![ReaderEvent::SessionStarted])
    }

    /// A platform without the contactless capability.
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            enabled: false,
            script: Vec::new(),
        }
    }

    /// Hardware present but the radio is switched off.
    pub fn disabled() -> Self {
        Self {
            supported: true,
            enabled: false,
            script: Vec::new(),
        }
    }
}

#[async_trait]
impl ContactlessPort for ScriptedReader {
    async fn is_supported(&self) -> bool {
        self.supported
    }

    async fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn start(&self, sink: EventSink) -> Result<(), ReaderError> {
        for event in &self.script {
            sink(event.clone());
        }
        Ok(())
    }

    async fn stop(&self) {}
}
