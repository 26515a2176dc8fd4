//! NFC transaction state machine.
//!
//! `NfcController` owns a single status value, reacts to bridge events
//! and controller calls, and derives `card_data` / `transaction_result`
//! on success. Event handlers never panic and never propagate errors:
//! every failure becomes a recorded message plus `status = Error`.
//!
//! Terminal stability: once `Success` or `Error` is reached, a late
//! `SessionStopped` from the native layer does not downgrade the status
//! to `Cancelled`.

use payflow_token::{digest, now_millis, CardData, TransactionResult, TransactionStatus};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock, Weak};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::reader::{ReaderBridge, ReaderError, ReaderEvent, ReaderEventKind, Subscription};

/// State machine status. Exactly one is active at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NfcStatus {
    Idle,
    Waiting,
    Reading,
    Detected,
    Processing,
    Success,
    Error,
    Cancelled,
}

impl NfcStatus {
    /// Terminal states; only `reset_state` leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Cancelled)
    }

    /// A read session is in flight.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Reading | Self::Waiting | Self::Detected | Self::Processing
        )
    }
}

/// Errors returned from controller operations (never from event
/// handlers).
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Hardware capability absent; not retryable without a different
    /// device or settings change.
    #[error("NFC is not supported on this device")]
    UnsupportedDevice,

    /// Hardware present but the radio is switched off.
    #[error("NFC is disabled in system settings")]
    NfcDisabled,

    /// A session is in flight; do not retry until it ends.
    #[error("a card read session is already active")]
    AlreadyReading,

    /// `reset_state` was called mid-session; stop card reading first.
    #[error("a session is active; stop card reading before resetting")]
    SessionActive,

    /// The supplied token decoded but failed verification (expired or
    /// signature mismatch).
    #[error("payment token failed verification")]
    InvalidToken,

    #[error(transparent)]
    Token(#[from] payflow_token::TokenError),

    #[error(transparent)]
    Reader(#[from] ReaderError),
}

/// Observable controller state after each transition.
#[derive(Clone, Debug, Serialize)]
pub struct ControllerSnapshot {
    pub status: NfcStatus,
    pub error: Option<String>,
    pub card_data: Option<CardData>,
    pub transaction_result: Option<TransactionResult>,
}

struct ControllerState {
    status: NfcStatus,
    error: Option<String>,
    card_data: Option<CardData>,
    transaction_result: Option<TransactionResult>,
    active_transaction_id: Option<String>,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            status: NfcStatus::Idle,
            error: None,
            card_data: None,
            transaction_result: None,
            active_transaction_id: None,
        }
    }
}

/// The NFC transaction controller.
///
/// Owns the bridge subscriptions for its lifetime; dropping the
/// controller unsubscribes them, so late native events cannot mutate
/// state that no longer has an owner.
pub struct NfcController {
    bridge: Arc<ReaderBridge>,
    codec: payflow_token::TokenCodec,
    state: Arc<RwLock<ControllerState>>,
    subscriptions: Vec<Subscription>,
}

impl NfcController {
    pub fn new(bridge: Arc<ReaderBridge>, codec: payflow_token::TokenCodec) -> Self {
        let state = Arc::new(RwLock::new(ControllerState::default()));
        let subscriptions = Self::wire_handlers(&bridge, &state);
        Self {
            bridge,
            codec,
            state,
            subscriptions,
        }
    }

    fn wire_handlers(
        bridge: &ReaderBridge,
        state: &Arc<RwLock<ControllerState>>,
    ) -> Vec<Subscription> {
        let mut subs = Vec::new();
        for kind in [
            ReaderEventKind::SessionStarted,
            ReaderEventKind::TagDetected,
            ReaderEventKind::CardDataReady,
            ReaderEventKind::ReadError,
            ReaderEventKind::SessionStopped,
        ] {
            let weak: Weak<RwLock<ControllerState>> = Arc::downgrade(state);
            subs.push(bridge.subscribe(kind, move |event| {
                // Owning context may be gone; drop the event instead of
                // touching freed state.
                if let Some(state) = weak.upgrade() {
                    handle_event(&state, event);
                }
            }));
        }
        subs
    }

    /// Build a signed payment token for the upcoming transaction.
    pub fn create_payment_token(
        &self,
        merchant: &payflow_token::MerchantData,
        draft: payflow_token::TransactionDraft,
    ) -> Result<String, ControllerError> {
        Ok(self.codec.generate(merchant, draft)?)
    }

    /// Start a card-read session with no associated token.
    pub async fn start_card_reading(&self) -> Result<ControllerSnapshot, ControllerError> {
        self.begin_session(None).await
    }

    /// Decode and verify a payment token, then start a card-read session
    /// associated with it, so the eventual `transaction_result` carries
    /// the token's transaction id.
    pub async fn process_payment_with_token(
        &self,
        serialized: &str,
    ) -> Result<ControllerSnapshot, ControllerError> {
        let decoded = self.codec.decode(serialized)?;
        if !self.codec.verify(&decoded) {
            warn!(token_id = %decoded.token.token_id, "rejecting unverified token");
            return Err(ControllerError::InvalidToken);
        }
        self.begin_session(Some(decoded.transaction().id.clone()))
            .await
    }

    async fn begin_session(
        &self,
        transaction_id: Option<String>,
    ) -> Result<ControllerSnapshot, ControllerError> {
        if !self.bridge.is_supported().await {
            return Err(ControllerError::UnsupportedDevice);
        }
        if !self.bridge.is_enabled().await {
            return Err(ControllerError::NfcDisabled);
        }

        {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            if state.status.is_active() {
                return Err(ControllerError::AlreadyReading);
            }
            state.status = NfcStatus::Reading;
            state.error = None;
            state.card_data = None;
            state.transaction_result = None;
            state.active_transaction_id = transaction_id;
        }
        info!("card reading started");

        match self.bridge.start_session().await {
            Ok(_card) => Ok(self.snapshot()),
            Err(err @ (ReaderError::Read(_) | ReaderError::Cancelled)) => {
                // State already transitioned via the event stream; the
                // rejection here is informational.
                Err(err.into())
            }
            Err(err) => {
                // No events fired; record the failure ourselves.
                let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
                state.status = NfcStatus::Error;
                state.error = Some(err.to_string());
                Err(err.into())
            }
        }
    }

    /// Stop the current session. Safe from any state, including before a
    /// session has started; the bridge can start a new session
    /// immediately afterwards.
    pub async fn stop_card_reading(&self) {
        self.bridge.stop_session().await;
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.status.is_active() {
            state.status = NfcStatus::Cancelled;
        }
    }

    /// Return to `Idle`, clearing card data, result, and error.
    ///
    /// Valid from terminal states; a no-op from `Idle`. Mid-session
    /// calls are rejected with [`ControllerError::SessionActive`] so the
    /// caller stops the session explicitly first.
    pub fn reset_state(&self) -> Result<(), ControllerError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.status.is_active() {
            return Err(ControllerError::SessionActive);
        }
        *state = ControllerState::default();
        Ok(())
    }

    /// Current status.
    pub fn status(&self) -> NfcStatus {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .status
    }

    /// Observable state; consistent immediately after each transition.
    pub fn snapshot(&self) -> ControllerSnapshot {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        ControllerSnapshot {
            status: state.status,
            error: state.error.clone(),
            card_data: state.card_data.clone(),
            transaction_result: state.transaction_result.clone(),
        }
    }
}

impl Drop for NfcController {
    fn drop(&mut self) {
        for sub in &self.subscriptions {
            sub.unsubscribe();
        }
    }
}

fn handle_event(state: &RwLock<ControllerState>, event: &ReaderEvent) {
    let mut state = state.write().unwrap_or_else(|e| e.into_inner());
    let status = state.status;

    match event {
        ReaderEvent::SessionStarted => {
            if status == NfcStatus::Reading {
                state.status = NfcStatus::Waiting;
            }
        }
        ReaderEvent::TagDetected => {
            if matches!(status, NfcStatus::Waiting | NfcStatus::Reading) {
                state.status = NfcStatus::Detected;
            }
        }
        ReaderEvent::CardDataReady(card) => {
            if status.is_active() && state.card_data.is_none() {
                let result = synthesize_result(state.active_transaction_id.take(), card);
                debug!(transaction_id = %result.transaction_id, "card read succeeded");
                state.card_data = Some(card.clone());
                state.transaction_result = Some(result);
                state.status = NfcStatus::Success;
            }
        }
        ReaderEvent::ReadError { message } => {
            if !status.is_terminal() {
                let message = if message.is_empty() {
                    "card read failed".to_string()
                } else {
                    message.clone()
                };
                warn!(%message, "card read failed");
                state.error = Some(message);
                state.status = NfcStatus::Error;
            }
        }
        ReaderEvent::SessionStopped => {
            // Success and Error are self-terminating; a late stop must
            // not downgrade them. Narrower than "anything but
            // success/error": a stop with no session in flight leaves
            // Idle and Cancelled untouched rather than marking an idle
            // controller cancelled.
            if status.is_active() {
                state.status = NfcStatus::Cancelled;
            }
        }
    }
}

/// Build the transaction result for a successful read. The transaction
/// id comes from the associated token when there is one.
fn synthesize_result(transaction_id: Option<String>, card: &CardData) -> TransactionResult {
    let transaction_id = transaction_id.unwrap_or_else(|| format!("txn_{}", Uuid::new_v4()));
    let auth_code = digest::sha256_hex(&format!("{}:{}", transaction_id, card.card_number))
        [..6]
        .to_uppercase();
    TransactionResult {
        transaction_id,
        status: TransactionStatus::Success,
        auth_code: Some(auth_code),
        payment_method: Some("nfc".to_string()),
        timestamp: now_millis(),
    }
}
