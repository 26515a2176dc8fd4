//! Charge/share flow.
//!
//! Thin glue between the token codec and the charge store: turns a
//! charge into a shareable pay link or an embeddable token payload, and
//! resolves an inbound payload (deep link, QR scan, pasted text) back
//! into charge details. No payment proceeds from here without the token
//! passing verification.

use payflow_token::{MerchantData, TokenCodec, TokenError, TransactionDraft};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::store::{Charge, ChargeStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// The payload is neither a pay link nor a serialized token.
    #[error("shared payload not recognized")]
    UnrecognizedPayload,

    /// The token decoded but has passed its expiry.
    #[error("payment token expired")]
    TokenExpired,

    /// The token decoded but its signature does not verify.
    #[error("payment token failed verification")]
    InvalidToken,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Where a resolved payload came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SharedSource {
    /// A `https://<host>/pay/<accessToken>` link resolved via the store.
    PayLink,
    /// A serialized token embedded directly in the payload.
    EmbeddedToken,
}

/// Charge details resolved from a shared payload.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeDetails {
    pub transaction_id: String,
    pub merchant_id: String,
    pub merchant_name: String,
    pub amount: f64,
    pub description: String,
    pub currency: String,
    pub source: SharedSource,
}

/// Produces shareable payloads and resolves inbound ones.
pub struct ShareFlow {
    store: Arc<dyn ChargeStore>,
    codec: TokenCodec,
    host: String,
}

impl ShareFlow {
    pub fn new(store: Arc<dyn ChargeStore>, codec: TokenCodec, host: impl Into<String>) -> Self {
        Self {
            store,
            codec,
            host: host.into(),
        }
    }

    /// Pay link for a stored charge, suitable for messaging apps.
    pub fn share_charge_link(&self, charge: &Charge) -> String {
        format!("https://{}/pay/{}", self.host, charge.access_token)
    }

    /// Serialized token payload, suitable for a QR code.
    pub fn share_token_payload(
        &self,
        merchant: &MerchantData,
        draft: TransactionDraft,
    ) -> Result<String, FlowError> {
        Ok(self.codec.generate(merchant, draft)?)
    }

    /// Resolve an inbound shared payload into charge details.
    ///
    /// Accepts either a pay link (looked up in the charge store by
    /// access token) or a serialized payment token (decoded and
    /// verified; expired and tampered tokens are told apart so the UI
    /// can message them differently).
    pub async fn resolve_shared_token(&self, raw: &str) -> Result<ChargeDetails, FlowError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(FlowError::UnrecognizedPayload);
        }

        if raw.starts_with("https://") || raw.starts_with("http://") {
            let access_token = extract_access_token(raw).ok_or(FlowError::UnrecognizedPayload)?;
            debug!(%access_token, "resolving pay link");
            let charge = self.store.get_charge_by_token(access_token).await?;
            return Ok(details_from_charge(&charge));
        }

        let decoded = self.codec.decode(raw)?;
        if !self.codec.verify(&decoded) {
            if decoded.is_expired_at(payflow_token::now_millis()) {
                return Err(FlowError::TokenExpired);
            }
            return Err(FlowError::InvalidToken);
        }

        let txn = decoded.transaction();
        Ok(ChargeDetails {
            transaction_id: txn.id.clone(),
            merchant_id: decoded.merchant.id.clone(),
            merchant_name: decoded.merchant.name.clone(),
            amount: txn.amount,
            description: txn.description.clone(),
            currency: txn.currency.clone(),
            source: SharedSource::EmbeddedToken,
        })
    }
}

fn details_from_charge(charge: &Charge) -> ChargeDetails {
    ChargeDetails {
        transaction_id: charge.id.clone(),
        merchant_id: charge.merchant_id.clone(),
        merchant_name: charge.merchant_name.clone(),
        amount: charge.amount,
        description: charge.description.clone(),
        currency: charge.currency.clone(),
        source: SharedSource::PayLink,
    }
}

/// Pull the access token out of a `/pay/<token>` path, ignoring any
/// query string or fragment.
fn extract_access_token(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("/pay/")?;
    let token = rest
        .split(['?', '#', '/'])
        .next()
        .unwrap_or(rest);
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
