//! Payment token model and codec.
//!
//! A `PaymentToken` carries merchant identity (sealed), transaction
//! details, an expiry, and a signature over the canonical payload. The
//! wire format is URL-encoded JSON, round-trippable through
//! `decode(generate(..))` and verifiable by any holder of the shared
//! secret.
//!
//! `decode` and `verify` are deliberately separate: a caller may inspect
//! a decoded token before deciding whether to trust it, but nothing
//! should proceed to payment without `verify` returning true.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::digest;
use crate::errors::TokenError;
use crate::seal::SealContext;

/// Default token time-to-live: 15 minutes.
const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

/// Current Unix timestamp in milliseconds.
///
/// Falls back to 0 if system time is before the epoch.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Shared signing secret. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret(String);

impl SharedSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

/// Identifies the payee. Immutable once embedded in a token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantData {
    pub id: String,
    pub name: String,
    pub document: String,
    pub account_id: String,
    pub merchant_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<String>,
}

/// Transaction details as embedded in a token. `timestamp` is assigned
/// at token-creation time, never by the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionData {
    pub id: String,
    pub amount: f64,
    pub description: String,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Unix epoch milliseconds, set by the codec.
    pub timestamp: i64,
}

/// Caller-supplied transaction details (everything but the timestamp).
#[derive(Clone, Debug)]
pub struct TransactionDraft {
    pub id: String,
    pub amount: f64,
    pub description: String,
    pub currency: String,
    pub reference_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl TransactionDraft {
    pub fn new(
        id: impl Into<String>,
        amount: f64,
        description: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            amount,
            description: description.into(),
            currency: currency.into(),
            reference_id: None,
            metadata: None,
        }
    }

    pub fn with_reference_id(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    fn into_transaction_data(self, timestamp: i64) -> TransactionData {
        TransactionData {
            id: self.id,
            amount: self.amount,
            description: self.description,
            currency: self.currency,
            reference_id: self.reference_id,
            metadata: self.metadata,
            timestamp,
        }
    }
}

/// A signed, time-bound payment token as it travels on the wire.
///
/// `merchant_data` is the sealed (AES-256-GCM, hex) merchant block; the
/// clear struct is only available through [`DecodedToken`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentToken {
    pub token_id: String,
    pub signature: String,
    /// Creation time, Unix epoch milliseconds.
    pub timestamp: i64,
    /// `timestamp + TTL`, Unix epoch milliseconds.
    pub expires_at: i64,
    pub merchant_data: String,
    pub transaction_data: TransactionData,
}

/// A decoded token plus its unsealed merchant block.
///
/// Decoding proves nothing: call [`TokenCodec::verify`] before trusting
/// the contents.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedToken {
    pub token: PaymentToken,
    pub merchant: MerchantData,
}

impl DecodedToken {
    pub fn transaction(&self) -> &TransactionData {
        &self.token.transaction_data
    }

    /// Whether the token has passed its expiry at `now_ms`. Exposed
    /// separately from verification so a caller can tell "expired" apart
    /// from "tampered" when building a user-facing message.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms > self.token.expires_at
    }
}

/// Token lifetime policy. One constant, one place.
#[derive(Clone, Copy, Debug)]
pub struct TokenPolicy {
    pub ttl: Duration,
}

impl TokenPolicy {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl }
    }
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL }
    }
}

/// Canonical signing payload. Field declaration order IS the canonical
/// JSON order; both signer and verifier serialize this exact shape.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignaturePayload<'a> {
    token_id: &'a str,
    timestamp: i64,
    expires_at: i64,
    merchant_data: &'a str,
    transaction_data: &'a TransactionData,
}

/// Builds, decodes, and verifies payment tokens under a shared secret.
pub struct TokenCodec {
    secret: SharedSecret,
    seal: SealContext,
    policy: TokenPolicy,
}

impl TokenCodec {
    pub fn new(secret: SharedSecret, policy: TokenPolicy) -> Result<Self, TokenError> {
        let seal = SealContext::from_secret(secret.as_str())?;
        Ok(Self {
            secret,
            seal,
            policy,
        })
    }

    pub fn with_default_policy(secret: SharedSecret) -> Result<Self, TokenError> {
        Self::new(secret, TokenPolicy::default())
    }

    pub fn policy(&self) -> TokenPolicy {
        self.policy
    }

    /// Build and sign a token, returning its URL-encoded JSON form.
    ///
    /// Assigns `timestamp = now`, `expires_at = now + ttl`, derives the
    /// token id from merchant id, transaction id and a creation nonce,
    /// and seals the merchant block before signing.
    pub fn generate(
        &self,
        merchant: &MerchantData,
        draft: TransactionDraft,
    ) -> Result<String, TokenError> {
        self.generate_at(merchant, draft, now_millis())
    }

    /// `generate` with an explicit clock, for deterministic tests.
    pub fn generate_at(
        &self,
        merchant: &MerchantData,
        draft: TransactionDraft,
        now_ms: i64,
    ) -> Result<String, TokenError> {
        if merchant.id.is_empty() {
            return Err(TokenError::Generation(
                "merchant id must not be empty".to_string(),
            ));
        }
        if draft.id.is_empty() {
            return Err(TokenError::Generation(
                "transaction id must not be empty".to_string(),
            ));
        }
        if !(draft.amount > 0.0) {
            return Err(TokenError::Generation(format!(
                "amount must be positive, got {}",
                draft.amount
            )));
        }

        let timestamp = now_ms;
        let expires_at = timestamp + self.policy.ttl.as_millis() as i64;

        let nonce = creation_nonce(timestamp);
        let token_id = digest::token_id(&merchant.id, &draft.id, nonce);

        let merchant_json = serde_json::to_string(merchant)
            .map_err(|e| TokenError::Generation(e.to_string()))?;
        let sealed_merchant = self.seal.seal(merchant_json.as_bytes())?;

        let transaction_data = draft.into_transaction_data(timestamp);
        let signature = self.sign(
            &token_id,
            timestamp,
            expires_at,
            &sealed_merchant,
            &transaction_data,
        )?;

        let token = PaymentToken {
            token_id,
            signature,
            timestamp,
            expires_at,
            merchant_data: sealed_merchant,
            transaction_data,
        };

        let json =
            serde_json::to_string(&token).map_err(|e| TokenError::Generation(e.to_string()))?;
        debug!(token_id = %token.token_id, expires_at, "generated payment token");
        Ok(urlencoding::encode(&json).into_owned())
    }

    /// URL-decode, JSON-parse, and unseal a serialized token.
    pub fn decode(&self, serialized: &str) -> Result<DecodedToken, TokenError> {
        let json = urlencoding::decode(serialized)
            .map_err(|e| TokenError::Decode(format!("invalid URL encoding: {}", e)))?;
        let token: PaymentToken = serde_json::from_str(&json)?;

        let merchant_json = self.seal.unseal(&token.merchant_data)?;
        let merchant: MerchantData = serde_json::from_slice(&merchant_json)?;

        Ok(DecodedToken { token, merchant })
    }

    /// Verify expiry and signature against the current clock.
    ///
    /// Fails closed: returns `false` on any mismatch, never errors.
    /// Side-effect-free and safe to call repeatedly.
    pub fn verify(&self, decoded: &DecodedToken) -> bool {
        self.verify_at(decoded, now_millis())
    }

    /// `verify` with an explicit clock, for deterministic tests.
    pub fn verify_at(&self, decoded: &DecodedToken, now_ms: i64) -> bool {
        let token = &decoded.token;
        if decoded.is_expired_at(now_ms) {
            warn!(token_id = %token.token_id, expires_at = token.expires_at, "token expired");
            return false;
        }

        let expected = match self.sign(
            &token.token_id,
            token.timestamp,
            token.expires_at,
            &token.merchant_data,
            &token.transaction_data,
        ) {
            Ok(sig) => sig,
            Err(_) => return false,
        };

        let valid = expected == token.signature;
        if !valid {
            warn!(token_id = %token.token_id, "token signature mismatch");
        }
        valid
    }

    fn sign(
        &self,
        token_id: &str,
        timestamp: i64,
        expires_at: i64,
        merchant_data: &str,
        transaction_data: &TransactionData,
    ) -> Result<String, TokenError> {
        let payload = SignaturePayload {
            token_id,
            timestamp,
            expires_at,
            merchant_data,
            transaction_data,
        };
        let canonical =
            serde_json::to_string(&payload).map_err(|e| TokenError::Generation(e.to_string()))?;
        Ok(digest::signature_hex(&canonical, self.secret.as_str()))
    }
}

/// Creation-time nonce: wall clock mixed with random bits, so two tokens
/// for the same merchant/transaction in the same millisecond still get
/// distinct ids.
fn creation_nonce(now_ms: i64) -> u64 {
    let random: u32 = rand::random();
    (now_ms as u64) ^ ((random as u64) << 32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::with_default_policy(SharedSecret::new("unit-test-secret")).unwrap()
    }

    fn merchant() -> MerchantData {
        MerchantData {
            id: "M1".to_string(),
            name: "Shop".to_string(),
            document: "123".to_string(),
            account_id: "A1".to_string(),
            merchant_key: "K1".to_string(),
            certificate_id: None,
        }
    }

    fn draft() -> TransactionDraft {
        TransactionDraft::new("T1", 50.0, "Coffee", "BRL")
    }

    #[test]
    fn test_generate_requires_merchant_id() {
        let mut m = merchant();
        m.id.clear();
        let err = codec().generate(&m, draft()).unwrap_err();
        assert!(matches!(err, TokenError::Generation(_)));
    }

    #[test]
    fn test_generate_requires_positive_amount() {
        let c = codec();
        let mut d = draft();
        d.amount = 0.0;
        assert!(c.generate(&merchant(), d).is_err());

        let mut d = draft();
        d.amount = -1.0;
        assert!(c.generate(&merchant(), d).is_err());

        let mut d = draft();
        d.amount = f64::NAN;
        assert!(c.generate(&merchant(), d).is_err());
    }

    #[test]
    fn test_timestamp_assigned_by_codec() {
        let c = codec();
        let serialized = c.generate_at(&merchant(), draft(), 1_000_000).unwrap();
        let decoded = c.decode(&serialized).unwrap();
        assert_eq!(decoded.token.timestamp, 1_000_000);
        assert_eq!(decoded.transaction().timestamp, 1_000_000);
        assert_eq!(
            decoded.token.expires_at,
            1_000_000 + TokenPolicy::default().ttl.as_millis() as i64
        );
    }

    #[test]
    fn test_token_ids_distinct_per_generation() {
        let c = codec();
        let t1 = c.decode(&c.generate(&merchant(), draft()).unwrap()).unwrap();
        let t2 = c.decode(&c.generate(&merchant(), draft()).unwrap()).unwrap();
        assert_ne!(t1.token.token_id, t2.token.token_id);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let c = codec();
        assert!(matches!(
            c.decode("%7Bnot-json"),
            Err(TokenError::Decode(_))
        ));
        assert!(c.decode("plain text").is_err());
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        let c = codec();
        let partial = urlencoding::encode("{\"tokenId\":\"abc\"}").into_owned();
        assert!(c.decode(&partial).is_err());
    }

    #[test]
    fn test_verify_rejects_foreign_secret() {
        let ours = codec();
        let theirs =
            TokenCodec::with_default_policy(SharedSecret::new("other-secret")).unwrap();
        let serialized = ours.generate(&merchant(), draft()).unwrap();
        // Different seal key: decode itself fails before verify can run.
        assert!(theirs.decode(&serialized).is_err());
    }

    #[test]
    fn test_wire_field_names() {
        let c = codec();
        let serialized = c.generate(&merchant(), draft()).unwrap();
        let json = urlencoding::decode(&serialized).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value.get("tokenId").is_some());
        assert!(value.get("expiresAt").is_some());
        assert!(value.get("merchantData").is_some());
        assert!(value["transactionData"].get("amount").is_some());
    }

    #[test]
    fn test_configurable_ttl() {
        let policy = TokenPolicy::with_ttl(Duration::from_secs(30 * 60));
        let c = TokenCodec::new(SharedSecret::new("s"), policy).unwrap();
        let decoded = c
            .decode(&c.generate_at(&merchant(), draft(), 0).unwrap())
            .unwrap();
        assert_eq!(decoded.token.expires_at, 30 * 60 * 1000);
    }
}
