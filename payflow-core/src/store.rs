//! Charge records and the remote charge store contract.
//!
//! The store is an external collaborator: the core only needs its
//! read/write contract. `MemoryChargeStore` is an in-process
//! implementation for demos and tests; a production deployment would
//! back the same trait with a real key-value service.
//!
//! Failures are generic `StoreError`s; the core does not retry.

use async_trait::async_trait;
use payflow_token::{now_millis, TransactionResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Access tokens stop resolving this long after charge creation.
const ACCESS_TOKEN_TTL_MS: i64 = 24 * 60 * 60 * 1000;

/// Length of the human-shareable access token.
const ACCESS_TOKEN_LEN: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("access token expired")]
    TokenExpired,

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Charge lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeStatus {
    Pending,
    Paid,
    Canceled,
}

/// A charge/payment-request record.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Charge {
    pub id: String,
    /// Short shareable token used in pay links.
    pub access_token: String,
    pub merchant_id: String,
    pub merchant_name: String,
    pub amount: f64,
    pub description: String,
    pub currency: String,
    pub status: ChargeStatus,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// When the access token stops resolving, Unix epoch milliseconds.
    pub expires_at: i64,
}

/// Caller-supplied fields for a new charge.
#[derive(Clone, Debug)]
pub struct NewCharge {
    pub merchant_id: String,
    pub merchant_name: String,
    pub amount: f64,
    pub description: String,
    pub currency: String,
}

/// A payment registered against a charge.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: String,
    pub charge_id: String,
    pub result: TransactionResult,
    /// Unix epoch milliseconds.
    pub registered_at: i64,
}

/// Read/write contract of the remote charge store.
#[async_trait]
pub trait ChargeStore: Send + Sync {
    async fn create_charge(&self, new: NewCharge) -> Result<Charge, StoreError>;
    async fn get_charge_by_id(&self, id: &str) -> Result<Charge, StoreError>;
    async fn get_charge_by_token(&self, access_token: &str) -> Result<Charge, StoreError>;
    async fn update_charge_status(&self, id: &str, status: ChargeStatus)
        -> Result<(), StoreError>;
    /// Record a completed payment and mark the charge as paid.
    async fn register_payment(
        &self,
        charge_id: &str,
        result: TransactionResult,
    ) -> Result<PaymentRecord, StoreError>;
}

struct TokenEntry {
    charge_id: String,
    expires_at: i64,
}

/// In-memory charge store.
#[derive(Clone, Default)]
pub struct MemoryChargeStore {
    charges: Arc<Mutex<HashMap<String, Charge>>>,
    tokens: Arc<Mutex<HashMap<String, TokenEntry>>>,
    payments: Arc<Mutex<HashMap<String, Vec<PaymentRecord>>>>,
}

impl MemoryChargeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payments registered against a charge, oldest first.
    pub async fn payments_for(&self, charge_id: &str) -> Vec<PaymentRecord> {
        let payments = self.payments.lock().await;
        payments.get(charge_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ChargeStore for MemoryChargeStore {
    async fn create_charge(&self, new: NewCharge) -> Result<Charge, StoreError> {
        let created_at = now_millis();
        let charge = Charge {
            id: format!("chg_{}", Uuid::new_v4()),
            access_token: generate_access_token(),
            merchant_id: new.merchant_id,
            merchant_name: new.merchant_name,
            amount: new.amount,
            description: new.description,
            currency: new.currency,
            status: ChargeStatus::Pending,
            created_at,
            expires_at: created_at + ACCESS_TOKEN_TTL_MS,
        };

        let mut tokens = self.tokens.lock().await;
        tokens.insert(
            charge.access_token.clone(),
            TokenEntry {
                charge_id: charge.id.clone(),
                expires_at: charge.expires_at,
            },
        );
        drop(tokens);

        let mut charges = self.charges.lock().await;
        charges.insert(charge.id.clone(), charge.clone());
        debug!(charge_id = %charge.id, "charge created");
        Ok(charge)
    }

    async fn get_charge_by_id(&self, id: &str) -> Result<Charge, StoreError> {
        let charges = self.charges.lock().await;
        charges.get(id).cloned().ok_or_else(|| StoreError::NotFound {
            resource: "charge",
            id: id.to_string(),
        })
    }

    async fn get_charge_by_token(&self, access_token: &str) -> Result<Charge, StoreError> {
        let (charge_id, expires_at) = {
            let tokens = self.tokens.lock().await;
            let entry = tokens.get(access_token).ok_or_else(|| StoreError::NotFound {
                resource: "access token",
                id: access_token.to_string(),
            })?;
            (entry.charge_id.clone(), entry.expires_at)
        };

        if now_millis() > expires_at {
            return Err(StoreError::TokenExpired);
        }
        self.get_charge_by_id(&charge_id).await
    }

    async fn update_charge_status(
        &self,
        id: &str,
        status: ChargeStatus,
    ) -> Result<(), StoreError> {
        let mut charges = self.charges.lock().await;
        let charge = charges.get_mut(id).ok_or_else(|| StoreError::NotFound {
            resource: "charge",
            id: id.to_string(),
        })?;
        charge.status = status;
        Ok(())
    }

    async fn register_payment(
        &self,
        charge_id: &str,
        result: TransactionResult,
    ) -> Result<PaymentRecord, StoreError> {
        // Validates the charge exists before recording anything.
        self.get_charge_by_id(charge_id).await?;

        let record = PaymentRecord {
            id: format!("pay_{}", Uuid::new_v4()),
            charge_id: charge_id.to_string(),
            result,
            registered_at: now_millis(),
        };

        let mut payments = self.payments.lock().await;
        payments
            .entry(charge_id.to_string())
            .or_default()
            .push(record.clone());
        drop(payments);

        self.update_charge_status(charge_id, ChargeStatus::Paid)
            .await?;
        Ok(record)
    }
}

/// Short uppercase alphanumeric token, easy to read aloud or retype.
fn generate_access_token() -> String {
    let mut rng = rand::thread_rng();
    (0..ACCESS_TOKEN_LEN)
        .map(|_| {
            const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
            CHARSET[rng.gen_range(0..CHARSET.len())] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use payflow_token::TransactionStatus;

    fn coffee_charge() -> NewCharge {
        NewCharge {
            merchant_id: "M1".to_string(),
            merchant_name: "Shop".to_string(),
            amount: 50.0,
            description: "Coffee".to_string(),
            currency: "BRL".to_string(),
        }
    }

    fn paid_result(transaction_id: &str) -> TransactionResult {
        TransactionResult {
            transaction_id: transaction_id.to_string(),
            status: TransactionStatus::Success,
            auth_code: Some("A1B2C3".to_string()),
            payment_method: Some("nfc".to_string()),
            timestamp: now_millis(),
        }
    }

    #[tokio::test]
    async fn test_create_and_fetch_by_id() {
        let store = MemoryChargeStore::new();
        let charge = store.create_charge(coffee_charge()).await.unwrap();
        assert_eq!(charge.status, ChargeStatus::Pending);
        assert_eq!(charge.access_token.len(), ACCESS_TOKEN_LEN);

        let fetched = store.get_charge_by_id(&charge.id).await.unwrap();
        assert_eq!(fetched.amount, 50.0);
    }

    #[tokio::test]
    async fn test_fetch_by_access_token() {
        let store = MemoryChargeStore::new();
        let charge = store.create_charge(coffee_charge()).await.unwrap();
        let fetched = store.get_charge_by_token(&charge.access_token).await.unwrap();
        assert_eq!(fetched.id, charge.id);
    }

    #[tokio::test]
    async fn test_unknown_token_not_found() {
        let store = MemoryChargeStore::new();
        let err = store.get_charge_by_token("NOPE99").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_status() {
        let store = MemoryChargeStore::new();
        let charge = store.create_charge(coffee_charge()).await.unwrap();
        store
            .update_charge_status(&charge.id, ChargeStatus::Canceled)
            .await
            .unwrap();
        let fetched = store.get_charge_by_id(&charge.id).await.unwrap();
        assert_eq!(fetched.status, ChargeStatus::Canceled);
    }

    #[tokio::test]
    async fn test_register_payment_marks_paid() {
        let store = MemoryChargeStore::new();
        let charge = store.create_charge(coffee_charge()).await.unwrap();

        let record = store
            .register_payment(&charge.id, paid_result("T1"))
            .await
            .unwrap();
        assert_eq!(record.charge_id, charge.id);

        let fetched = store.get_charge_by_id(&charge.id).await.unwrap();
        assert_eq!(fetched.status, ChargeStatus::Paid);
        assert_eq!(store.payments_for(&charge.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_register_payment_unknown_charge() {
        let store = MemoryChargeStore::new();
        let err = store
            .register_payment("chg_missing", paid_result("T1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
