//! PayFlow Token Protocol
//!
//! This crate implements the payment-token side of the PayFlow demo:
//! building, serializing, and verifying signed, time-bound payment tokens
//! that carry merchant identity and transaction details between a sender
//! (merchant requesting payment) and a receiver (payer tapping a card).
//!
//! A token is valid iff it has not passed its expiry AND its signature
//! recomputes identically under the shared secret. Validity is a pure
//! function of the token's fields plus the clock; no external state is
//! consulted.

pub mod card;
pub mod digest;
pub mod errors;
pub mod seal;
pub mod token;

pub use card::{CardBrand, CardData, CardReadStatus, TransactionResult, TransactionStatus};
pub use errors::TokenError;
pub use seal::SealContext;
pub use token::{
    now_millis, DecodedToken, MerchantData, PaymentToken, SharedSecret, TokenCodec, TokenPolicy,
    TransactionData, TransactionDraft,
};

/// Result type for token operations.
pub type Result<T> = std::result::Result<T, TokenError>;
