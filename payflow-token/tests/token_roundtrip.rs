//! Round-trip, expiry, and tamper-detection coverage for the token codec.

use std::time::Duration;

use payflow_token::{
    MerchantData, SharedSecret, TokenCodec, TokenPolicy, TransactionDraft,
};

fn codec() -> TokenCodec {
    TokenCodec::with_default_policy(SharedSecret::new("integration-secret")).unwrap()
}

fn shop_merchant() -> MerchantData {
    MerchantData {
        id: "M1".to_string(),
        name: "Shop".to_string(),
        document: "123".to_string(),
        account_id: "A1".to_string(),
        merchant_key: "K1".to_string(),
        certificate_id: None,
    }
}

fn coffee_draft() -> TransactionDraft {
    TransactionDraft::new("T1", 50.0, "Coffee", "BRL")
}

#[test]
fn test_roundtrip_verifies_immediately_after_generation() {
    let c = codec();
    let serialized = c.generate(&shop_merchant(), coffee_draft()).unwrap();
    let decoded = c.decode(&serialized).unwrap();
    assert!(c.verify(&decoded));
}

#[test]
fn test_expired_token_fails_closed() {
    let c = codec();
    let serialized = c
        .generate_at(&shop_merchant(), coffee_draft(), 1_000)
        .unwrap();
    let decoded = c.decode(&serialized).unwrap();

    let ttl_ms = TokenPolicy::default().ttl.as_millis() as i64;
    // Within the window: valid. One past the window: false, no panic.
    assert!(c.verify_at(&decoded, 1_000 + ttl_ms));
    assert!(!c.verify_at(&decoded, 1_001 + ttl_ms));
    assert!(decoded.is_expired_at(1_001 + ttl_ms));
}

#[test]
fn test_tampered_amount_fails_verification() {
    let c = codec();
    let serialized = c.generate(&shop_merchant(), coffee_draft()).unwrap();
    let mut decoded = c.decode(&serialized).unwrap();

    decoded.token.transaction_data.amount = 5000.0;
    assert!(!c.verify(&decoded));
}

#[test]
fn test_tampered_expiry_fails_verification() {
    let c = codec();
    let serialized = c.generate(&shop_merchant(), coffee_draft()).unwrap();
    let mut decoded = c.decode(&serialized).unwrap();

    decoded.token.expires_at += 60 * 60 * 1000;
    assert!(!c.verify(&decoded));
}

#[test]
fn test_tampered_token_id_fails_verification() {
    let c = codec();
    let serialized = c.generate(&shop_merchant(), coffee_draft()).unwrap();
    let mut decoded = c.decode(&serialized).unwrap();

    decoded.token.token_id = format!("{}00", decoded.token.token_id);
    assert!(!c.verify(&decoded));
}

#[test]
fn test_tampered_sealed_merchant_fails_at_decode() {
    let c = codec();
    let serialized = c.generate(&shop_merchant(), coffee_draft()).unwrap();
    let json = urlencoding::decode(&serialized).unwrap().into_owned();
    let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();

    // Flip one hex nibble inside the sealed merchant blob.
    let sealed = value["merchantData"].as_str().unwrap().to_string();
    let mut bytes = sealed.into_bytes();
    let last = bytes.len() - 1;
    bytes[last] = if bytes[last] == b'0' { b'1' } else { b'0' };
    value["merchantData"] = serde_json::Value::String(String::from_utf8(bytes).unwrap());

    let reserialized = urlencoding::encode(&value.to_string()).into_owned();
    assert!(c.decode(&reserialized).is_err());
}

#[test]
fn test_end_to_end_shop_coffee_scenario() {
    let c = codec();
    let serialized = c.generate(&shop_merchant(), coffee_draft()).unwrap();
    let decoded = c.decode(&serialized).unwrap();

    assert_eq!(decoded.transaction().amount, 50.0);
    assert_eq!(decoded.transaction().description, "Coffee");
    assert_eq!(decoded.transaction().currency, "BRL");
    assert_eq!(decoded.merchant.name, "Shop");
    assert_eq!(decoded.merchant.id, "M1");

    assert!(c.verify(&decoded));
    assert!(!c.verify_at(&decoded, decoded.token.expires_at + 1));
}

#[test]
fn test_verify_is_repeatable() {
    let c = codec();
    let decoded = c
        .decode(&c.generate(&shop_merchant(), coffee_draft()).unwrap())
        .unwrap();
    for _ in 0..3 {
        assert!(c.verify(&decoded));
    }
}

#[test]
fn test_short_ttl_policy_applies() {
    let c = TokenCodec::new(
        SharedSecret::new("integration-secret"),
        TokenPolicy::with_ttl(Duration::from_secs(1)),
    )
    .unwrap();
    let decoded = c
        .decode(&c.generate_at(&shop_merchant(), coffee_draft(), 0).unwrap())
        .unwrap();
    assert!(c.verify_at(&decoded, 500));
    assert!(!c.verify_at(&decoded, 1_500));
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    fn merchant_strategy() -> impl Strategy<Value = MerchantData> {
        (
            "[a-zA-Z0-9]{1,16}",
            "[a-zA-Z ]{1,24}",
            "[0-9]{3,14}",
            "[a-zA-Z0-9]{1,12}",
            "[a-zA-Z0-9]{1,12}",
        )
            .prop_map(|(id, name, document, account_id, merchant_key)| MerchantData {
                id,
                name,
                document,
                account_id,
                merchant_key,
                certificate_id: None,
            })
    }

    fn draft_strategy() -> impl Strategy<Value = TransactionDraft> {
        ("[a-zA-Z0-9]{1,16}", 0.01f64..1_000_000.0, "[a-zA-Z ]{0,32}")
            .prop_map(|(id, amount, description)| {
                TransactionDraft::new(id, amount, description, "BRL")
            })
    }

    proptest! {
        #[test]
        fn test_roundtrip_preserves_content_and_verifies(
            merchant in merchant_strategy(),
            draft in draft_strategy(),
        ) {
            let c = codec();
            let amount = draft.amount;
            let serialized = c.generate(&merchant, draft).unwrap();
            let decoded = c.decode(&serialized).unwrap();

            prop_assert_eq!(&decoded.merchant, &merchant);
            prop_assert_eq!(decoded.transaction().amount, amount);
            prop_assert!(c.verify(&decoded));
        }

        #[test]
        fn test_amount_tamper_always_detected(
            merchant in merchant_strategy(),
            draft in draft_strategy(),
            delta in 0.01f64..1000.0,
        ) {
            let c = codec();
            let serialized = c.generate(&merchant, draft).unwrap();
            let mut decoded = c.decode(&serialized).unwrap();
            decoded.token.transaction_data.amount += delta;
            prop_assert!(!c.verify(&decoded));
        }
    }
}
