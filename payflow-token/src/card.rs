//! Card and transaction result models.
//!
//! `CardData` is produced once per successful contactless read and is
//! immutable after that; the controller clears it on reset. The card
//! brand is derived locally from the PAN's BIN prefix, mirroring the
//! brand set the native reader module reports.

use serde::{Deserialize, Serialize};

/// Card brand, derived from the BIN prefix table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardBrand {
    Visa,
    #[serde(rename = "Visa Electron")]
    VisaElectron,
    Mastercard,
    Maestro,
    Amex,
    Elo,
    #[serde(other)]
    Unknown,
}

impl CardBrand {
    /// Derive the brand from a PAN (digits only).
    ///
    /// More specific prefixes are checked before the generic ones, so an
    /// Elo 4011 card is not misreported as Visa.
    pub fn from_pan(pan: &str) -> Self {
        const ELO_PREFIXES: &[&str] = &[
            "4011", "4312", "4389", "5041", "5067", "509", "6277", "6362", "6363",
        ];
        const ELECTRON_PREFIXES: &[&str] = &["4026", "417500", "4508", "4844", "4913", "4917"];

        let digits: String = pan.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return CardBrand::Unknown;
        }

        if ELO_PREFIXES.iter().any(|p| digits.starts_with(p)) {
            return CardBrand::Elo;
        }
        if ELECTRON_PREFIXES.iter().any(|p| digits.starts_with(p)) {
            return CardBrand::VisaElectron;
        }
        if digits.starts_with("34") || digits.starts_with("37") {
            return CardBrand::Amex;
        }
        if let Ok(prefix2) = digits[..2.min(digits.len())].parse::<u32>() {
            if (51..=55).contains(&prefix2) {
                return CardBrand::Mastercard;
            }
            if prefix2 == 50 || (56..=58).contains(&prefix2) {
                return CardBrand::Maestro;
            }
        }
        if digits.len() >= 4 {
            if let Ok(prefix4) = digits[..4].parse::<u32>() {
                if (2221..=2720).contains(&prefix4) {
                    return CardBrand::Mastercard;
                }
                if prefix4 == 6390 {
                    return CardBrand::Maestro;
                }
            }
        }
        if digits.starts_with("67") {
            return CardBrand::Maestro;
        }
        if digits.starts_with('4') {
            return CardBrand::Visa;
        }
        CardBrand::Unknown
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CardBrand::Visa => "Visa",
            CardBrand::VisaElectron => "Visa Electron",
            CardBrand::Mastercard => "Mastercard",
            CardBrand::Maestro => "Maestro",
            CardBrand::Amex => "Amex",
            CardBrand::Elo => "Elo",
            CardBrand::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for CardBrand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-read outcome reported by the native layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardReadStatus {
    Success,
    Error,
}

/// Card data extracted from a contactless read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardData {
    /// PAN, digits only. When `is_tag_id` is true this is a substitute
    /// tag UID rather than a real PAN.
    pub card_number: String,
    /// MM/YY.
    pub expiry_date: String,
    pub card_type: CardBrand,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cardholder_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_country_code: Option<String>,
    pub is_tag_id: bool,
    pub status: CardReadStatus,
}

impl CardData {
    /// Build card data from a raw read, deriving the brand from the PAN.
    pub fn from_read(card_number: impl Into<String>, expiry_date: impl Into<String>) -> Self {
        let card_number = card_number.into();
        let card_type = CardBrand::from_pan(&card_number);
        Self {
            card_number,
            expiry_date: expiry_date.into(),
            card_type,
            cardholder_name: None,
            issuer_country_code: None,
            is_tag_id: false,
            status: CardReadStatus::Success,
        }
    }

    pub fn with_cardholder_name(mut self, name: impl Into<String>) -> Self {
        self.cardholder_name = Some(name.into());
        self
    }

    pub fn with_issuer_country_code(mut self, code: impl Into<String>) -> Self {
        self.issuer_country_code = Some(code.into());
        self
    }

    /// Mark the PAN as a substitute tag UID (reader could not extract a
    /// real PAN and fell back to the tag identifier).
    pub fn as_tag_id(mut self) -> Self {
        self.is_tag_id = true;
        self.card_type = CardBrand::Unknown;
        self
    }

    /// PAN masked for display: all but the last four digits hidden.
    pub fn masked_number(&self) -> String {
        let digits: String = self
            .card_number
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect();
        if digits.len() <= 4 {
            return digits;
        }
        format!("**** {}", &digits[digits.len() - 4..])
    }
}

/// Payment outcome status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Success,
    Failed,
    Pending,
}

/// Result synthesized by the controller after a successful card read.
///
/// Not persisted here; handing it to a charge store is the caller's job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResult {
    pub transaction_id: String,
    pub status: TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brand_from_pan() {
        assert_eq!(CardBrand::from_pan("4111111111111111"), CardBrand::Visa);
        assert_eq!(CardBrand::from_pan("5500005555555559"), CardBrand::Mastercard);
        assert_eq!(CardBrand::from_pan("2221000000000009"), CardBrand::Mastercard);
        assert_eq!(CardBrand::from_pan("378282246310005"), CardBrand::Amex);
        assert_eq!(CardBrand::from_pan("5018000000000009"), CardBrand::Maestro);
        assert_eq!(CardBrand::from_pan("6759649826438453"), CardBrand::Maestro);
        assert_eq!(CardBrand::from_pan("4026000000000002"), CardBrand::VisaElectron);
        assert_eq!(CardBrand::from_pan("5067300000000000"), CardBrand::Elo);
        assert_eq!(CardBrand::from_pan("9999999999999999"), CardBrand::Unknown);
        assert_eq!(CardBrand::from_pan(""), CardBrand::Unknown);
    }

    #[test]
    fn test_elo_beats_visa_prefix() {
        // 4011 is Elo even though it starts with 4.
        assert_eq!(CardBrand::from_pan("4011780000000000"), CardBrand::Elo);
    }

    #[test]
    fn test_masked_number() {
        let card = CardData::from_read("4111111111111111", "12/30");
        assert_eq!(card.masked_number(), "**** 1111");

        let short = CardData::from_read("123", "01/29");
        assert_eq!(short.masked_number(), "123");
    }

    #[test]
    fn test_tag_id_fallback() {
        let card = CardData::from_read("04A22E7B804C80", "").as_tag_id();
        assert!(card.is_tag_id);
        assert_eq!(card.card_type, CardBrand::Unknown);
    }

    #[test]
    fn test_card_wire_shape() {
        let card = CardData::from_read("4111111111111111", "12/30");
        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["cardNumber"], "4111111111111111");
        assert_eq!(json["cardType"], "Visa");
        assert_eq!(json["expiryDate"], "12/30");
        assert_eq!(json["isTagId"], false);
        assert_eq!(json["status"], "success");
        assert!(json.get("cardholderName").is_none());
    }

    #[test]
    fn test_unknown_brand_string_roundtrips() {
        let brand: CardBrand = serde_json::from_str("\"SomeFutureBrand\"").unwrap();
        assert_eq!(brand, CardBrand::Unknown);
    }
}
