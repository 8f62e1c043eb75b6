//! Gateway result callback payload

use serde::{Deserialize, Deserializer};

/// Result notification fields; everything else the gateway sends is ignored
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ResultNotification {
    #[serde(rename = "OutSum", deserialize_with = "string_or_number")]
    pub out_sum: String,
    #[serde(rename = "InvId", deserialize_with = "string_or_number")]
    pub inv_id: String,
    #[serde(rename = "SignatureValue")]
    pub signature_value: String,
}

/// JSON bodies may carry numbers where form bodies carry strings
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(f) => f.to_string(),
    })
}

/// Whole-unit amount from gateway formatting (`990`, `990.00`, `990.000000`)
pub fn parse_amount(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (whole, fraction) = raw.split_once('.').unwrap_or((raw, ""));
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !fraction.bytes().all(|b| b == b'0') {
        return None;
    }
    whole.parse().ok()
}
