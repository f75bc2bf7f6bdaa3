//! Normalizes raw vision-model output into the fixed invoice schema.
//!
//! Model responses arrive as free text that usually contains a JSON object,
//! sometimes wrapped in markdown code fences, sometimes not JSON at all. This
//! module turns any of those shapes into an [`InvoiceRecord`] with every
//! schema field present.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// The eleven extracted fields, in export order.
pub const SCHEMA_FIELDS: [&str; 11] = [
    "e_tax_status",
    "invoice_number",
    "cust_code",
    "pages",
    "currency",
    "payment_method",
    "net_total",
    "delivery_instructions",
    "payment_received_by",
    "received_by_signature",
    "delivered_by_signature",
];

/// A fully normalized invoice record. Field order here fixes the key order of
/// the JSON and XML exports, so keep it in sync with [`SCHEMA_FIELDS`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    #[serde(default)]
    pub e_tax_status: String,
    #[serde(default)]
    pub invoice_number: String,
    #[serde(default)]
    pub cust_code: String,
    #[serde(default)]
    pub pages: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub net_total: String,
    #[serde(default)]
    pub delivery_instructions: String,
    #[serde(default)]
    pub payment_received_by: String,
    #[serde(default)]
    pub received_by_signature: String,
    #[serde(default)]
    pub delivered_by_signature: String,
    #[serde(default)]
    pub has_signatures: String,
}

impl InvoiceRecord {
    fn from_map(map: &BTreeMap<String, String>) -> Self {
        let field = |name: &str| map.get(name).cloned().unwrap_or_default();
        let mut record = Self {
            e_tax_status: field("e_tax_status"),
            invoice_number: field("invoice_number"),
            cust_code: field("cust_code"),
            pages: field("pages"),
            currency: field("currency"),
            payment_method: field("payment_method"),
            net_total: field("net_total"),
            delivery_instructions: field("delivery_instructions"),
            payment_received_by: field("payment_received_by"),
            received_by_signature: field("received_by_signature"),
            delivered_by_signature: field("delivered_by_signature"),
            has_signatures: String::new(),
        };
        record.recompute_signatures();
        record
    }

    /// Derives `has_signatures` from the two signature fields. Client-supplied
    /// values for the derived flag are never trusted.
    pub fn recompute_signatures(&mut self) {
        self.has_signatures = derive_has_signatures(
            &self.received_by_signature,
            &self.delivered_by_signature,
        )
        .to_owned();
    }
}

/// `"Yes"` iff at least one signature field is exactly `"Yes"` after trimming.
#[must_use]
pub fn derive_has_signatures(received: &str, delivered: &str) -> &'static str {
    if received.trim() == "Yes" || delivered.trim() == "Yes" {
        "Yes"
    } else {
        "No"
    }
}

/// Normalizes raw model output into a complete record.
///
/// Tries, in order: strip markdown fences, parse the widest `{...}` span as
/// JSON, parse the whole text as JSON, and finally fall back to line-oriented
/// `key: value` scraping with fuzzy field aliasing. Missing fields become
/// empty strings and unknown fields are dropped.
#[must_use]
pub fn normalize(raw: &str) -> InvoiceRecord {
    let stripped = strip_code_fences(raw.trim());

    let parsed = match find_json_object(stripped) {
        Some(span) => serde_json::from_str::<Value>(span).ok(),
        None => serde_json::from_str::<Value>(stripped).ok(),
    };

    let map = match parsed {
        Some(Value::Object(obj)) => {
            let mut map = BTreeMap::new();
            for (key, value) in &obj {
                if SCHEMA_FIELDS.contains(&key.as_str()) {
                    map.insert(key.clone(), coerce_to_string(value));
                }
            }
            map
        }
        _ => parse_key_value_lines(stripped),
    };

    InvoiceRecord::from_map(&map)
}

fn strip_code_fences(text: &str) -> &str {
    let inner = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Widest brace-delimited span, so nested objects stay intact.
fn find_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Alias substrings accepted for each schema field during fallback parsing.
fn field_aliases() -> &'static [(&'static str, &'static [&'static str])] {
    &[
        ("e_tax_status", &["e-tax", "e_tax", "etax"]),
        ("invoice_number", &["invoice number", "invoice_no", "invoice"]),
        ("cust_code", &["cust code", "customer code", "cust_code"]),
        ("pages", &["pages", "page"]),
        ("currency", &["currency"]),
        ("payment_method", &["payment method", "payment_method"]),
        ("net_total", &["net total", "total", "net_total", "amount"]),
        (
            "delivery_instructions",
            &["delivery instructions", "delivery"],
        ),
        (
            "payment_received_by",
            &["payment received by", "payment_received"],
        ),
        (
            "received_by_signature",
            &["received by signature", "received_by_signature"],
        ),
        (
            "delivered_by_signature",
            &[
                "delivered by signature",
                "delivered_by_signature",
                "delivered",
            ],
        ),
    ]
}

fn parse_key_value_lines(text: &str) -> BTreeMap<String, String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"([^:：]+)[:：]\s*(.+)").expect("Invalid regex pattern defined in code")
    });

    let mut scraped: Vec<(String, String)> = Vec::new();
    for line in text.lines() {
        if let Some(caps) = re.captures(line) {
            let key = caps[1]
                .trim()
                .to_lowercase()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join("_");
            scraped.push((key, caps[2].trim().to_owned()));
        }
    }

    let mut map = BTreeMap::new();
    for (field, aliases) in field_aliases() {
        for (key, value) in &scraped {
            let spaced = key.replace('_', " ");
            if aliases
                .iter()
                .any(|alias| key.contains(alias) || spaced.contains(alias))
            {
                map.insert((*field).to_owned(), value.clone());
                break;
            }
        }
    }
    map
}
