//! Response normalizer. Maps the extraction service's response layouts onto
//! one canonical field set.
//!
//! The service may return extracted values at the top level, under
//! `extracted_data` or `expense` (optionally wrapped in `data`), or only in the
//! echoed request payload. Each canonical field is read through an ordered
//! list of probes (shape × key); the first present, non-empty value wins.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use crate::models::{Confidence, ReceiptFields, RemoteRef};

/// Response shapes in probe order. An empty path is the top level.
const SHAPES: &[&[&str]] = &[
    &["expense"],
    &["extracted_data"],
    &["data", "expense"],
    &["data", "extracted_data"],
    &["data"],
    &[],
    &["request"],
    &["payload"],
];

const VENDOR_KEYS: &[&str] = &["vendor", "vendor_name", "merchant", "merchant_name"];
const AMOUNT_KEYS: &[&str] = &["amount", "total", "total_amount"];
const DATE_KEYS: &[&str] = &["date", "transaction_date", "receipt_date"];
const ENTITY_KEYS: &[&str] = &["entity", "business_entity", "entity_name"];
const TAG_KEYS: &[&str] = &["tags"];
const NOTES_KEYS: &[&str] = &["notes", "description", "memo"];
const CONFIDENCE_KEYS: &[&str] = &[
    "ai_validation.original_confidence",
    "original_confidence",
    "ocr_confidence",
    "confidence",
    "confidence_score",
];
const ID_KEYS: &[&str] = &["expense_id", "receipt_id", "id"];
const TRIGGER_KEYS: &[&str] = &["ai_validation.triggers", "ai_triggers"];
const VALIDATED_KEYS: &[&str] = &["ai_validation.validated", "ai_validated"];
const REASONING_KEYS: &[&str] = &["ai_validation.reasoning", "ai_reasoning"];
const MOCK_KEYS: &[&str] = &["is_mock", "mock"];

/// Identifier prefixes the client uses for records that never reached the server.
const PLACEHOLDER_PREFIXES: &[&str] = &["local-", "mock-", "temp-", "offline-"];

/// Canonical view of one extraction response.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedReceipt {
    pub fields: ReceiptFields,
    pub confidence: Confidence,
    /// An enhancement pass was attempted, whether or not it changed anything.
    pub ai_enhanced: bool,
    pub remote_id: Option<RemoteRef>,
}

/// Normalize against today's (UTC) date for the date default.
pub fn normalize(raw: &Value) -> NormalizedReceipt {
    normalize_on(raw, Utc::now().date_naive())
}

pub fn normalize_on(raw: &Value, today: NaiveDate) -> NormalizedReceipt {
    let fields = ReceiptFields {
        vendor: probe(raw, VENDOR_KEYS).find_map(as_text).unwrap_or_default(),
        amount: probe(raw, AMOUNT_KEYS).find_map(as_amount).unwrap_or_default(),
        date: probe(raw, DATE_KEYS).find_map(as_date).unwrap_or(today),
        entity: probe(raw, ENTITY_KEYS).find_map(as_text).unwrap_or_default(),
        tags: probe(raw, TAG_KEYS).next().map(tags_from_value).unwrap_or_default(),
        notes: probe(raw, NOTES_KEYS).find_map(as_text).unwrap_or_default(),
    };

    let confidence = probe(raw, CONFIDENCE_KEYS)
        .find_map(as_number)
        .map(normalize_confidence)
        .unwrap_or(Confidence::ZERO);

    NormalizedReceipt {
        fields,
        confidence,
        ai_enhanced: detect_ai_enhanced(raw),
        remote_id: extract_remote_ref(raw),
    }
}

/// True when the server reports that an enhancement pass was triggered.
pub fn detect_ai_enhanced(raw: &Value) -> bool {
    let triggered = probe(raw, TRIGGER_KEYS).next().is_some();
    let validated = probe(raw, VALIDATED_KEYS).any(|v| v.as_bool() == Some(true));
    let reasoned = probe(raw, REASONING_KEYS).find_map(as_text).is_some();
    triggered || validated || reasoned
}

/// Detects fraction (0–1) vs percentage (0–100) by range.
pub fn normalize_confidence(raw: f64) -> Confidence {
    if !raw.is_finite() || raw <= 0.0 {
        return Confidence::ZERO;
    }
    let fraction = (if raw > 1.0 { raw / 100.0 } else { raw }).min(1.0);
    Confidence {
        fraction,
        percent: (fraction * 100.0).round() as u8,
    }
}

pub fn extract_remote_ref(raw: &Value) -> Option<RemoteRef> {
    let id = probe(raw, ID_KEYS).find_map(|v| match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })?;

    let mocked = probe(raw, MOCK_KEYS).any(|v| v.as_bool() == Some(true));
    let lowered = id.to_ascii_lowercase();
    if mocked || PLACEHOLDER_PREFIXES.iter().any(|p| lowered.starts_with(p)) {
        Some(RemoteRef::Placeholder(id))
    } else {
        Some(RemoteRef::Remote(id))
    }
}

// ============================================================================
// Tags
// ============================================================================

/// Split a delimited tag string into an ordered, de-duplicated list.
pub fn parse_tags(raw: &str) -> Vec<String> {
    normalize_tag_list(std::iter::once(raw))
}

/// Re-normalize an existing collection; a no-op on normalized input.
pub fn normalize_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    normalize_tag_list(tags.iter().map(AsRef::as_ref))
}

/// Collection to the comma-delimited form the upload endpoint expects.
pub fn tags_to_string<S: AsRef<str>>(tags: &[S]) -> String {
    normalize_tags(tags).join(", ")
}

pub fn tags_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => parse_tags(s),
        Value::Array(items) => normalize_tag_list(items.iter().filter_map(Value::as_str)),
        _ => Vec::new(),
    }
}

fn normalize_tag_list<'a>(parts: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in parts.flat_map(|p| p.split(',')).map(str::trim) {
        if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

// ============================================================================
// Probing
// ============================================================================

/// Every non-empty candidate for `keys`, in shape-then-key order.
fn probe<'a>(raw: &'a Value, keys: &'static [&'static str]) -> impl Iterator<Item = &'a Value> {
    SHAPES
        .iter()
        .filter_map(move |shape| lookup(raw, shape.iter().copied()))
        .filter(|scope| scope.is_object())
        .flat_map(move |scope| keys.iter().filter_map(move |key| lookup(scope, key.split('.'))))
        .filter(|v| !is_empty(v))
}

fn lookup<'a, 'k>(value: &'a Value, path: impl Iterator<Item = &'k str>) -> Option<&'a Value> {
    path.fold(Some(value), |current, key| current?.get(key))
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn as_text(value: &Value) -> Option<String> {
    value.as_str().map(|s| s.trim().to_string())
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
}

fn as_amount(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => n.as_f64().map(|f| format!("{:.2}", f)),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|c| !matches!(*c, '$' | '€' | '£' | '¥' | ',') && !c.is_whitespace())
                .collect();
            (!cleaned.is_empty()).then_some(cleaned)
        }
        _ => None,
    }
}

fn as_date(value: &Value) -> Option<NaiveDate> {
    let s = value.as_str()?.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.date_naive());
    }
    s.get(..10)
        .and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok())
        .or_else(|| NaiveDate::parse_from_str(s, "%m/%d/%Y").ok())
}
