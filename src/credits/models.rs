use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A fiscal credit constituted from a service invoice (NFS-e)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credit {
    pub credit_number: String,
    pub invoice_number: String,
    pub constitution_date: NaiveDate,
    pub issqn_amount: f64,
    pub credit_type: String,
    pub simples_nacional: bool,
    pub rate: f64,
    pub billed_amount: f64,
    pub deduction_amount: f64,
    pub calculation_base: f64,
}

/// Longest key accepted by the lookup endpoints
pub const MAX_KEY_LEN: usize = 64;

/// Normalise a lookup key, or explain why it is unusable
pub fn normalize_key(raw: &str, field: &str) -> Result<String, String> {
    let key = raw.trim();
    if key.is_empty() {
        return Err(format!("{} is required", field));
    }
    if key.chars().count() > MAX_KEY_LEN {
        return Err(format!("{} must be at most {} characters", field, MAX_KEY_LEN));
    }
    if key.chars().any(char::is_control) {
        return Err(format!("{} contains invalid characters", field));
    }
    Ok(key.to_string())
}
