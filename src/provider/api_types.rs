//! Serde-deserializable types matching Aladhan API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping [`ProviderDay`] focused on what the cache stores.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use super::ProviderDay;

// ============================================================================
// Envelope
// ============================================================================

/// Top-level response. On failure `data` is a plain error string rather than
/// an object, so it is kept untyped until `code` has been checked.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope {
  pub code: u16,
  #[serde(default)]
  pub status: String,
  #[serde(default)]
  pub data: Value,
}

impl ApiEnvelope {
  /// Human readable reason for a non-200 envelope.
  pub fn failure_reason(&self) -> String {
    match &self.data {
      Value::String(message) if !message.is_empty() => format!("{} ({})", self.status, message),
      _ => self.status.clone(),
    }
  }
}

// ============================================================================
// timingsByCity payload
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiTimingsData {
  pub timings: BTreeMap<String, String>,
  pub date: ApiDate,
  pub meta: ApiMeta,
}

#[derive(Debug, Deserialize)]
pub struct ApiDate {
  pub readable: String,
  pub hijri: Option<ApiHijri>,
}

#[derive(Debug, Deserialize)]
pub struct ApiHijri {
  /// DD-MM-YYYY
  pub date: String,
  pub day: Option<String>,
  pub month: Option<ApiHijriMonth>,
  pub year: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiHijriMonth {
  pub en: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiMeta {
  pub timezone: String,
  pub method: Option<ApiMethod>,
}

#[derive(Debug, Deserialize)]
pub struct ApiMethod {
  pub name: Option<String>,
}

impl ApiHijri {
  /// "22 Rabīʿ al-thānī 1448", or the numeric date when parts are missing.
  pub fn readable(&self) -> String {
    match (&self.day, &self.month, &self.year) {
      (Some(day), Some(month), Some(year)) => format!("{} {} {}", day, month.en, year),
      _ => self.date.clone(),
    }
  }
}

impl ApiTimingsData {
  pub fn into_provider_day(self) -> ProviderDay {
    ProviderDay {
      timings: self.timings,
      date_readable: self.date.readable,
      hijri_date: self.date.hijri.as_ref().map(ApiHijri::readable),
      timezone: self.meta.timezone,
      method_name: self.meta.method.and_then(|m| m.name),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_failure_reason_includes_message() {
    let envelope: ApiEnvelope =
      serde_json::from_str(r#"{"code":400,"status":"BAD_REQUEST","data":"Unable to locate city"}"#)
        .unwrap();
    assert_eq!(envelope.failure_reason(), "BAD_REQUEST (Unable to locate city)");
  }

  #[test]
  fn test_hijri_readable_falls_back_to_date() {
    let hijri = ApiHijri {
      date: "22-04-1448".to_string(),
      day: Some("22".to_string()),
      month: None,
      year: Some("1448".to_string()),
    };
    assert_eq!(hijri.readable(), "22-04-1448");
  }
}
