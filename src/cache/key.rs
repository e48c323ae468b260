//! Cache namespace and date keys.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use crate::provider::{CalculationOptions, Location};

/// Prefix for cache blobs in the key-value store.
const STORE_KEY_PREFIX: &str = "prayer_cache:";

/// Identity of one cache namespace.
///
/// Every dimension that changes the computed times is part of the key, so a
/// different city, method, time zone, shafaq or calendar method always maps
/// to a different namespace instead of mutating an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OptionsKey {
  country: String,
  city: String,
  method_id: u32,
  timezone: String,
  shafaq: String,
  calendar_method: String,
}

impl OptionsKey {
  pub fn new(location: &Location, options: &CalculationOptions) -> Self {
    Self {
      country: normalize_part(&location.country),
      city: normalize_part(&location.city),
      method_id: options.method_id,
      timezone: options.timezone.clone(),
      shafaq: options.shafaq.clone(),
      calendar_method: options.calendar_method.clone(),
    }
  }

  /// Stable, human-readable form, embedded in the persisted blob.
  pub fn canonical(&self) -> String {
    format!(
      "v1|{}|{}|m={}|tz={}|sh={}|cal={}",
      self.country, self.city, self.method_id, self.timezone, self.shafaq, self.calendar_method
    )
  }

  /// Key of this namespace's blob in the key-value store.
  pub fn store_key(&self) -> String {
    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(self.canonical().as_bytes());
    format!("{}{}", STORE_KEY_PREFIX, hex::encode(hasher.finalize()))
  }
}

/// Trim and lowercase for case-insensitive matching.
fn normalize_part(s: &str) -> String {
  s.trim().to_lowercase()
}

/// Cache date key, `YYYY-MM-DD`.
pub fn date_key(date: NaiveDate) -> String {
  date.format("%Y-%m-%d").to_string()
}

/// Parse a `YYYY-MM-DD` cache date key.
pub fn parse_date_key(key: &str) -> Option<NaiveDate> {
  NaiveDate::parse_from_str(key, "%Y-%m-%d").ok()
}

/// Provider date parameter, `DD-MM-YYYY`.
pub fn provider_date(date: NaiveDate) -> String {
  date.format("%d-%m-%Y").to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn location(city: &str, country: &str) -> Location {
    Location {
      city: city.to_string(),
      country: country.to_string(),
      country_code: None,
    }
  }

  fn options() -> CalculationOptions {
    CalculationOptions {
      method_id: 4,
      shafaq: "general".to_string(),
      calendar_method: "UAQ".to_string(),
      timezone: "Europe/London".to_string(),
    }
  }

  #[test]
  fn test_canonical_form_is_normalized() {
    let key = OptionsKey::new(&location("  London ", "United Kingdom"), &options());
    assert_eq!(
      key.canonical(),
      "v1|united kingdom|london|m=4|tz=Europe/London|sh=general|cal=UAQ"
    );
  }

  #[test]
  fn test_case_differences_share_a_namespace() {
    let a = OptionsKey::new(&location("London", "UK"), &options());
    let b = OptionsKey::new(&location("LONDON", "uk"), &options());
    assert_eq!(a.store_key(), b.store_key());
  }

  #[test]
  fn test_every_dimension_changes_the_namespace() {
    let base = OptionsKey::new(&location("London", "UK"), &options());

    let mut method = options();
    method.method_id = 2;
    let mut shafaq = options();
    shafaq.shafaq = "ahmer".to_string();
    let mut calendar = options();
    calendar.calendar_method = "HJCoSA".to_string();
    let mut tz = options();
    tz.timezone = "UTC".to_string();

    for other in [
      OptionsKey::new(&location("Leeds", "UK"), &options()),
      OptionsKey::new(&location("London", "Canada"), &options()),
      OptionsKey::new(&location("London", "UK"), &method),
      OptionsKey::new(&location("London", "UK"), &shafaq),
      OptionsKey::new(&location("London", "UK"), &calendar),
      OptionsKey::new(&location("London", "UK"), &tz),
    ] {
      assert_ne!(base.store_key(), other.store_key());
    }
  }

  #[test]
  fn test_store_key_shape() {
    let key = OptionsKey::new(&location("London", "UK"), &options()).store_key();
    assert!(key.starts_with("prayer_cache:"));
    assert_eq!(key.len(), "prayer_cache:".len() + 64);
  }

  #[test]
  fn test_date_formats() {
    let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
    assert_eq!(date_key(date), "2026-03-07");
    assert_eq!(provider_date(date), "07-03-2026");
    assert_eq!(parse_date_key("2026-03-07"), Some(date));
    assert_eq!(parse_date_key("07-03-2026"), None);
  }
}
