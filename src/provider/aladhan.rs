use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use url::Url;

use super::api_types::{ApiEnvelope, ApiTimingsData};
use super::{DayRequest, PrayerTimeProvider, ProviderDay};
use crate::cache::provider_date;

/// Public Aladhan API root.
pub const DEFAULT_BASE_URL: &str = "https://api.aladhan.com/v1/";

/// Aladhan `timingsByCity` client
#[derive(Clone)]
pub struct AladhanClient {
  http: reqwest::Client,
  base_url: Url,
}

impl AladhanClient {
  pub fn new() -> Result<Self> {
    Self::with_base_url(DEFAULT_BASE_URL)
  }

  /// Create a client against another API root (must end with `/`).
  pub fn with_base_url(base_url: &str) -> Result<Self> {
    let base_url =
      Url::parse(base_url).map_err(|e| eyre!("Invalid provider URL {}: {}", base_url, e))?;

    let http = reqwest::Client::builder()
      .user_agent(concat!("meeqat/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base_url })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  /// Build the request URL for one day.
  pub fn timings_url(&self, request: &DayRequest) -> Result<Url> {
    let mut url = self
      .base_url
      .join(&format!("timingsByCity/{}", provider_date(request.date)))
      .map_err(|e| eyre!("Failed to build timings URL: {}", e))?;

    url
      .query_pairs_mut()
      .append_pair("city", &request.city)
      .append_pair("country", &request.country)
      .append_pair("method", &request.method_id.to_string())
      .append_pair("shafaq", &request.shafaq)
      .append_pair("timezonestring", &request.timezone)
      .append_pair("calendarMethod", &request.calendar_method);

    Ok(url)
  }
}

#[async_trait]
impl PrayerTimeProvider for AladhanClient {
  async fn fetch(&self, request: &DayRequest) -> Result<ProviderDay> {
    let url = self.timings_url(request)?;

    let response = self
      .http
      .get(url)
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch prayer times for {}: {}", request.date, e))?;

    let http_status = response.status();
    let body = response
      .text()
      .await
      .map_err(|e| eyre!("Failed to read provider response: {}", e))?;

    let envelope: ApiEnvelope = serde_json::from_str(&body)
      .map_err(|e| eyre!("Unexpected provider response (HTTP {}): {}", http_status, e))?;

    if envelope.code != 200 {
      return Err(eyre!(
        "Provider rejected request for {}: {}",
        request.date,
        envelope.failure_reason()
      ));
    }

    let data: ApiTimingsData = serde_json::from_value(envelope.data)
      .map_err(|e| eyre!("Failed to parse timings for {}: {}", request.date, e))?;

    Ok(data.into_provider_day())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::NaiveDate;
  use wiremock::matchers::{method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn request() -> DayRequest {
    DayRequest {
      date: NaiveDate::from_ymd_opt(2026, 10, 14).unwrap(),
      city: "Makkah".to_string(),
      country: "Saudi Arabia".to_string(),
      method_id: 4,
      shafaq: "general".to_string(),
      timezone: "Asia/Riyadh".to_string(),
      calendar_method: "UAQ".to_string(),
    }
  }

  fn success_body() -> serde_json::Value {
    serde_json::json!({
      "code": 200,
      "status": "OK",
      "data": {
        "timings": {
          "Fajr": "04:58",
          "Sunrise": "06:14",
          "Dhuhr": "12:06",
          "Asr": "15:28",
          "Maghrib": "17:58",
          "Isha": "19:28"
        },
        "date": {
          "readable": "14 Oct 2026",
          "timestamp": "1791961200",
          "gregorian": { "date": "14-10-2026" },
          "hijri": {
            "date": "03-05-1448",
            "day": "03",
            "month": { "number": 5, "en": "Jumādá al-ūlá" },
            "year": "1448"
          }
        },
        "meta": {
          "timezone": "Asia/Riyadh",
          "method": { "id": 4, "name": "Umm Al-Qura University, Makkah" },
          "latitude": 21.42,
          "longitude": 39.82
        }
      }
    })
  }

  #[test]
  fn test_timings_url_encodes_parameters() {
    let client = AladhanClient::new().unwrap();
    let url = client.timings_url(&request()).unwrap();

    assert_eq!(url.path(), "/v1/timingsByCity/14-10-2026");
    let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    assert!(query.contains(&("country".to_string(), "Saudi Arabia".to_string())));
    assert!(query.contains(&("timezonestring".to_string(), "Asia/Riyadh".to_string())));
    assert!(query.contains(&("calendarMethod".to_string(), "UAQ".to_string())));
  }

  #[tokio::test]
  async fn test_fetch_parses_timings() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/v1/timingsByCity/14-10-2026"))
      .and(query_param("city", "Makkah"))
      .and(query_param("method", "4"))
      .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
      .expect(1)
      .mount(&server)
      .await;

    let client = AladhanClient::with_base_url(&format!("{}/v1/", server.uri())).unwrap();
    let day = client.fetch(&request()).await.unwrap();

    assert_eq!(day.timings.get("Maghrib").map(String::as_str), Some("17:58"));
    assert_eq!(day.date_readable, "14 Oct 2026");
    assert_eq!(day.timezone, "Asia/Riyadh");
    assert_eq!(
      day.method_name.as_deref(),
      Some("Umm Al-Qura University, Makkah")
    );
    assert_eq!(day.hijri_date.as_deref(), Some("03 Jumādá al-ūlá 1448"));
  }

  #[tokio::test]
  async fn test_fetch_surfaces_provider_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
        "code": 400,
        "status": "BAD_REQUEST",
        "data": "Unable to find city"
      })))
      .mount(&server)
      .await;

    let client = AladhanClient::with_base_url(&format!("{}/v1/", server.uri())).unwrap();
    let err = client.fetch(&request()).await.unwrap_err();

    assert!(err.to_string().contains("Unable to find city"));
  }
}
