//! Weather provider client and storm reduction.
//!
//! Current conditions come from an `OpenWeatherMap`-compatible endpoint:
//! `GET {endpoint}/weather?q={location}&appid={api_key}&units=imperial`.
//! The only authentication is the key in the query string.
//!
//! The response is decoded in a single typed pass. Its `weather` entry is
//! accepted as the provider's array of condition objects, as a single
//! condition object, or as a JSON-encoded string holding either. Only the
//! `main` category of the first condition decides the storm flag; every
//! other field is optional and unknown fields are ignored.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SyncConfig;

/// Errors from a weather fetch. None of them disable weather sync.
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    /// The HTTP client could not be constructed.
    #[error("weather client setup failed: {0}")]
    Client(String),

    /// The request URL could not be built from the endpoint.
    #[error("invalid weather endpoint: {0}")]
    Url(String),

    /// The request failed in transport (connect, timeout, body read).
    #[error("weather request failed: {0}")]
    Request(String),

    /// The provider answered with a non-success status.
    #[error("weather provider returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, if it could be read.
        body: String,
    },

    /// The body was not the expected JSON.
    #[error("weather response parse failed: {0}")]
    Decode(String),

    /// The body parsed but carried no usable `weather.main` condition.
    #[error("weather response missing weather[0].main")]
    MissingCondition,
}

/// How a provider condition category is reduced to the storm flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StormRule {
    /// `!contains("clear") || !contains("clouds")`, case-sensitive.
    ///
    /// Carried over unchanged from the existing deployment. It is stormy
    /// unless the condition contains *both* words, which in practice means
    /// nearly always stormy.
    #[default]
    Legacy,

    /// Corrected rule: stormy unless the condition mentions clear sky or
    /// clouds, matched case-insensitively.
    ClearOrCloudy,
}

impl StormRule {
    /// Reduce a condition category to the storm flag.
    pub fn is_stormy(self, condition: &str) -> bool {
        match self {
            Self::Legacy => !condition.contains("clear") || !condition.contains("clouds"),
            Self::ClearOrCloudy => {
                let lowered = condition.to_lowercase();
                !(lowered.contains("clear") || lowered.contains("clouds"))
            }
        }
    }
}

/// Conditions reported by one provider response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WeatherSnapshot {
    /// Condition category, e.g. `Clear`, `Clouds`, `Rain`.
    pub condition: String,
    /// Longer condition text, e.g. `light rain`.
    pub description: Option<String>,
    /// Temperature in degrees Fahrenheit.
    pub temperature_f: Option<f64>,
    /// Location name as resolved by the provider.
    pub location_name: Option<String>,
}

impl WeatherSnapshot {
    /// Whether the world should be stormy under `rule`.
    pub fn is_stormy(&self, rule: StormRule) -> bool {
        rule.is_stormy(&self.condition)
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    #[serde(default)]
    weather: Option<WeatherField>,
    #[serde(default)]
    main: Option<Readings>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WeatherField {
    Entries(Vec<Condition>),
    Single(Condition),
    Encoded(String),
}

#[derive(Debug, Deserialize)]
struct Condition {
    main: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Readings {
    #[serde(default)]
    temp: Option<f64>,
}

impl WeatherField {
    /// First condition, unwrapping at most one level of string encoding.
    fn into_condition(self) -> Result<Condition, WeatherError> {
        match self {
            Self::Encoded(text) => {
                let inner: Self = serde_json::from_str(&text)
                    .map_err(|e| WeatherError::Decode(format!("encoded weather entry: {e}")))?;
                match inner {
                    Self::Encoded(_) => Err(WeatherError::MissingCondition),
                    decoded => decoded.into_condition(),
                }
            }
            Self::Single(condition) => Ok(condition),
            Self::Entries(entries) => entries
                .into_iter()
                .next()
                .ok_or(WeatherError::MissingCondition),
        }
    }
}

/// Decode a provider response body into a [`WeatherSnapshot`].
///
/// # Errors
///
/// Returns [`WeatherError::Decode`] for malformed JSON and
/// [`WeatherError::MissingCondition`] when no `main` condition is present.
pub fn parse_weather_response(body: &str) -> Result<WeatherSnapshot, WeatherError> {
    let response: WeatherResponse =
        serde_json::from_str(body).map_err(|e| WeatherError::Decode(e.to_string()))?;

    let condition = response
        .weather
        .ok_or(WeatherError::MissingCondition)?
        .into_condition()?;

    Ok(WeatherSnapshot {
        condition: condition.main,
        description: condition.description,
        temperature_f: response.main.and_then(|readings| readings.temp),
        location_name: response.name,
    })
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the weather provider.
#[derive(Debug, Clone)]
pub struct WeatherClient {
    client: reqwest::Client,
    endpoint: String,
}

impl WeatherClient {
    /// Create a client for `endpoint` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`WeatherError::Client`] if the HTTP client cannot be built.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, WeatherError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WeatherError::Client(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_owned(),
        })
    }

    /// Create a client from the `WeatherEndpoint` and `RequestTimeoutMs` settings.
    ///
    /// # Errors
    ///
    /// Returns [`WeatherError::Client`] if the HTTP client cannot be built.
    pub fn from_config(config: &SyncConfig) -> Result<Self, WeatherError> {
        Self::new(
            &config.weather_endpoint,
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    /// The provider base URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build the current-conditions URL for a location.
    ///
    /// # Errors
    ///
    /// Returns [`WeatherError::Url`] if the endpoint is not a valid URL.
    pub fn request_url(&self, location: &str, api_key: &str) -> Result<reqwest::Url, WeatherError> {
        let base = format!("{}/weather", self.endpoint);
        reqwest::Url::parse_with_params(
            &base,
            &[("q", location), ("appid", api_key), ("units", "imperial")],
        )
        .map_err(|e| WeatherError::Url(format!("{base}: {e}")))
    }

    /// Fetch current conditions for `location`.
    ///
    /// Transport errors are reported without the request URL so the API
    /// key never reaches the logs.
    ///
    /// # Errors
    ///
    /// Returns [`WeatherError`] on transport failure, a non-success status,
    /// or an unusable body.
    pub async fn fetch(&self, location: &str, api_key: &str) -> Result<WeatherSnapshot, WeatherError> {
        let url = self.request_url(location, api_key)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| WeatherError::Request(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(WeatherError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| WeatherError::Request(e.without_url().to_string()))?;

        debug!(location, bytes = body.len(), "received weather data");
        parse_weather_response(&body)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn condition_of(body: &str) -> Option<String> {
        parse_weather_response(body).ok().map(|s| s.condition)
    }

    #[test]
    fn parses_provider_array_shape() {
        let body = r#"{
            "coord": {"lon": -93.6, "lat": 41.6},
            "weather": [{"id": 500, "main": "Rain", "description": "light rain", "icon": "10d"}],
            "main": {"temp": 61.3, "humidity": 88},
            "name": "Des Moines",
            "cod": 200
        }"#;

        let snapshot = parse_weather_response(body).unwrap();
        assert_eq!(snapshot.condition, "Rain");
        assert_eq!(snapshot.description.as_deref(), Some("light rain"));
        assert_eq!(snapshot.location_name.as_deref(), Some("Des Moines"));
        assert!(snapshot.temperature_f.is_some_and(|t| (t - 61.3).abs() < 1e-9));
    }

    #[test]
    fn parses_string_encoded_entry() {
        let body = r#"{"weather":"{\"main\":\"clear\"}"}"#;
        assert_eq!(condition_of(body).as_deref(), Some("clear"));
    }

    #[test]
    fn parses_string_encoded_array() {
        let body = r#"{"weather":"[{\"main\":\"Snow\"}]"}"#;
        assert_eq!(condition_of(body).as_deref(), Some("Snow"));
    }

    #[test]
    fn parses_single_object_entry() {
        let body = r#"{"weather":{"main":"Clouds","extra":true}}"#;
        assert_eq!(condition_of(body).as_deref(), Some("Clouds"));
    }

    #[test]
    fn missing_weather_is_reported() {
        let result = parse_weather_response(r#"{"cod": 200, "name": "Nowhere"}"#);
        assert!(matches!(result, Err(WeatherError::MissingCondition)));

        let empty = parse_weather_response(r#"{"weather": []}"#);
        assert!(matches!(empty, Err(WeatherError::MissingCondition)));
    }

    #[test]
    fn malformed_json_is_decode_error() {
        let result = parse_weather_response("<html>bad gateway</html>");
        assert!(matches!(result, Err(WeatherError::Decode(_))));
    }

    #[test]
    fn legacy_rule_is_literal() {
        let rule = StormRule::Legacy;
        // Stormy unless both words appear.
        assert!(rule.is_stormy("clear"));
        assert!(rule.is_stormy("clouds"));
        assert!(rule.is_stormy("rain"));
        assert!(rule.is_stormy("Clear"));
        assert!(!rule.is_stormy("clear with scattered clouds"));
    }

    #[test]
    fn legacy_rule_on_encoded_clear_payload() {
        let snapshot = parse_weather_response(r#"{"weather":"{\"main\":\"clear\"}"}"#).unwrap();
        assert!(snapshot.is_stormy(StormRule::Legacy));
        assert!(!snapshot.is_stormy(StormRule::ClearOrCloudy));
    }

    #[test]
    fn corrected_rule_treats_clear_and_clouds_as_calm() {
        let rule = StormRule::ClearOrCloudy;
        assert!(!rule.is_stormy("Clear"));
        assert!(!rule.is_stormy("Clouds"));
        assert!(rule.is_stormy("Rain"));
        assert!(rule.is_stormy("Thunderstorm"));
        assert!(rule.is_stormy("Snow"));
    }

    #[test]
    fn request_url_encodes_query() {
        let client =
            WeatherClient::new("http://weather.test/data/2.5/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.endpoint(), "http://weather.test/data/2.5");

        let url = client.request_url("Des Moines,US", "abc123").unwrap();
        assert_eq!(
            url.as_str(),
            "http://weather.test/data/2.5/weather?q=Des+Moines%2CUS&appid=abc123&units=imperial"
        );
    }

    #[test]
    fn request_url_rejects_bad_endpoint() {
        let client = WeatherClient::new("not a url", Duration::from_secs(1)).unwrap();
        assert!(matches!(client.request_url("x", "y"), Err(WeatherError::Url(_))));
    }
}
