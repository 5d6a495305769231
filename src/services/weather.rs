//! Weather proxy — current conditions for a Philippine city via OpenWeather.

use crate::frame::ErrorCode;

const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

/// Country code appended to every lookup.
const COUNTRY: &str = "PH";

#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("weather request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl ErrorCode for WeatherError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Http(_) => "E_WEATHER_UPSTREAM",
        }
    }

    fn retryable(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct WeatherClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl WeatherClient {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), api_key: api_key.into(), base_url: DEFAULT_BASE_URL.to_owned() }
    }

    /// Build the upstream request for city `q`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is malformed.
    pub fn build_request(&self, q: &str) -> Result<reqwest::Request, WeatherError> {
        let location = format!("{q},{COUNTRY}");
        let request = self
            .http
            .get(&self.base_url)
            .query(&[("q", location.as_str()), ("appid", self.api_key.as_str()), ("units", "metric")])
            .build()?;
        Ok(request)
    }

    /// Fetch current weather for `q` and return the upstream JSON unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-JSON body.
    pub async fn current(&self, q: &str) -> Result<serde_json::Value, WeatherError> {
        let request = self.build_request(q)?;
        let body = self.http.execute(request).await?.json().await?;
        Ok(body)
    }
}
