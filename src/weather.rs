//! current weather for the dashboard card
//!
//! falls back to fixed mock data whenever no api key is configured or the
//! request fails, so the card always has something to show.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const OPENWEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeatherData {
    pub temperature: f64,
    pub humidity: f64,
    pub description: String,
    pub icon: String,
}

impl WeatherData {
    pub fn mock() -> Self {
        Self {
            temperature: 25.0,
            humidity: 65.0,
            description: "partly cloudy".to_string(),
            icon: "02d".to_string(),
        }
    }

    pub fn sky(&self) -> Sky {
        let description = self.description.to_lowercase();
        if description.contains("rain") {
            Sky::Rain
        } else if description.contains("cloud") {
            Sky::Cloud
        } else {
            Sky::Clear
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sky {
    Rain,
    Cloud,
    Clear,
}

// subset of the OpenWeather current-weather response
#[derive(Deserialize)]
struct OwmResponse {
    main: OwmMain,
    weather: Vec<OwmWeather>,
}

#[derive(Deserialize)]
struct OwmMain {
    temp: f64,
    humidity: f64,
}

#[derive(Deserialize)]
struct OwmWeather {
    description: String,
    icon: String,
}

impl TryFrom<OwmResponse> for WeatherData {
    type Error = anyhow::Error;

    fn try_from(r: OwmResponse) -> Result<Self> {
        let first = r.weather.into_iter().next().context("response has no weather entry")?;
        Ok(Self {
            temperature: r.main.temp,
            humidity: r.main.humidity,
            description: first.description,
            icon: first.icon,
        })
    }
}

#[derive(Clone)]
pub struct WeatherClient {
    http: reqwest::Client,
    api_key: Option<String>,
}

impl WeatherClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    /// reads the key from the named environment variable
    pub fn from_env(var: &str) -> Self {
        Self::new(std::env::var(var).ok())
    }

    pub async fn fetch(&self, city: &str) -> WeatherData {
        let Some(key) = &self.api_key else {
            tracing::warn!("Weather API key not found, using mock data");
            return WeatherData::mock();
        };
        match self.request(city, key).await {
            Ok(data) => data,
            Err(e) => {
                tracing::error!("Error fetching weather data: {:#}", e);
                WeatherData::mock()
            }
        }
    }

    async fn request(&self, city: &str, key: &str) -> Result<WeatherData> {
        let response = self
            .http
            .get(OPENWEATHER_URL)
            .query(&[("q", city), ("appid", key), ("units", "metric")])
            .send()
            .await
            .context("weather request failed")?
            .error_for_status()
            .context("Weather API request failed")?;
        let body: OwmResponse = response.json().await.context("unexpected weather payload")?;
        body.try_into()
    }
}
