//! Current weather at a destination: wttr.in first, Open-Meteo second, then a
//! placeholder. Never fails.

use std::sync::Arc;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use super::MapsClient;
use crate::llm::{GenerativeModel, Part};

const KMPH_TO_MPS: f64 = 0.277778;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherInfo {
    pub temperature: Option<f64>,
    pub feels_like: Option<f64>,
    pub humidity: Option<i64>,
    pub description: String,
    pub condition: String,
    /// Metres per second.
    pub wind_speed: Option<f64>,
    /// Kilometres.
    pub visibility: Option<f64>,
    pub location_name: String,
    pub data_source: String,
}

impl WeatherInfo {
    fn unavailable(location_name: String) -> Self {
        Self {
            temperature: None,
            feels_like: None,
            humidity: None,
            description: "Weather information temporarily unavailable - please check local conditions"
                .to_string(),
            condition: "Unknown".to_string(),
            wind_speed: None,
            visibility: None,
            location_name,
            data_source: "Service unavailable".to_string(),
        }
    }
}

/// WMO weather interpretation codes as reported by Open-Meteo.
pub fn wmo_description(code: i64) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Fog",
        48 => "Depositing rime fog",
        51 => "Light drizzle",
        53 => "Moderate drizzle",
        55 => "Dense drizzle",
        56 => "Light freezing drizzle",
        57 => "Dense freezing drizzle",
        61 => "Slight rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        66 => "Light freezing rain",
        67 => "Heavy freezing rain",
        71 => "Slight snow",
        73 => "Moderate snow",
        75 => "Heavy snow",
        77 => "Snow grains",
        80 => "Slight rain showers",
        81 => "Moderate rain showers",
        82 => "Violent rain showers",
        85 => "Slight snow showers",
        86 => "Heavy snow showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm with slight hail",
        99 => "Thunderstorm with heavy hail",
        _ => "Unknown",
    }
}

/// wttr.in reports numbers as strings.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Decode a wttr.in `format=j1` body.
pub fn parse_wttr(body: &Value, location_name: &str) -> Option<WeatherInfo> {
    let current = body["current_condition"].get(0)?;
    let condition = current["weatherDesc"][0]["value"].as_str()?.to_string();
    Some(WeatherInfo {
        temperature: Some(number(&current["temp_C"])?),
        feels_like: number(&current["FeelsLikeC"]),
        humidity: number(&current["humidity"]).map(|h| h as i64),
        description: condition.to_lowercase(),
        condition,
        wind_speed: number(&current["windspeedKmph"]).map(|k| k * KMPH_TO_MPS),
        visibility: number(&current["visibility"]),
        location_name: location_name.to_string(),
        data_source: "wttr.in weather service".to_string(),
    })
}

/// Decode an Open-Meteo `current` block.
pub fn parse_open_meteo(body: &Value, location_name: &str) -> Option<WeatherInfo> {
    let current = body.get("current")?;
    let temperature = current["temperature_2m"].as_f64()?;
    let condition = wmo_description(current["weather_code"].as_i64().unwrap_or(0));
    Some(WeatherInfo {
        temperature: Some(temperature),
        // Open-Meteo has no apparent temperature in this field set.
        feels_like: Some(temperature),
        humidity: current["relative_humidity_2m"].as_i64(),
        description: condition.to_lowercase(),
        condition: condition.to_string(),
        wind_speed: current["wind_speed_10m"].as_f64(),
        visibility: current["visibility"]
            .as_f64()
            .filter(|v| *v > 0.0)
            .map(|m| m / 1000.0),
        location_name: location_name.to_string(),
        data_source: "Open-Meteo weather service".to_string(),
    })
}

#[derive(Debug, Clone)]
pub struct WeatherService {
    client: Client,
    maps: Arc<MapsClient>,
    wttr_base_url: String,
    open_meteo_url: String,
}

impl WeatherService {
    pub fn new(
        client: Client,
        maps: Arc<MapsClient>,
        wttr_base_url: impl Into<String>,
        open_meteo_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            maps,
            wttr_base_url: wttr_base_url.into().trim_end_matches('/').to_string(),
            open_meteo_url: open_meteo_url.into(),
        }
    }

    pub fn from_config(
        client: Client,
        maps: Arc<MapsClient>,
        config: &crate::config::WeatherConfig,
    ) -> Self {
        Self::new(client, maps, &config.wttr_base_url, &config.open_meteo_base_url)
    }

    /// Reverse-geocoded name, or `Location(lat, lng)`.
    pub async fn location_name(&self, lat: f64, lng: f64) -> String {
        match self.maps.reverse_geocode(lat, lng).await {
            Ok(name) if !name.is_empty() => name,
            Ok(_) => format!("Location({lat}, {lng})"),
            Err(e) => {
                tracing::debug!(error = %e, "Reverse geocoding failed");
                format!("Location({lat}, {lng})")
            }
        }
    }

    pub async fn current(&self, lat: f64, lng: f64) -> WeatherInfo {
        let location = self.location_name(lat, lng).await;

        match self.from_wttr(lat, lng, &location).await {
            Ok(Some(info)) => return info,
            Ok(None) => tracing::debug!("wttr.in returned no usable reading"),
            Err(e) => tracing::warn!(error = %e, "wttr.in request failed"),
        }
        match self.from_open_meteo(lat, lng, &location).await {
            Ok(Some(info)) => return info,
            Ok(None) => tracing::debug!("Open-Meteo returned no usable reading"),
            Err(e) => tracing::warn!(error = %e, "Open-Meteo request failed"),
        }
        WeatherInfo::unavailable(location)
    }

    async fn from_wttr(
        &self,
        lat: f64,
        lng: f64,
        location: &str,
    ) -> Result<Option<WeatherInfo>, reqwest::Error> {
        let body: Value = self
            .client
            .get(format!("{}/{lat},{lng}", self.wttr_base_url))
            .query(&[("format", "j1")])
            .header(
                reqwest::header::USER_AGENT,
                "Mozilla/5.0 (compatible; WayfarerBot/1.0)",
            )
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(parse_wttr(&body, location))
    }

    async fn from_open_meteo(
        &self,
        lat: f64,
        lng: f64,
        location: &str,
    ) -> Result<Option<WeatherInfo>, reqwest::Error> {
        let body: Value = self
            .client
            .get(&self.open_meteo_url)
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lng.to_string()),
                (
                    "current",
                    "temperature_2m,relative_humidity_2m,weather_code,wind_speed_10m,visibility"
                        .to_string(),
                ),
                ("timezone", "auto".to_string()),
            ])
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(parse_open_meteo(&body, location))
    }
}

fn or_na<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

/// Sentence used when the model cannot summarise.
pub fn fallback_summary(info: &WeatherInfo) -> String {
    format!(
        "Upon arrival in {}: {}, {}°C, humidity {}%, visibility {}km.",
        info.location_name,
        info.condition,
        or_na(info.temperature),
        or_na(info.humidity),
        or_na(info.visibility),
    )
}

/// About twenty words on the weather at arrival, from the model.
pub async fn summarize(model: &dyn GenerativeModel, info: &WeatherInfo, arrival: &str) -> String {
    let prompt = format!(
        "Based on the following weather information and estimated arrival time, create a 20-word weather summary:\n\n\
         Location: {}\n\
         Estimated Arrival Time: {arrival}\n\
         Temperature: {}°C\n\
         Feels Like: {}°C\n\
         Humidity: {}%\n\
         Condition: {}\n\
         Description: {}\n\
         Wind Speed: {} m/s\n\
         Visibility: {} km\n\n\
         Create a concise 20-word summary focusing on the key weather conditions for the arrival time.",
        info.location_name,
        or_na(info.temperature),
        or_na(info.feels_like),
        or_na(info.humidity),
        info.condition,
        info.description,
        or_na(info.wind_speed.map(|w| format!("{w:.1}"))),
        or_na(info.visibility),
    );

    match model.generate(vec![Part::text(prompt)]).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => fallback_summary(info),
        Err(e) => {
            tracing::warn!(error = %e, "Weather summary generation failed");
            fallback_summary(info)
        }
    }
}
