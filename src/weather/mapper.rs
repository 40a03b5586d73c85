//! Maps scraped AEMET values onto the covariates the model consumes.
//!
//! AEMET reports a Spanish sky label, cardinal wind directions and
//! comma-decimal numbers; the training data uses a six-value condition
//! vocabulary, wind bearings in degrees and dot-decimal numbers. Values
//! AEMET does not report (dew point, cloud cover, visibility,
//! precipitation probability) are estimated from what it does.

use serde::Serialize;
use tracing::warn;

use crate::frame::Frame;

use super::scraper::HourlyForecast;

/// Spanish sky labels and the model condition bucket each belongs to.
/// Keys are lowercase; lookup is exact first, then by substring.
static CONDITION_MAP: &[(&str, &str)] = &[
    ("despejado", "clear"),
    ("despejada", "clear"),
    ("cielo despejado", "clear"),
    ("poco nuboso", "partly-cloudy"),
    ("pocas nubes", "partly-cloudy"),
    ("intervalos nubosos", "partly-cloudy"),
    ("nuboso", "cloudy"),
    ("nublado", "cloudy"),
    ("muy nuboso", "cloudy"),
    ("cielo cubierto", "cloudy"),
    ("cubierto", "cloudy"),
    ("nubes altas", "cloudy"),
    ("lluvia", "rain"),
    ("lluvias", "rain"),
    ("llovizna", "rain"),
    ("chubascos", "rain"),
    ("chubasco", "rain"),
    ("tormenta", "rain"),
    ("tormentas", "rain"),
    ("granizo", "rain"),
    ("nieve", "snow"),
    ("nevadas", "snow"),
    ("niebla", "foggy"),
    ("neblina", "foggy"),
    ("bancos de niebla", "foggy"),
];

/// Cardinal wind directions as degrees, Spanish compass (O = west).
static WIND_DIRECTIONS: &[(&str, f64)] = &[
    ("N", 0.0),
    ("NNE", 22.5),
    ("NE", 45.0),
    ("ENE", 67.5),
    ("E", 90.0),
    ("ESE", 112.5),
    ("SE", 135.0),
    ("SSE", 157.5),
    ("S", 180.0),
    ("SSO", 202.5),
    ("SO", 225.0),
    ("OSO", 247.5),
    ("O", 270.0),
    ("ONO", 292.5),
    ("NO", 315.0),
    ("NNO", 337.5),
];

/// Maps an AEMET sky label onto the model condition vocabulary.
/// An unrecognized label degrades to `"clear"` with a warning.
pub fn map_condition(raw: &str) -> String {
    let label = raw.trim().to_lowercase();
    if label.is_empty() {
        return "clear".to_string();
    }
    for (key, bucket) in CONDITION_MAP {
        if label == *key {
            return (*bucket).to_string();
        }
    }
    for (key, bucket) in CONDITION_MAP {
        if label.contains(key) || key.contains(label.as_str()) {
            return (*bucket).to_string();
        }
    }
    warn!(label = raw, "Unmapped AEMET sky label, defaulting to 'clear'");
    "clear".to_string()
}

/// Maps a cardinal direction onto a bearing in degrees; unknown → 0 (N).
pub fn map_wind_direction(raw: &str) -> f64 {
    let direction = raw.trim().to_uppercase();
    if direction.is_empty() {
        return 0.0;
    }
    for (key, degrees) in WIND_DIRECTIONS {
        if direction == *key {
            return *degrees;
        }
    }
    warn!(direction = raw, "Unmapped wind direction, defaulting to 0 (N)");
    0.0
}

/// Parses a scraped numeric string, accepting a comma decimal separator.
/// Unparseable input degrades to 0 with a warning.
pub fn clean_numeric(raw: &str) -> f64 {
    let value = raw.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("null") {
        return 0.0;
    }
    match value.replace(',', ".").parse::<f64>() {
        Ok(parsed) if parsed.is_finite() => parsed,
        _ => {
            warn!(value = raw, "Unparseable numeric value, defaulting to 0");
            0.0
        }
    }
}

/// Magnus-style dew point approximation: `Td ≈ T - (100 - RH) / 5`,
/// clamped to [-40, T].
pub fn estimate_dew_point(temperature: f64, humidity: f64) -> f64 {
    let humidity = if (0.0..=100.0).contains(&humidity) {
        humidity
    } else {
        50.0
    };
    (temperature - (100.0 - humidity) / 5.0).clamp(-40.0, temperature)
}

fn estimate_cloud_cover(condition: &str) -> f64 {
    match condition {
        "clear" => 5.0,
        "partly-cloudy" => 35.0,
        "cloudy" => 75.0,
        "rain" => 85.0,
        "snow" => 90.0,
        "foggy" => 95.0,
        _ => 50.0,
    }
}

fn estimate_visibility(condition: &str, precipitation: f64) -> f64 {
    match condition {
        "foggy" => 0.5,
        "rain" if precipitation > 5.0 => 2.0,
        "rain" => 5.0,
        "snow" if precipitation > 5.0 => 1.0,
        "snow" => 3.0,
        "cloudy" => 10.0,
        "partly-cloudy" => 15.0,
        _ => 20.0,
    }
}

fn estimate_precip_probability(condition: &str, precipitation: f64) -> f64 {
    if precipitation > 0.0 {
        return 100.0;
    }
    match condition {
        "clear" => 0.0,
        "partly-cloudy" => 10.0,
        "cloudy" => 25.0,
        "rain" | "snow" => 80.0,
        _ => 20.0,
    }
}

/// One complete set of weather covariates for a prediction request,
/// named exactly as the training datasets name them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherSample {
    pub temp: f64,
    pub feelslike: f64,
    pub dew: f64,
    pub humidity: f64,
    pub precip: f64,
    pub precipprob: f64,
    pub windgust: f64,
    pub windspeed: f64,
    pub winddir: f64,
    pub cloudcover: f64,
    pub visibility: f64,
    pub conditions: String,
}

impl WeatherSample {
    /// Maps a scraped forecast row into model covariates.
    pub fn from_forecast(forecast: &HourlyForecast) -> Self {
        let conditions = map_condition(&forecast.sky);
        let windspeed = forecast.wind_speed;
        WeatherSample {
            temp: forecast.temperature,
            feelslike: forecast.feels_like,
            dew: estimate_dew_point(forecast.temperature, forecast.humidity),
            humidity: forecast.humidity,
            precip: forecast.precipitation,
            precipprob: estimate_precip_probability(&conditions, forecast.precipitation),
            windgust: if forecast.wind_gust > 0.0 {
                forecast.wind_gust
            } else {
                windspeed
            },
            windspeed,
            winddir: map_wind_direction(&forecast.wind_direction),
            cloudcover: estimate_cloud_cover(&conditions),
            visibility: estimate_visibility(&conditions, forecast.precipitation),
            conditions,
        }
    }

    /// Mild-day defaults used when AEMET is unreachable or has no data
    /// for the requested hour. Predictions degrade but never abort.
    pub fn fallback() -> Self {
        WeatherSample {
            temp: 15.0,
            feelslike: 15.0,
            dew: 10.0,
            humidity: 60.0,
            precip: 0.0,
            precipprob: 0.0,
            windgust: 15.0,
            windspeed: 10.0,
            winddir: 180.0,
            cloudcover: 50.0,
            visibility: 10.0,
            conditions: "partly-cloudy".to_string(),
        }
    }

    /// Writes this sample as constant covariate columns across all rows
    /// of a request frame.
    pub fn fill_frame(&self, frame: &mut Frame) -> anyhow::Result<()> {
        let rows = frame.rows();
        for (name, value) in [
            ("temp", self.temp),
            ("feelslike", self.feelslike),
            ("dew", self.dew),
            ("humidity", self.humidity),
            ("precip", self.precip),
            ("precipprob", self.precipprob),
            ("windgust", self.windgust),
            ("windspeed", self.windspeed),
            ("winddir", self.winddir),
            ("cloudcover", self.cloudcover),
            ("visibility", self.visibility),
        ] {
            frame.insert_numeric(name, vec![value; rows])?;
        }
        frame.insert_categorical("conditions", vec![self.conditions.clone(); rows])
    }
}
