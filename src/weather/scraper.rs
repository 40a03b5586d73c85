//! Regex-based scraper for the AEMET Madrid hourly-forecast table.
//!
//! The table is extracted row by row with regular expressions; a row that
//! fails to yield an hour is skipped with a warning while the rest of the
//! table is kept. Transport failures surface as errors.

use anyhow::Result;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::mapper::clean_numeric;
use super::{BasicClient, HttpClient, fetch_text};

/// AEMET hourly forecast for the municipality of Madrid.
pub const MADRID_HOURLY_URL: &str =
    "https://www.aemet.es/es/eltiempo/prediccion/municipios/horas/tabla/madrid-id28079";

/// One scraped row of the hourly forecast table, raw except for numeric
/// cleanup. Condition and wind direction keep AEMET's Spanish vocabulary;
/// the mapper translates them.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyForecast {
    pub hour: u8,
    pub sky: String,
    pub temperature: f64,
    pub feels_like: f64,
    pub wind_direction: String,
    pub wind_speed: f64,
    pub wind_gust: f64,
    pub precipitation: f64,
    pub humidity: f64,
}

pub struct AemetScraper<C = BasicClient> {
    client: C,
}

impl AemetScraper<BasicClient> {
    pub fn new() -> Self {
        AemetScraper {
            client: BasicClient::new(),
        }
    }
}

impl Default for AemetScraper<BasicClient> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: HttpClient> AemetScraper<C> {
    pub fn with_client(client: C) -> Self {
        AemetScraper { client }
    }

    /// Fetches and parses the hourly forecast, keyed by hour of day.
    pub async fn hourly_forecast(&self) -> Result<BTreeMap<u8, HourlyForecast>> {
        let html = fetch_text(&self.client, MADRID_HOURLY_URL).await?;
        let rows = parse_hourly_table(&html)?;
        debug!(hours = rows.len(), "AEMET hourly table parsed");
        Ok(rows)
    }

    /// True when the forecast page answers with a success status.
    pub async fn test_connection(&self) -> bool {
        let Ok(url) = MADRID_HOURLY_URL.parse() else {
            return false;
        };
        let req = reqwest::Request::new(reqwest::Method::GET, url);
        match self.client.execute(req).await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

/// Extracts the per-hour rows from the forecast table HTML.
///
/// Cell layout of a row: hour, sky icon, temperature, feels-like, wind
/// (direction + speed), max gust, precipitation, snow, relative humidity.
/// The numbered cells share one CSS class, so they are collected in
/// document order and picked by position.
pub fn parse_hourly_table(html: &str) -> Result<BTreeMap<u8, HourlyForecast>> {
    let row_re = Regex::new(r#"(?s)<tr class="fila_hora[^"]*">.*?</tr>"#)?;
    let hour_re = Regex::new(r">(\d{1,2})</td>")?;
    let sky_re = Regex::new(r#"title="([^"]+)"\s*/?></td>"#)?;
    let cell_re = Regex::new(r#"<td class="borde_rb">\s*(-?[\d.,]+)\s*</td>"#)?;
    let wind_dir_re = Regex::new(r#"<div class="texto_viento">(\w+)</div>"#)?;
    let wind_speed_re = Regex::new(r#"<div class="texto_km_viento"><div>\s*(\d+)\s*</div>"#)?;

    let mut table = BTreeMap::new();

    for row in row_re.find_iter(html) {
        let row = row.as_str();

        let hour = hour_re
            .captures(row)
            .and_then(|c| c[1].parse::<u8>().ok())
            .filter(|h| *h < 24);
        let Some(hour) = hour else {
            warn!("Skipping hourly row without a parseable hour cell");
            continue;
        };

        let cells: Vec<f64> = cell_re
            .captures_iter(row)
            .map(|c| clean_numeric(&c[1]))
            .collect();
        let cell = |i: usize| cells.get(i).copied().unwrap_or(0.0);

        table.insert(
            hour,
            HourlyForecast {
                hour,
                sky: sky_re
                    .captures(row)
                    .map(|c| c[1].trim().to_string())
                    .unwrap_or_default(),
                temperature: cell(0),
                feels_like: cell(1),
                wind_direction: wind_dir_re
                    .captures(row)
                    .map(|c| c[1].to_string())
                    .unwrap_or_default(),
                wind_speed: wind_speed_re
                    .captures(row)
                    .and_then(|c| c[1].parse().ok())
                    .unwrap_or(0.0),
                wind_gust: cell(2),
                precipitation: cell(3),
                humidity: cell(5),
            },
        );
    }

    Ok(table)
}
