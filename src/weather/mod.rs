//! Weather data collection for prediction requests.
//!
//! A thin HTTP seam, a regex-based scraper for the AEMET Madrid hourly
//! forecast table, and the mapping layer that turns scraped values into
//! the covariates the model consumes.

mod basic;
mod client;
pub mod mapper;
pub mod scraper;

pub use basic::BasicClient;
pub use client::HttpClient;
pub use mapper::WeatherSample;
pub use scraper::AemetScraper;

use anyhow::Result;

pub async fn fetch_text<C: HttpClient>(client: &C, url: &str) -> Result<String> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    let resp = client.execute(req).await?;
    Ok(resp.text().await?)
}
