//! WebGia fetcher - last-resort fallback for the international markets
//!
//! WebGia loads most prices dynamically, so this fetcher only recovers
//! what is present in the static HTML: keyword-tagged rows with a number
//! in the right magnitude. Low trust weight in config reflects that.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::FetchConfig;
use crate::sources::{get_page, parse_price, PriceFetcher};
use crate::types::{Market, RawReading, Source, Unit};

const WEBGIA_URL: &str = "https://webgia.com/gia-hang-hoa/ca-phe-the-gioi/";

const MARKETS: &[Market] = &[Market::RobustaLondon, Market::ArabicaNewYork];

pub struct WebGiaFetcher {
    max_retries: usize,
    retry_delay: Duration,
    line_re: Regex,
}

impl WebGiaFetcher {
    pub fn new(cfg: &FetchConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            retry_delay: Duration::from_millis(cfg.retry_delay_ms),
            // Keyword followed by a number within the same tag soup line
            line_re: Regex::new(r"(?i)(robusta|arabica)[^\d<]*(?:<[^>]*>\s*)*([\d.,]+)")
                .expect("static regex"),
        }
    }

    fn extract_prices(&self, html: &str) -> Vec<(Market, Unit, f64)> {
        let mut found = Vec::new();

        for caps in self.line_re.captures_iter(html) {
            let Some(value) = parse_price(&caps[2]) else { continue };

            let hit = match caps[1].to_lowercase().as_str() {
                "robusta" if (2000.0..=8000.0).contains(&value) => {
                    Some((Market::RobustaLondon, Unit::UsdPerTonne, value))
                }
                "arabica" if (100.0..=400.0).contains(&value) => {
                    Some((Market::ArabicaNewYork, Unit::CentsPerLb, value))
                }
                _ => None,
            };

            if let Some(entry) = hit {
                if !found.iter().any(|(m, _, _): &(Market, Unit, f64)| *m == entry.0) {
                    found.push(entry);
                }
            }
        }
        found
    }
}

#[async_trait]
impl PriceFetcher for WebGiaFetcher {
    fn source(&self) -> Source {
        Source::WebGia
    }

    fn markets(&self) -> &[Market] {
        MARKETS
    }

    async fn fetch(&self, client: &reqwest::Client) -> Result<Vec<RawReading>> {
        let html = get_page(client, WEBGIA_URL, self.max_retries, self.retry_delay).await?;

        let prices = self.extract_prices(&html);
        if prices.is_empty() {
            warn!("webgia.com static HTML carried no usable prices");
        }

        let observed_at = Utc::now();
        Ok(prices
            .into_iter()
            .map(|(market, unit, value)| {
                info!(market = %market, value, "webgia.com price found");
                RawReading {
                    market,
                    source: Source::WebGia,
                    value,
                    unit,
                    observed_at,
                    fetch_succeeded: true,
                }
            })
            .collect())
    }
}
