//! Investing.com fetcher - primary source for the international markets
//!
//! Scrapes the London robusta and NYC arabica instrument pages. Investing
//! ships the last price in a `data-test` attribute, with a CSS-module class
//! as fallback when the markup shifts.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::FetchConfig;
use crate::sources::{get_page, parse_price, PriceFetcher};
use crate::types::{Market, RawReading, Source, Unit};

const ROBUSTA_URL: &str = "https://www.investing.com/commodities/london-coffee";
const ARABICA_URL: &str = "https://www.investing.com/commodities/us-coffee-c";

const MARKETS: &[Market] = &[Market::RobustaLondon, Market::ArabicaNewYork];

pub struct InvestingFetcher {
    max_retries: usize,
    retry_delay: Duration,
    price_re: Regex,
    price_fallback_re: Regex,
}

impl InvestingFetcher {
    pub fn new(cfg: &FetchConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            retry_delay: Duration::from_millis(cfg.retry_delay_ms),
            price_re: Regex::new(r#"data-test="instrument-price-last"[^>]*>([\d.,]+)<"#)
                .expect("static regex"),
            price_fallback_re: Regex::new(r#"instrument-price_last__[\w-]+"[^>]*>([\d.,]+)<"#)
                .expect("static regex"),
        }
    }

    fn extract_price(&self, html: &str) -> Option<f64> {
        self.price_re
            .captures(html)
            .or_else(|| self.price_fallback_re.captures(html))
            .and_then(|caps| parse_price(&caps[1]))
    }

    async fn fetch_market(
        &self,
        client: &reqwest::Client,
        market: Market,
        unit: Unit,
        url: &str,
    ) -> Result<Option<RawReading>> {
        let html = get_page(client, url, self.max_retries, self.retry_delay).await?;

        match self.extract_price(&html) {
            Some(value) => {
                info!(market = %market, value, "investing.com price found");
                Ok(Some(RawReading {
                    market,
                    source: Source::Investing,
                    value,
                    unit,
                    observed_at: Utc::now(),
                    fetch_succeeded: true,
                }))
            }
            None => {
                warn!(market = %market, "investing.com page fetched but no price matched");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl PriceFetcher for InvestingFetcher {
    fn source(&self) -> Source {
        Source::Investing
    }

    fn markets(&self) -> &[Market] {
        MARKETS
    }

    async fn fetch(&self, client: &reqwest::Client) -> Result<Vec<RawReading>> {
        let mut readings = Vec::new();

        if let Some(r) = self
            .fetch_market(client, Market::RobustaLondon, Unit::UsdPerTonne, ROBUSTA_URL)
            .await?
        {
            readings.push(r);
        }
        if let Some(r) = self
            .fetch_market(client, Market::ArabicaNewYork, Unit::CentsPerLb, ARABICA_URL)
            .await?
        {
            readings.push(r);
        }

        Ok(readings)
    }
}
