//! CafeF fetcher - Vietnam domestic robusta prices
//!
//! CafeF renders domestic prices inside price/gia classed elements. We pick
//! the first value that lands in a plausible VND/kg range; the engine's
//! sanity bounds do the strict filtering.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::FetchConfig;
use crate::sources::{get_page, parse_price, PriceFetcher};
use crate::types::{Market, RawReading, Source, Unit};

const CAFEF_URL: &str = "https://cafef.vn/hang-hoa/ca-phe-robusta.chn";

// Coarse pre-filter only; precise bounds live in config
const VND_KG_MIN: f64 = 30_000.0;
const VND_KG_MAX: f64 = 200_000.0;

const MARKETS: &[Market] = &[Market::RobustaVietnam];

pub struct CafeFFetcher {
    max_retries: usize,
    retry_delay: Duration,
    price_re: Regex,
}

impl CafeFFetcher {
    pub fn new(cfg: &FetchConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            retry_delay: Duration::from_millis(cfg.retry_delay_ms),
            price_re: Regex::new(r#"class="[^"]*(?:price|gia)[^"]*"[^>]*>\s*([\d.,]+)"#)
                .expect("static regex"),
        }
    }

    fn extract_price(&self, html: &str) -> Option<f64> {
        for caps in self.price_re.captures_iter(html) {
            if let Some(value) = parse_price(&caps[1]) {
                if (VND_KG_MIN..=VND_KG_MAX).contains(&value) {
                    return Some(value);
                }
            }
        }
        None
    }
}

#[async_trait]
impl PriceFetcher for CafeFFetcher {
    fn source(&self) -> Source {
        Source::CafeF
    }

    fn markets(&self) -> &[Market] {
        MARKETS
    }

    async fn fetch(&self, client: &reqwest::Client) -> Result<Vec<RawReading>> {
        let html = get_page(client, CAFEF_URL, self.max_retries, self.retry_delay).await?;

        match self.extract_price(&html) {
            Some(value) => {
                info!(value, "cafef.vn domestic robusta price found");
                Ok(vec![RawReading {
                    market: Market::RobustaVietnam,
                    source: Source::CafeF,
                    value,
                    unit: Unit::VndPerKg,
                    observed_at: Utc::now(),
                    fetch_succeeded: true,
                }])
            }
            None => {
                warn!("cafef.vn page fetched but no plausible price matched");
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> CafeFFetcher {
        CafeFFetcher::new(&FetchConfig {
            timeout_secs: 15,
            max_retries: 1,
            retry_delay_ms: 0,
        })
    }

    #[test]
    fn test_extract_vnd_price() {
        let html = r#"<div class="box-price"><span class="gia-value">108.000</span> VND/kg</div>"#;
        assert_eq!(fetcher().extract_price(html), Some(108_000.0));
    }

    #[test]
    fn test_skips_values_outside_vnd_range() {
        // Index values and percentages must not be mistaken for prices
        let html = r#"<span class="price">1.25</span><span class="gia">58.500</span>"#;
        assert_eq!(fetcher().extract_price(html), Some(58_500.0));
    }

    #[test]
    fn test_no_match_returns_none() {
        assert_eq!(fetcher().extract_price("<html>maintenance</html>"), None);
    }
}
