//! Vietstock fetcher - international coffee quotes via a Vietnamese portal
//!
//! Vietstock lists commodities in table rows. Rows mentioning coffee are
//! scanned for numbers and classified by magnitude, the same way the site
//! mixes robusta (USD/tonne) and arabica (cents/lb) in one table.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::FetchConfig;
use crate::sources::{get_page, parse_price, PriceFetcher};
use crate::types::{Market, RawReading, Source, Unit};

const VIETSTOCK_URL: &str = "https://vietstock.vn/hang-hoa-ca-phe.htm";

const MARKETS: &[Market] = &[Market::RobustaLondon, Market::ArabicaNewYork];

pub struct VietstockFetcher {
    max_retries: usize,
    retry_delay: Duration,
    row_re: Regex,
    cell_re: Regex,
}

impl VietstockFetcher {
    pub fn new(cfg: &FetchConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            retry_delay: Duration::from_millis(cfg.retry_delay_ms),
            row_re: Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").expect("static regex"),
            cell_re: Regex::new(r">\s*([\d.,]+)\s*<").expect("static regex"),
        }
    }

    /// Classify a numeric cell by magnitude: robusta trades in thousands of
    /// USD/tonne, arabica in hundreds of cents/lb.
    fn classify(value: f64) -> Option<(Market, Unit)> {
        if (2000.0..=8000.0).contains(&value) {
            Some((Market::RobustaLondon, Unit::UsdPerTonne))
        } else if (100.0..=400.0).contains(&value) {
            Some((Market::ArabicaNewYork, Unit::CentsPerLb))
        } else {
            None
        }
    }

    fn extract_prices(&self, html: &str) -> Vec<(Market, Unit, f64)> {
        let mut found = Vec::new();

        for row in self.row_re.captures_iter(html) {
            let row_text = row[1].to_lowercase();
            if !row_text.contains("cà phê") && !row_text.contains("coffee") {
                continue;
            }

            for cell in self.cell_re.captures_iter(&row[1]) {
                let Some(value) = parse_price(&cell[1]) else { continue };
                let Some((market, unit)) = Self::classify(value) else { continue };

                if !found.iter().any(|(m, _, _)| *m == market) {
                    found.push((market, unit, value));
                }
            }
        }
        found
    }
}

#[async_trait]
impl PriceFetcher for VietstockFetcher {
    fn source(&self) -> Source {
        Source::Vietstock
    }

    fn markets(&self) -> &[Market] {
        MARKETS
    }

    async fn fetch(&self, client: &reqwest::Client) -> Result<Vec<RawReading>> {
        let html = get_page(client, VIETSTOCK_URL, self.max_retries, self.retry_delay).await?;

        let prices = self.extract_prices(&html);
        if prices.is_empty() {
            warn!("vietstock.vn page fetched but no coffee rows matched");
        }

        let observed_at = Utc::now();
        Ok(prices
            .into_iter()
            .map(|(market, unit, value)| {
                info!(market = %market, value, "vietstock.vn price found");
                RawReading {
                    market,
                    source: Source::Vietstock,
                    value,
                    unit,
                    observed_at,
                    fetch_succeeded: true,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> VietstockFetcher {
        VietstockFetcher::new(&FetchConfig {
            timeout_secs: 15,
            max_retries: 1,
            retry_delay_ms: 0,
        })
    }

    #[test]
    fn test_extract_both_markets_from_table() {
        let html = r#"
            <table>
              <tr><td>Cà phê Robusta</td><td>5,070</td><td>+0.4%</td></tr>
              <tr><td>Cà phê Arabica</td><td>245.5</td><td>-1.2%</td></tr>
              <tr><td>Cacao</td><td>9,100</td></tr>
            </table>"#;

        let prices = fetcher().extract_prices(html);
        assert_eq!(prices.len(), 2);
        assert!(prices.contains(&(Market::RobustaLondon, Unit::UsdPerTonne, 5070.0)));
        assert!(prices.contains(&(Market::ArabicaNewYork, Unit::CentsPerLb, 245.5)));
    }

    #[test]
    fn test_non_coffee_rows_ignored() {
        let html = r#"<tr><td>Cacao</td><td>5,100</td></tr>"#;
        assert!(fetcher().extract_prices(html).is_empty());
    }

    #[test]
    fn test_duplicate_market_keeps_first() {
        let html = r#"
            <tr><td>coffee robusta</td><td>5,070</td><td>5,090</td></tr>"#;
        let prices = fetcher().extract_prices(html);
        assert_eq!(prices, vec![(Market::RobustaLondon, Unit::UsdPerTonne, 5070.0)]);
    }
}
