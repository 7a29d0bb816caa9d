//! Price source implementations (Investing.com, CafeF, Vietstock, WebGia)
//!
//! Each fetcher scrapes one site and yields raw readings for the markets it
//! covers. Fetchers run in parallel with independent timeouts; a failed
//! fetch becomes a `fetch_succeeded = false` reading, never a run failure.

mod cafef;
mod investing;
mod vietstock;
mod webgia;

pub use cafef::CafeFFetcher;
pub use investing::InvestingFetcher;
pub use vietstock::VietstockFetcher;
pub use webgia::WebGiaFetcher;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::FetchConfig;
use crate::types::{Market, RawReading, Source};

/// Browser user agents rotated per client to avoid trivial blocking
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1.2 Safari/605.1.15",
];

/// Responses shorter than this are treated as block pages or errors
const MIN_CONTENT_LEN: usize = 500;

/// Trait for site-specific price fetchers
#[async_trait]
pub trait PriceFetcher: Send + Sync {
    /// Source this fetcher reads from
    fn source(&self) -> Source;

    /// Markets this fetcher can produce readings for
    fn markets(&self) -> &[Market];

    /// Fetch and parse the site. Returns zero or more readings; parse
    /// misses are fine, transport errors should bubble up.
    async fn fetch(&self, client: &reqwest::Client) -> Result<Vec<RawReading>>;
}

/// Build the shared HTTP client with browser-like headers
pub fn build_client(cfg: &FetchConfig) -> Result<reqwest::Client> {
    let agent = USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0]);

    reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .user_agent(agent)
        .build()
        .context("Failed to create HTTP client")
}

/// GET a page with bounded retries and a minimum-content check
pub(crate) async fn get_page(
    client: &reqwest::Client,
    url: &str,
    max_retries: usize,
    retry_delay: Duration,
) -> Result<String> {
    for attempt in 1..=max_retries {
        info!(url = %url, attempt, "Fetching page");

        match client.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                let body = response.text().await.context("Failed to read response body")?;
                if body.len() >= MIN_CONTENT_LEN {
                    return Ok(body);
                }
                warn!(url = %url, len = body.len(), "Response too short, likely blocked");
            }
            Ok(response) => {
                warn!(url = %url, status = %response.status(), "Request failed");
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Request error");
            }
        }

        if attempt < max_retries {
            tokio::time::sleep(retry_delay).await;
        }
    }
    bail!("Failed to fetch {} after {} attempts", url, max_retries)
}

/// Run all fetchers in parallel and group readings by market.
///
/// Sources that error contribute `fetch_succeeded = false` readings for
/// every market they cover so the engine can see the failed attempts.
pub async fn fetch_all(
    fetchers: Vec<Arc<dyn PriceFetcher>>,
    client: &reqwest::Client,
    cfg: &FetchConfig,
) -> HashMap<Market, Vec<RawReading>> {
    let mut set = JoinSet::new();
    let timeout = Duration::from_secs(cfg.timeout_secs * cfg.max_retries as u64 + 5);

    for fetcher in fetchers {
        let client = client.clone();
        set.spawn(async move {
            let source = fetcher.source();
            let markets = fetcher.markets().to_vec();
            let result = tokio::time::timeout(timeout, fetcher.fetch(&client)).await;
            (source, markets, result)
        });
    }

    let mut readings: HashMap<Market, Vec<RawReading>> = HashMap::new();
    while let Some(joined) = set.join_next().await {
        let Ok((source, markets, result)) = joined else {
            warn!("Fetch task panicked, skipping source");
            continue;
        };

        match result {
            Ok(Ok(batch)) => {
                info!(source = %source, count = batch.len(), "Source produced readings");
                for reading in batch {
                    readings.entry(reading.market).or_default().push(reading);
                }
            }
            Ok(Err(e)) => {
                warn!(source = %source, error = %e, "Source fetch failed");
                push_failures(&mut readings, source, &markets);
            }
            Err(_) => {
                warn!(source = %source, "Source fetch timed out");
                push_failures(&mut readings, source, &markets);
            }
        }
    }
    readings
}

fn push_failures(readings: &mut HashMap<Market, Vec<RawReading>>, source: Source, markets: &[Market]) {
    let observed_at = Utc::now();
    for &market in markets {
        readings.entry(market).or_default().push(RawReading {
            market,
            source,
            value: 0.0,
            unit: market.base_unit(),
            observed_at,
            fetch_succeeded: false,
        });
    }
}

/// Parse a price out of scraped text, handling both "5,078.50" and the
/// Vietnamese "108.000" / "5.078,5" groupings.
pub(crate) fn parse_price(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let last_dot = cleaned.rfind('.');
    let last_comma = cleaned.rfind(',');

    let normalized = match (last_dot, last_comma) {
        // Both present: the rightmost one is the decimal separator
        (Some(d), Some(c)) if d > c => cleaned.replace(',', ""),
        (Some(_), Some(_)) => cleaned.replace('.', "").replace(',', "."),
        // One separator: treat as thousands grouping when followed by
        // exactly three digits, otherwise as a decimal point
        (Some(d), None) => {
            if cleaned.len() - d - 1 == 3 && cleaned[..d].len() <= 3 {
                cleaned.replace('.', "")
            } else if cleaned.matches('.').count() > 1 {
                cleaned.replace('.', "")
            } else {
                cleaned
            }
        }
        (None, Some(c)) => {
            if cleaned.len() - c - 1 == 3 || cleaned.matches(',').count() > 1 {
                cleaned.replace(',', "")
            } else {
                cleaned.replace(',', ".")
            }
        }
        (None, None) => cleaned,
    };

    normalized.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubFetcher {
        source: Source,
        markets: Vec<Market>,
        fail: bool,
    }

    #[async_trait]
    impl PriceFetcher for StubFetcher {
        fn source(&self) -> Source {
            self.source
        }

        fn markets(&self) -> &[Market] {
            &self.markets
        }

        async fn fetch(&self, _client: &reqwest::Client) -> Result<Vec<RawReading>> {
            if self.fail {
                bail!("connection refused");
            }
            Ok(self
                .markets
                .iter()
                .map(|&market| RawReading {
                    market,
                    source: self.source,
                    value: 5078.0,
                    unit: market.base_unit(),
                    observed_at: Utc::now(),
                    fetch_succeeded: true,
                })
                .collect())
        }
    }

    #[test]
    fn test_fetch_all_failed_source_becomes_failure_readings() {
        tokio_test::block_on(async {
            let cfg = FetchConfig { timeout_secs: 2, max_retries: 1, retry_delay_ms: 0 };
            let client = build_client(&cfg).unwrap();
            let fetchers: Vec<Arc<dyn PriceFetcher>> = vec![
                Arc::new(StubFetcher {
                    source: Source::Investing,
                    markets: vec![Market::RobustaLondon, Market::ArabicaNewYork],
                    fail: false,
                }),
                Arc::new(StubFetcher {
                    source: Source::Vietstock,
                    markets: vec![Market::RobustaLondon],
                    fail: true,
                }),
            ];

            let readings = fetch_all(fetchers, &client, &cfg).await;

            // The failing source still shows up, flagged as a failed attempt
            let robusta = &readings[&Market::RobustaLondon];
            assert_eq!(robusta.len(), 2);
            let failed = robusta.iter().find(|r| r.source == Source::Vietstock).unwrap();
            assert!(!failed.fetch_succeeded);
            let ok = robusta.iter().find(|r| r.source == Source::Investing).unwrap();
            assert!(ok.fetch_succeeded);

            assert_eq!(readings[&Market::ArabicaNewYork].len(), 1);
        });
    }

    #[test]
    fn test_parse_price_us_format() {
        assert_eq!(parse_price("5,078.50"), Some(5078.5));
        assert_eq!(parse_price("$4,250"), Some(4250.0));
        assert_eq!(parse_price("245.75"), Some(245.75));
    }

    #[test]
    fn test_parse_price_vietnamese_format() {
        assert_eq!(parse_price("108.000"), Some(108_000.0));
        assert_eq!(parse_price("5.078,5"), Some(5078.5));
        assert_eq!(parse_price("1.234.567"), Some(1_234_567.0));
    }

    #[test]
    fn test_parse_price_rejects_garbage() {
        assert_eq!(parse_price("n/a"), None);
        assert_eq!(parse_price(""), None);
    }
}
