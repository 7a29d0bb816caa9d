//! CSV price history
//!
//! Append-only storage of reconciled prices, one row per market per run.
//! The engine reads the latest row per market to compute change-vs-last-run;
//! rows are never updated in place.

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::types::{Market, ReconciledPrice, Source};

const HISTORY_FILE: &str = "price_history.csv";

/// One reconciled price flattened for CSV storage
#[derive(Debug, Clone, Serialize, Deserialize)]
struct HistoryRecord {
    /// Unix millis
    computed_at: i64,
    market: String,
    value: f64,
    value_vnd: f64,
    confidence: f64,
    /// Contributing source keys joined with '|', empty when none
    sources: String,
    change_abs: Option<f64>,
    change_pct: Option<f64>,
    carried_forward: bool,
}

impl HistoryRecord {
    fn from_price(price: &ReconciledPrice) -> Self {
        Self {
            computed_at: price.computed_at.timestamp_millis(),
            market: price.market.key().to_string(),
            value: price.value,
            value_vnd: price.value_vnd,
            confidence: price.confidence,
            sources: price
                .sources
                .iter()
                .map(|s| s.key())
                .collect::<Vec<_>>()
                .join("|"),
            change_abs: price.change_abs,
            change_pct: price.change_pct,
            carried_forward: price.carried_forward,
        }
    }

    fn into_price(self) -> Option<ReconciledPrice> {
        let market = Market::from_key(&self.market)?;
        let computed_at = Utc.timestamp_millis_opt(self.computed_at).single()?;
        let sources = self
            .sources
            .split('|')
            .filter(|s| !s.is_empty())
            .filter_map(Source::from_key)
            .collect();

        Some(ReconciledPrice {
            market,
            value: self.value,
            unit: market.base_unit(),
            value_vnd: self.value_vnd,
            confidence: self.confidence,
            sources,
            change_abs: self.change_abs,
            change_pct: self.change_pct,
            carried_forward: self.carried_forward,
            computed_at,
        })
    }
}

pub struct PriceHistory {
    path: PathBuf,
}

impl PriceHistory {
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = data_dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create data dir {}", dir.display()))?;
        Ok(Self {
            path: dir.join(HISTORY_FILE),
        })
    }

    /// Append this run's reconciled prices
    pub fn append(&self, prices: &[ReconciledPrice]) -> Result<()> {
        let new_file = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        let mut writer = WriterBuilder::new().has_headers(new_file).from_writer(file);
        for price in prices {
            writer.serialize(HistoryRecord::from_price(price))?;
        }
        writer.flush()?;

        info!(count = prices.len(), path = %self.path.display(), "History appended");
        Ok(())
    }

    /// Most recent reconciled price per market, if any history exists
    pub fn latest(&self) -> Result<HashMap<Market, ReconciledPrice>> {
        let mut latest: HashMap<Market, ReconciledPrice> = HashMap::new();
        if !self.path.exists() {
            return Ok(latest);
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;

        for row in reader.deserialize::<HistoryRecord>() {
            // Skip rows that fail to parse; history must never block a run
            let Ok(record) = row else { continue };
            let Some(price) = record.into_price() else { continue };

            match latest.get(&price.market) {
                Some(kept) if kept.computed_at >= price.computed_at => {}
                _ => {
                    latest.insert(price.market, price);
                }
            }
        }
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Unit;
    use chrono::TimeZone;

    fn price(market: Market, value: f64, hour: u32) -> ReconciledPrice {
        ReconciledPrice {
            market,
            value,
            unit: market.base_unit(),
            value_vnd: value * 24_000.0,
            confidence: 0.9,
            sources: vec![Source::Investing, Source::Vietstock],
            change_abs: Some(10.0),
            change_pct: Some(0.2),
            carried_forward: false,
            computed_at: Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_append_and_latest_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let history = PriceHistory::new(dir.path()).unwrap();

        let original = price(Market::RobustaLondon, 5078.0, 8);
        history.append(&[original.clone()]).unwrap();

        let latest = history.latest().unwrap();
        assert_eq!(latest.len(), 1);
        let loaded = &latest[&Market::RobustaLondon];
        assert_eq!(loaded.value, 5078.0);
        assert_eq!(loaded.unit, Unit::UsdPerTonne);
        assert_eq!(loaded.sources, vec![Source::Investing, Source::Vietstock]);
        assert_eq!(loaded.computed_at, original.computed_at);
    }

    #[test]
    fn test_latest_picks_most_recent_run() {
        let dir = tempfile::tempdir().unwrap();
        let history = PriceHistory::new(dir.path()).unwrap();

        history.append(&[price(Market::RobustaLondon, 5000.0, 8)]).unwrap();
        history.append(&[price(Market::RobustaLondon, 5078.0, 17)]).unwrap();

        let latest = history.latest().unwrap();
        assert_eq!(latest[&Market::RobustaLondon].value, 5078.0);
    }

    #[test]
    fn test_latest_on_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let history = PriceHistory::new(dir.path()).unwrap();
        assert!(history.latest().unwrap().is_empty());
    }

    #[test]
    fn test_empty_sources_survive_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let history = PriceHistory::new(dir.path()).unwrap();

        let mut p = price(Market::RobustaVietnam, 58_000.0, 8);
        p.sources = Vec::new();
        p.confidence = 0.0;
        p.carried_forward = true;
        history.append(&[p]).unwrap();

        let latest = history.latest().unwrap();
        let loaded = &latest[&Market::RobustaVietnam];
        assert!(loaded.sources.is_empty());
        assert!(loaded.carried_forward);
        assert_eq!(loaded.confidence, 0.0);
    }
}
