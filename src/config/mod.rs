//! Configuration management for CafeBot
//!
//! Loads from TOML/YAML files + environment variables via .env. Built once
//! at startup into an immutable `AppConfig`; everything downstream receives
//! it as a parameter.

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;

use crate::reconcile::{MarketLimits, ReconcileParams, SourceProfile};
use crate::types::{Market, Source};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub fetch: FetchConfig,
    pub reconcile: ReconcileConfig,
    /// Per-source reliability profiles, keyed by source key
    pub sources: HashMap<String, SourceProfileConfig>,
    /// Per-market sanity bounds, keyed by market key
    pub limits: HashMap<String, MarketLimitsConfig>,
    pub exchange: ExchangeConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Bot version tag for logging
    pub tag: String,
    /// Markets to track, in report order
    pub markets: Vec<String>,
    /// Dry run mode (print the report instead of sending it)
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Per-source request timeout in seconds
    pub timeout_secs: u64,
    /// Retry attempts per source
    pub max_retries: usize,
    /// Delay between retry attempts in milliseconds
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileConfig {
    /// Cross-source agreement band in percent
    pub tolerance_pct: f64,
    /// Confidence bonus when another source agrees with the top one
    pub agreement_bonus: f64,
    /// Confidence penalty when no source agrees with the top one
    pub disagreement_penalty: f64,
    /// Readings further than this ratio from the prior value are discarded
    pub max_prior_ratio: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceProfileConfig {
    pub enabled: bool,
    pub trust_weight: f64,
    pub priority: u32,
    pub staleness_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketLimitsConfig {
    pub min: f64,
    pub max: f64,
    /// Estimate reported (at zero confidence) when no data and no prior exist
    pub placeholder: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    /// USD -> VND conversion rate for report values
    pub usd_to_vnd: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Directory holding the price history CSV
    pub data_dir: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Bot defaults
            .set_default("bot.tag", env!("CARGO_PKG_VERSION"))?
            .set_default("bot.dry_run", true)?
            .set_default(
                "bot.markets",
                vec!["robusta_london", "arabica_newyork", "robusta_vietnam"],
            )?
            // Fetch defaults
            .set_default("fetch.timeout_secs", 15)?
            .set_default("fetch.max_retries", 3)?
            .set_default("fetch.retry_delay_ms", 2000)?
            // Reconciliation defaults
            .set_default("reconcile.tolerance_pct", 2.0)?
            .set_default("reconcile.agreement_bonus", 0.15)?
            .set_default("reconcile.disagreement_penalty", 0.30)?
            .set_default("reconcile.max_prior_ratio", 10.0)?
            // Source profiles: investing.com is primary, Vietnamese portals
            // are fallbacks in this order
            .set_default("sources.investing.enabled", true)?
            .set_default("sources.investing.trust_weight", 0.9)?
            .set_default("sources.investing.priority", 1)?
            .set_default("sources.investing.staleness_secs", 3600)?
            .set_default("sources.vietstock.enabled", true)?
            .set_default("sources.vietstock.trust_weight", 0.7)?
            .set_default("sources.vietstock.priority", 2)?
            .set_default("sources.vietstock.staleness_secs", 3600)?
            .set_default("sources.cafef.enabled", true)?
            .set_default("sources.cafef.trust_weight", 0.7)?
            .set_default("sources.cafef.priority", 2)?
            .set_default("sources.cafef.staleness_secs", 3600)?
            .set_default("sources.webgia.enabled", true)?
            .set_default("sources.webgia.trust_weight", 0.5)?
            .set_default("sources.webgia.priority", 4)?
            .set_default("sources.webgia.staleness_secs", 7200)?
            // Sanity bounds per market, in the market base unit
            .set_default("limits.robusta_london.min", 2000.0)?
            .set_default("limits.robusta_london.max", 8000.0)?
            .set_default("limits.robusta_london.placeholder", 4250.0)?
            .set_default("limits.arabica_newyork.min", 100.0)?
            .set_default("limits.arabica_newyork.max", 400.0)?
            .set_default("limits.arabica_newyork.placeholder", 245.0)?
            .set_default("limits.robusta_vietnam.min", 45000.0)?
            .set_default("limits.robusta_vietnam.max", 120000.0)?
            .set_default("limits.robusta_vietnam.placeholder", 58000.0)?
            .set_default("limits.arabica_vietnam.min", 45000.0)?
            .set_default("limits.arabica_vietnam.max", 150000.0)?
            .set_default("limits.arabica_vietnam.placeholder", 62000.0)?
            // Exchange + history defaults
            .set_default("exchange.usd_to_vnd", 24000.0)?
            .set_default("history.data_dir", "./data")?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (CAFEBOT_*)
            .add_source(Environment::with_prefix("CAFEBOT").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Tracked markets in report order
    pub fn markets(&self) -> Result<Vec<Market>> {
        self.bot
            .markets
            .iter()
            .map(|key| Market::from_key(key).with_context(|| format!("Unknown market key '{}'", key)))
            .collect()
    }

    /// Enabled sources with their parsed keys
    pub fn enabled_sources(&self) -> Result<Vec<Source>> {
        let mut sources = Vec::new();
        for (key, profile) in &self.sources {
            if !profile.enabled {
                continue;
            }
            let source =
                Source::from_key(key).with_context(|| format!("Unknown source key '{}'", key))?;
            sources.push(source);
        }
        sources.sort_by_key(|s| self.sources[s.key()].priority);
        Ok(sources)
    }

    /// Assemble the immutable engine parameters for this run.
    ///
    /// Callers must run `validate()` first; missing entries here mean the
    /// config is unusable.
    pub fn reconcile_params(&self) -> Result<ReconcileParams> {
        let mut sources = HashMap::new();
        for (key, profile) in &self.sources {
            if !profile.enabled {
                continue;
            }
            let source =
                Source::from_key(key).with_context(|| format!("Unknown source key '{}'", key))?;
            sources.insert(
                source,
                SourceProfile {
                    trust_weight: profile.trust_weight,
                    priority: profile.priority,
                    staleness_secs: profile.staleness_secs,
                },
            );
        }

        let mut limits = HashMap::new();
        for (key, bounds) in &self.limits {
            let market =
                Market::from_key(key).with_context(|| format!("Unknown market key '{}'", key))?;
            limits.insert(
                market,
                MarketLimits {
                    min: bounds.min,
                    max: bounds.max,
                    placeholder: bounds.placeholder,
                },
            );
        }

        Ok(ReconcileParams {
            tolerance_pct: self.reconcile.tolerance_pct,
            agreement_bonus: self.reconcile.agreement_bonus,
            disagreement_penalty: self.reconcile.disagreement_penalty,
            max_prior_ratio: self.reconcile.max_prior_ratio,
            usd_to_vnd: self.exchange.usd_to_vnd,
            sources,
            limits,
        })
    }

    /// Startup validation. The one place that fails hard: a run with
    /// missing trust weights or sanity bounds cannot compute meaningful
    /// confidence, so bail before touching the network.
    pub fn validate(&self) -> Result<()> {
        if self.bot.markets.is_empty() {
            bail!("bot.markets must name at least one market");
        }

        for key in &self.bot.markets {
            let Some(market) = Market::from_key(key) else {
                bail!("Unknown market key '{}' in bot.markets", key);
            };
            if !self.limits.contains_key(market.key()) {
                bail!("Missing limits.{} (sanity range + placeholder)", market.key());
            }
        }

        for (key, bounds) in &self.limits {
            if Market::from_key(key).is_none() {
                bail!("Unknown market key '{}' in limits", key);
            }
            if bounds.min <= 0.0 || bounds.max <= bounds.min {
                bail!("limits.{} requires 0 < min < max", key);
            }
            // A placeholder outside the sanity range (zero included) would
            // persist a value the engine itself rejects
            if bounds.placeholder < bounds.min || bounds.placeholder > bounds.max {
                bail!("limits.{}.placeholder must lie within min..max", key);
            }
        }

        let mut any_enabled = false;
        for (key, profile) in &self.sources {
            if Source::from_key(key).is_none() {
                bail!("Unknown source key '{}' in sources", key);
            }
            if !profile.enabled {
                continue;
            }
            any_enabled = true;
            if profile.trust_weight <= 0.0 || profile.trust_weight > 1.0 {
                bail!("sources.{}.trust_weight must be in (0, 1]", key);
            }
            // The disagreement floor must stay above zero so confidence 0
            // keeps meaning "no usable data"
            if self.reconcile.disagreement_penalty >= profile.trust_weight {
                bail!(
                    "reconcile.disagreement_penalty ({}) must be below sources.{}.trust_weight ({})",
                    self.reconcile.disagreement_penalty,
                    key,
                    profile.trust_weight
                );
            }
        }
        if !any_enabled {
            bail!("At least one source must be enabled");
        }

        if self.reconcile.tolerance_pct <= 0.0 {
            bail!("reconcile.tolerance_pct must be positive");
        }
        if self.reconcile.max_prior_ratio <= 1.0 {
            bail!("reconcile.max_prior_ratio must be above 1");
        }
        if self.exchange.usd_to_vnd <= 0.0 {
            bail!("exchange.usd_to_vnd must be positive");
        }

        Ok(())
    }

    /// Validate required environment variables (skipped in dry-run mode)
    pub fn validate_env(&self) -> Result<()> {
        if self.bot.dry_run {
            return Ok(());
        }

        for var in ["TELEGRAM_BOT_TOKEN", "TELEGRAM_CHAT_ID"] {
            if std::env::var(var).is_err() {
                bail!("Required environment variable {} is not set", var);
            }
        }
        Ok(())
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "bot={} markets={:?} dry_run={} tolerance={:.1}% usd_vnd={:.0}",
            self.bot.tag,
            self.bot.markets,
            self.bot.dry_run,
            self.reconcile.tolerance_pct,
            self.exchange.usd_to_vnd
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        let mut sources = HashMap::new();
        sources.insert(
            "investing".to_string(),
            SourceProfileConfig { enabled: true, trust_weight: 0.9, priority: 1, staleness_secs: 3600 },
        );
        let mut limits = HashMap::new();
        limits.insert(
            "robusta_london".to_string(),
            MarketLimitsConfig { min: 2000.0, max: 8000.0, placeholder: 4250.0 },
        );
        AppConfig {
            bot: BotConfig {
                tag: "test".to_string(),
                markets: vec!["robusta_london".to_string()],
                dry_run: true,
            },
            fetch: FetchConfig { timeout_secs: 15, max_retries: 3, retry_delay_ms: 2000 },
            reconcile: ReconcileConfig {
                tolerance_pct: 2.0,
                agreement_bonus: 0.15,
                disagreement_penalty: 0.3,
                max_prior_ratio: 10.0,
            },
            sources,
            limits,
            exchange: ExchangeConfig { usd_to_vnd: 24000.0 },
            history: HistoryConfig { data_dir: "./data".to_string() },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_missing_limits_is_fatal() {
        let mut cfg = base_config();
        cfg.limits.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_trust_weight_out_of_range_is_fatal() {
        let mut cfg = base_config();
        cfg.sources.get_mut("investing").unwrap().trust_weight = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_penalty_above_weight_is_fatal() {
        let mut cfg = base_config();
        cfg.reconcile.disagreement_penalty = 0.95;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_placeholder_outside_bounds_is_fatal() {
        let mut cfg = base_config();
        cfg.limits.get_mut("robusta_london").unwrap().placeholder = 0.0;
        assert!(cfg.validate().is_err());

        cfg.limits.get_mut("robusta_london").unwrap().placeholder = 9000.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_unknown_market_key_is_fatal() {
        let mut cfg = base_config();
        cfg.bot.markets.push("cocoa_london".to_string());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_reconcile_params_assembly() {
        let cfg = base_config();
        let params = cfg.reconcile_params().unwrap();
        assert_eq!(params.sources.len(), 1);
        assert_eq!(params.limits.len(), 1);
        assert_eq!(params.tolerance_pct, 2.0);
    }

    #[test]
    fn test_market_order_preserved() {
        let mut cfg = base_config();
        cfg.bot.markets = vec!["arabica_newyork".to_string(), "robusta_london".to_string()];
        let markets = cfg.markets().unwrap();
        assert_eq!(markets, vec![crate::types::Market::ArabicaNewYork, crate::types::Market::RobustaLondon]);
    }
}
