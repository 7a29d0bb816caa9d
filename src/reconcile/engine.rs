//! Reconciliation engine - combines per-market readings into one price
//!
//! Pure computation over an already-collected batch of readings: no I/O,
//! no clock, no shared state. `computed_at` is an input, so identical
//! inputs always produce identical output.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::convert;
use crate::reconcile::Rejection;
use crate::types::{Market, RawReading, ReconciledPrice, Source};

/// Static reliability metadata for one source
#[derive(Debug, Clone)]
pub struct SourceProfile {
    /// Base trust weight in (0, 1]; a lone reading gets exactly this score
    pub trust_weight: f64,
    /// Fallback order, lower is preferred
    pub priority: u32,
    /// Readings older than this (relative to computed_at) are discarded
    pub staleness_secs: i64,
}

/// Per-market sanity bounds and the estimate used when all sources fail
/// and no prior value exists. All values are in the market's base unit.
#[derive(Debug, Clone)]
pub struct MarketLimits {
    pub min: f64,
    pub max: f64,
    pub placeholder: f64,
}

/// Immutable engine parameters for one run, assembled from config at
/// startup and passed in. The engine never reads ambient state.
#[derive(Debug, Clone)]
pub struct ReconcileParams {
    /// Agreement band as a percentage (2.0 = readings within 2% agree)
    pub tolerance_pct: f64,
    /// Added to the top source's weight when another source agrees
    pub agreement_bonus: f64,
    /// Subtracted from the top source's weight when no source agrees
    pub disagreement_penalty: f64,
    /// Readings further than this ratio from the prior value are discarded
    pub max_prior_ratio: f64,
    /// USD -> VND exchange rate
    pub usd_to_vnd: f64,
    pub sources: HashMap<Source, SourceProfile>,
    pub limits: HashMap<Market, MarketLimits>,
}

/// A candidate that survived filtering, normalized to the market base unit
#[derive(Debug, Clone)]
struct Candidate {
    source: Source,
    value: f64,
    priority: u32,
    trust_weight: f64,
}

pub struct Reconciler {
    params: ReconcileParams,
}

impl Reconciler {
    pub fn new(params: ReconcileParams) -> Self {
        Self { params }
    }

    /// Reconcile every tracked market for one run, in configuration order.
    ///
    /// Always returns one price per market so the downstream report can
    /// render a stable set of rows.
    pub fn reconcile_all(
        &self,
        markets: &[Market],
        readings: &HashMap<Market, Vec<RawReading>>,
        priors: &HashMap<Market, ReconciledPrice>,
        computed_at: DateTime<Utc>,
    ) -> Vec<ReconciledPrice> {
        markets
            .iter()
            .map(|&market| {
                let batch = readings.get(&market).map(Vec::as_slice).unwrap_or(&[]);
                self.reconcile(market, batch, priors.get(&market), computed_at)
            })
            .collect()
    }

    /// Reconcile one market. Never fails: on total data absence this emits
    /// a zero-confidence carry-forward (or the configured placeholder).
    pub fn reconcile(
        &self,
        market: Market,
        readings: &[RawReading],
        prior: Option<&ReconciledPrice>,
        computed_at: DateTime<Utc>,
    ) -> ReconciledPrice {
        let candidates = self.filter_candidates(market, readings, prior, computed_at);

        let (value, confidence, sources, carried_forward) = match candidates.len() {
            0 => self.fallback(market, prior),
            1 => {
                let c = &candidates[0];
                (c.value, c.trust_weight.clamp(0.0, 1.0), vec![c.source], false)
            }
            _ => self.resolve_multi(market, &candidates),
        };

        let (change_abs, change_pct) = match prior {
            Some(p) if p.value != 0.0 => {
                let abs = value - p.value;
                (Some(abs), Some(abs / p.value * 100.0))
            }
            Some(p) => (Some(value - p.value), None),
            None => (None, None),
        };

        let unit = market.base_unit();
        ReconciledPrice {
            market,
            value,
            unit,
            value_vnd: convert::to_vnd(value, unit, self.params.usd_to_vnd),
            confidence,
            sources,
            change_abs,
            change_pct,
            carried_forward,
            computed_at,
        }
    }

    /// Step 1: drop failed fetches, dedupe per source, normalize to the
    /// market base unit, then apply sanity, prior-ratio and staleness
    /// rules. Returns survivors sorted by source priority.
    fn filter_candidates(
        &self,
        market: Market,
        readings: &[RawReading],
        prior: Option<&ReconciledPrice>,
        computed_at: DateTime<Utc>,
    ) -> Vec<Candidate> {
        // Most recent reading per source wins
        let mut latest: HashMap<Source, &RawReading> = HashMap::new();
        for reading in readings {
            if !reading.fetch_succeeded {
                self.reject(market, reading.source, Rejection::SourceUnavailable);
                continue;
            }
            latest
                .entry(reading.source)
                .and_modify(|kept| {
                    if reading.observed_at > kept.observed_at {
                        *kept = reading;
                    }
                })
                .or_insert(reading);
        }

        let mut candidates = Vec::with_capacity(latest.len());
        for reading in latest.into_values() {
            let Some(profile) = self.params.sources.get(&reading.source) else {
                self.reject(market, reading.source, Rejection::UnknownSource);
                continue;
            };

            let age_secs = (computed_at - reading.observed_at).num_seconds();
            if age_secs > profile.staleness_secs {
                self.reject(
                    market,
                    reading.source,
                    Rejection::Stale {
                        age_secs,
                        max_secs: profile.staleness_secs,
                    },
                );
                continue;
            }

            let value =
                convert::convert(reading.value, reading.unit, market.base_unit(), self.params.usd_to_vnd);

            // Written so NaN fails: every comparison with NaN is false, so
            // the happy path must be the asserted one
            if let Some(limits) = self.params.limits.get(&market) {
                if !(value > 0.0 && value >= limits.min && value <= limits.max) {
                    self.reject(
                        market,
                        reading.source,
                        Rejection::ImplausibleValue {
                            value,
                            min: limits.min,
                            max: limits.max,
                        },
                    );
                    continue;
                }
            } else if !(value.is_finite() && value > 0.0) {
                self.reject(
                    market,
                    reading.source,
                    Rejection::ImplausibleValue {
                        value,
                        min: 0.0,
                        max: f64::INFINITY,
                    },
                );
                continue;
            }

            // A zero prior (placeholder that never saw data) carries no
            // magnitude information, so it must not reject anything
            if let Some(p) = prior.filter(|p| p.value > 0.0) {
                let ratio = if value > p.value { value / p.value } else { p.value / value };
                if ratio > self.params.max_prior_ratio {
                    self.reject(
                        market,
                        reading.source,
                        Rejection::FarFromPrior { value, prior: p.value },
                    );
                    continue;
                }
            }

            candidates.push(Candidate {
                source: reading.source,
                value,
                priority: profile.priority,
                trust_weight: profile.trust_weight,
            });
        }

        // Priority order; source key breaks ties so output is deterministic
        candidates.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.source.key().cmp(b.source.key()))
        });
        candidates
    }

    /// Step 4: the highest-priority reading always supplies the value;
    /// agreement with any other reading raises confidence, unresolved
    /// conflict lowers it. Disagreeing sources are never averaged.
    fn resolve_multi(&self, market: Market, candidates: &[Candidate]) -> (f64, f64, Vec<Source>, bool) {
        let top = &candidates[0];
        let tolerance = self.params.tolerance_pct / 100.0;

        // Inclusive: a reading exactly at the band edge counts as agreeing
        let agrees = candidates[1..]
            .iter()
            .any(|c| ((c.value - top.value) / top.value).abs() <= tolerance);

        let confidence = if agrees {
            (top.trust_weight + self.params.agreement_bonus).min(1.0)
        } else {
            debug!(
                market = %market,
                top_source = %top.source,
                top_value = top.value,
                "no cross-source agreement within {}%", self.params.tolerance_pct
            );
            top.trust_weight - self.params.disagreement_penalty
        };

        let sources = candidates.iter().map(|c| c.source).collect();
        (top.value, confidence.clamp(0.0, 1.0), sources, false)
    }

    /// Step 2: zero usable readings. Carry the prior value forward when one
    /// exists, otherwise fall back to the configured placeholder estimate.
    fn fallback(&self, market: Market, prior: Option<&ReconciledPrice>) -> (f64, f64, Vec<Source>, bool) {
        match prior {
            Some(p) => {
                warn!(market = %market, value = p.value, "no usable readings, carrying prior value forward");
                (p.value, 0.0, Vec::new(), true)
            }
            None => {
                let placeholder = self
                    .params
                    .limits
                    .get(&market)
                    .map(|l| l.placeholder)
                    .unwrap_or(0.0);
                warn!(market = %market, placeholder, "no usable readings and no prior, using placeholder");
                (placeholder, 0.0, Vec::new(), false)
            }
        }
    }

    fn reject(&self, market: Market, source: Source, why: Rejection) {
        warn!(market = %market, source = %source, "reading excluded: {}", why);
    }
}
