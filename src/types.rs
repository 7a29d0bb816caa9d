//! Core types used throughout CafeBot
//!
//! Defines common data structures for markets, sources, readings and
//! reconciled prices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tracked coffee markets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Market {
    RobustaLondon,
    ArabicaNewYork,
    RobustaVietnam,
    ArabicaVietnam,
}

impl Market {
    /// Stable string key used in config, history files and logs
    pub fn key(&self) -> &'static str {
        match self {
            Market::RobustaLondon => "robusta_london",
            Market::ArabicaNewYork => "arabica_newyork",
            Market::RobustaVietnam => "robusta_vietnam",
            Market::ArabicaVietnam => "arabica_vietnam",
        }
    }

    /// English market name
    pub fn name(&self) -> &'static str {
        match self {
            Market::RobustaLondon => "Robusta Coffee (London)",
            Market::ArabicaNewYork => "Arabica Coffee (NYC)",
            Market::RobustaVietnam => "Robusta Vietnam Domestic",
            Market::ArabicaVietnam => "Arabica Vietnam Domestic",
        }
    }

    /// Vietnamese market name for the Telegram report
    pub fn name_vi(&self) -> &'static str {
        match self {
            Market::RobustaLondon => "Cà phê Robusta London",
            Market::ArabicaNewYork => "Cà phê Arabica New York",
            Market::RobustaVietnam => "Cà phê Robusta Việt Nam",
            Market::ArabicaVietnam => "Cà phê Arabica Việt Nam",
        }
    }

    /// Exchange ticker symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Market::RobustaLondon => "LCF",
            Market::ArabicaNewYork => "KC",
            Market::RobustaVietnam => "VN-ROB",
            Market::ArabicaVietnam => "VN-ARA",
        }
    }

    /// Unit the market is quoted in; reconciled values are stored in this unit
    pub fn base_unit(&self) -> Unit {
        match self {
            Market::RobustaLondon => Unit::UsdPerTonne,
            Market::ArabicaNewYork => Unit::CentsPerLb,
            Market::RobustaVietnam | Market::ArabicaVietnam => Unit::VndPerKg,
        }
    }

    /// Parse from config key
    pub fn from_key(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "robusta_london" | "robusta" => Some(Market::RobustaLondon),
            "arabica_newyork" | "arabica" => Some(Market::ArabicaNewYork),
            "robusta_vietnam" => Some(Market::RobustaVietnam),
            "arabica_vietnam" => Some(Market::ArabicaVietnam),
            _ => None,
        }
    }

    /// True for the Vietnam domestic markets (reported in a separate section)
    pub fn is_domestic(&self) -> bool {
        matches!(self, Market::RobustaVietnam | Market::ArabicaVietnam)
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Price source identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    Investing,
    CafeF,
    Vietstock,
    WebGia,
}

impl Source {
    /// Stable string key used in config and history files
    pub fn key(&self) -> &'static str {
        match self {
            Source::Investing => "investing",
            Source::CafeF => "cafef",
            Source::Vietstock => "vietstock",
            Source::WebGia => "webgia",
        }
    }

    pub fn from_key(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "investing" => Some(Source::Investing),
            "cafef" => Some(Source::CafeF),
            "vietstock" => Some(Source::Vietstock),
            "webgia" => Some(Source::WebGia),
            _ => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Investing => write!(f, "investing.com"),
            Source::CafeF => write!(f, "cafef.vn"),
            Source::Vietstock => write!(f, "vietstock.vn"),
            Source::WebGia => write!(f, "webgia.com"),
        }
    }
}

/// Quote unit for a price value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    UsdPerTonne,
    CentsPerLb,
    VndPerKg,
}

impl Unit {
    pub fn label(&self) -> &'static str {
        match self {
            Unit::UsdPerTonne => "USD/tonne",
            Unit::CentsPerLb => "cents/lb",
            Unit::VndPerKg => "VND/kg",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One source's raw observation for one market in one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawReading {
    pub market: Market,
    pub source: Source,
    pub value: f64,
    pub unit: Unit,
    /// When the source reported the price
    pub observed_at: DateTime<Utc>,
    /// False when the fetch attempt failed and the value is meaningless
    pub fetch_succeeded: bool,
}

/// The engine's single authoritative output per market per run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledPrice {
    pub market: Market,
    /// Price in the market's base unit
    pub value: f64,
    pub unit: Unit,
    /// Price converted to VND (per tonne for international markets,
    /// per kg for domestic ones)
    pub value_vnd: f64,
    /// Agreement/trust score in [0, 1]; 0 iff no usable reading this run
    pub confidence: f64,
    /// Contributing sources in priority order
    pub sources: Vec<Source>,
    /// Change vs the prior run's reconciled value, absent on first run
    pub change_abs: Option<f64>,
    pub change_pct: Option<f64>,
    /// True when the value was carried forward from the prior run
    pub carried_forward: bool,
    pub computed_at: DateTime<Utc>,
}
