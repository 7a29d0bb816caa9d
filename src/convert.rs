//! Currency and unit normalization
//!
//! Pure conversion functions used by the reconciliation engine when
//! comparing readings quoted in different units, and by the report
//! formatter for VND display values.

use crate::types::Unit;

/// Pounds per metric tonne. Fixed here once; every lb<->tonne conversion
/// in the codebase must go through this constant.
pub const LBS_PER_TONNE: f64 = 2204.6;

/// Kilograms per metric tonne.
pub const KG_PER_TONNE: f64 = 1000.0;

/// cents/lb -> USD/tonne
pub fn cents_lb_to_usd_tonne(cents_per_lb: f64) -> f64 {
    cents_per_lb * LBS_PER_TONNE / 100.0
}

/// USD/tonne -> cents/lb
pub fn usd_tonne_to_cents_lb(usd_per_tonne: f64) -> f64 {
    usd_per_tonne * 100.0 / LBS_PER_TONNE
}

/// USD -> VND at the configured exchange rate
pub fn usd_to_vnd(usd: f64, rate: f64) -> f64 {
    usd * rate
}

/// VND/kg -> USD/tonne at the configured exchange rate
pub fn vnd_kg_to_usd_tonne(vnd_per_kg: f64, rate: f64) -> f64 {
    vnd_per_kg * KG_PER_TONNE / rate
}

/// USD/tonne -> VND/kg at the configured exchange rate
pub fn usd_tonne_to_vnd_kg(usd_per_tonne: f64, rate: f64) -> f64 {
    usd_per_tonne * rate / KG_PER_TONNE
}

/// Convert a value between any two supported units.
///
/// The USD/VND `rate` is only consulted when one side is VND-denominated.
pub fn convert(value: f64, from: Unit, to: Unit, rate: f64) -> f64 {
    if from == to {
        return value;
    }

    // Normalize to USD/tonne, then out to the target unit
    let usd_tonne = match from {
        Unit::UsdPerTonne => value,
        Unit::CentsPerLb => cents_lb_to_usd_tonne(value),
        Unit::VndPerKg => vnd_kg_to_usd_tonne(value, rate),
    };

    match to {
        Unit::UsdPerTonne => usd_tonne,
        Unit::CentsPerLb => usd_tonne_to_cents_lb(usd_tonne),
        Unit::VndPerKg => usd_tonne_to_vnd_kg(usd_tonne, rate),
    }
}

/// VND display value for a reconciled price: VND/tonne for international
/// quotes, the VND/kg value itself for domestic ones.
pub fn to_vnd(value: f64, unit: Unit, rate: f64) -> f64 {
    match unit {
        Unit::UsdPerTonne => usd_to_vnd(value, rate),
        Unit::CentsPerLb => usd_to_vnd(cents_lb_to_usd_tonne(value), rate),
        Unit::VndPerKg => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: f64 = 24_000.0;

    fn close(a: f64, b: f64) {
        let rel = ((a - b) / b).abs();
        assert!(rel < 1e-6, "expected {} ~= {}, rel err {}", a, b, rel);
    }

    #[test]
    fn test_cents_lb_to_usd_tonne() {
        // 245 cents/lb = 2.45 USD/lb * 2204.6 lb/tonne
        close(cents_lb_to_usd_tonne(245.0), 5401.27);
    }

    #[test]
    fn test_round_trip_cents_lb() {
        let x = 247.5;
        close(usd_tonne_to_cents_lb(cents_lb_to_usd_tonne(x)), x);
    }

    #[test]
    fn test_round_trip_vnd_kg() {
        let x = 58_000.0;
        close(usd_tonne_to_vnd_kg(vnd_kg_to_usd_tonne(x, RATE), RATE), x);
    }

    #[test]
    fn test_round_trip_all_pairs() {
        let units = [Unit::UsdPerTonne, Unit::CentsPerLb, Unit::VndPerKg];
        for from in units {
            for to in units {
                let x = 4250.0;
                let there = convert(x, from, to, RATE);
                close(convert(there, to, from, RATE), x);
            }
        }
    }

    #[test]
    fn test_same_unit_is_identity() {
        assert_eq!(convert(4250.0, Unit::UsdPerTonne, Unit::UsdPerTonne, RATE), 4250.0);
    }

    #[test]
    fn test_to_vnd() {
        close(to_vnd(4250.0, Unit::UsdPerTonne, RATE), 102_000_000.0);
        // Domestic prices are already VND/kg
        assert_eq!(to_vnd(58_000.0, Unit::VndPerKg, RATE), 58_000.0);
        // cents/lb converts via USD/tonne
        close(
            to_vnd(100.0, Unit::CentsPerLb, RATE),
            cents_lb_to_usd_tonne(100.0) * RATE,
        );
    }
}
