//! Adapter layer: converts between the simulation's f64 world and the
//! ledger's Decimal money.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

/// Convert f64 to Decimal (lossy but sufficient for simulation).
/// Non-finite input maps to zero.
pub fn to_decimal(v: f64) -> Decimal {
    Decimal::from_f64(v).unwrap_or(Decimal::ZERO)
}

/// Convert Decimal to f64.
pub fn from_decimal(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

/// Round a price to whole currency units, toward negative infinity.
pub fn floor_units(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(0, RoundingStrategy::ToNegativeInfinity)
}

/// Refund for a removed service: half its placement cost, floored.
pub fn half_refund(cost: f64) -> Decimal {
    floor_units(to_decimal(cost) / Decimal::TWO)
}

/// Repair price: every missing health point (rounded up) at `per_point`.
pub fn repair_price(health: f64, per_point: f64) -> Decimal {
    let missing = (100.0 - health).max(0.0).ceil();
    to_decimal(missing) * to_decimal(per_point)
}
