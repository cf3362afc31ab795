//! Amounts are integer minor units (cents) of the deployment currency.

pub type MinorUnits = i64;

/// Round a fractional minor-unit amount to a whole cent, half away from zero.
pub fn round_minor(value: f64) -> MinorUnits {
    value.round() as MinorUnits
}

/// `amount × rate`, rounded to a whole cent.
pub fn apply_rate(amount: MinorUnits, rate: f64) -> MinorUnits {
    round_minor(amount as f64 * rate)
}

/// Human-readable rendering, e.g. `1234` in `eur` → `"12.34 EUR"`.
pub fn format_major(amount: MinorUnits, currency: &str) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:02} {}", sign, abs / 100, abs % 100, currency.to_uppercase())
}
