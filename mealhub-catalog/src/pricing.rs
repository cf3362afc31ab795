use mealhub_shared::money::{round_minor, MinorUnits};
use serde::{Deserialize, Serialize};

/// Distance band with its multiplier. `max_meters == None` is the open-ended last band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceTier {
    pub max_meters: Option<i64>,
    pub ratio: f64,
}

/// Upper bounds are inclusive: 2000 m is still the first band.
pub const DELIVERY_TIERS: [DistanceTier; 6] = [
    DistanceTier { max_meters: Some(2_000), ratio: 1.0 },
    DistanceTier { max_meters: Some(4_000), ratio: 1.1 },
    DistanceTier { max_meters: Some(6_000), ratio: 1.2 },
    DistanceTier { max_meters: Some(8_000), ratio: 1.3 },
    DistanceTier { max_meters: Some(10_000), ratio: 1.4 },
    DistanceTier { max_meters: None, ratio: 1.5 },
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Delivery rate per kilometre, in minor units, before the band ratio
    pub base_rate_per_km: f64,

    /// Share of the subtotal charged as service fee (0.10 = 10%)
    #[serde(default = "default_service_fee_rate")]
    pub service_fee_rate: f64,
}

fn default_service_fee_rate() -> f64 {
    0.10
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PricingError {
    #[error("Invalid delivery distance: {0} m")]
    InvalidDistance(i64),

    #[error("Invalid pricing configuration: {0}")]
    InvalidConfiguration(String),
}

/// Distance-based delivery pricing
#[derive(Debug, Clone)]
pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Result<Self, PricingError> {
        if !config.base_rate_per_km.is_finite() || config.base_rate_per_km <= 0.0 {
            return Err(PricingError::InvalidConfiguration(format!(
                "base_rate_per_km must be positive, got {}",
                config.base_rate_per_km
            )));
        }
        if !(0.0..1.0).contains(&config.service_fee_rate) {
            return Err(PricingError::InvalidConfiguration(format!(
                "service_fee_rate must be in [0, 1), got {}",
                config.service_fee_rate
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    /// Band multiplier for a positive distance
    pub fn ratio_for(distance_meters: i64) -> f64 {
        DELIVERY_TIERS
            .iter()
            .find(|tier| tier.max_meters.map_or(true, |max| distance_meters <= max))
            .map(|tier| tier.ratio)
            .unwrap_or(1.5)
    }

    /// `distance_km × base_rate_per_km × ratio`, rounded to a whole cent
    pub fn compute_delivery_fee(&self, distance_meters: i64) -> Result<MinorUnits, PricingError> {
        if distance_meters <= 0 {
            return Err(PricingError::InvalidDistance(distance_meters));
        }

        let distance_km = distance_meters as f64 / 1000.0;
        let ratio = Self::ratio_for(distance_meters);
        Ok(round_minor(distance_km * self.config.base_rate_per_km * ratio))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> PricingEngine {
        PricingEngine::new(PricingConfig {
            base_rate_per_km: 100.0,
            service_fee_rate: 0.10,
        })
        .unwrap()
    }

    #[test]
    fn test_band_boundaries() {
        assert_eq!(PricingEngine::ratio_for(1), 1.0);
        assert_eq!(PricingEngine::ratio_for(2_000), 1.0);
        assert_eq!(PricingEngine::ratio_for(2_001), 1.1);
        assert_eq!(PricingEngine::ratio_for(4_000), 1.1);
        assert_eq!(PricingEngine::ratio_for(6_000), 1.2);
        assert_eq!(PricingEngine::ratio_for(7_999), 1.3);
        assert_eq!(PricingEngine::ratio_for(10_000), 1.4);
        assert_eq!(PricingEngine::ratio_for(10_001), 1.5);
        assert_eq!(PricingEngine::ratio_for(250_000), 1.5);
    }

    #[test]
    fn test_fee_first_band() {
        // 1.5 km × 1.00/km × 1.0
        assert_eq!(engine().compute_delivery_fee(1_500), Ok(150));
    }

    #[test]
    fn test_fee_fifth_band() {
        // 9 km × 1.00/km × 1.4
        assert_eq!(engine().compute_delivery_fee(9_000), Ok(1_260));
    }

    #[test]
    fn test_fee_rounds_to_cents() {
        // 2.345 km × 1.00/km × 1.1 = 257.95 → 258
        assert_eq!(engine().compute_delivery_fee(2_345), Ok(258));
    }

    #[test]
    fn test_non_positive_distance_rejected() {
        assert_eq!(engine().compute_delivery_fee(0), Err(PricingError::InvalidDistance(0)));
        assert_eq!(engine().compute_delivery_fee(-10), Err(PricingError::InvalidDistance(-10)));
    }

    #[test]
    fn test_invalid_configuration() {
        let zero_rate = PricingEngine::new(PricingConfig {
            base_rate_per_km: 0.0,
            service_fee_rate: 0.10,
        });
        assert!(matches!(zero_rate, Err(PricingError::InvalidConfiguration(_))));

        let bad_fee = PricingEngine::new(PricingConfig {
            base_rate_per_km: 100.0,
            service_fee_rate: 1.5,
        });
        assert!(matches!(bad_fee, Err(PricingError::InvalidConfiguration(_))));
    }
}
