use mealhub_core::geolocation::GeolocationGateway;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantLocation {
    pub cooker_id: Uuid,
    pub address: String,
}

/// Finds merchants that can deliver to a customer address
pub struct MerchantLocator {
    geolocation: Arc<dyn GeolocationGateway>,
}

impl MerchantLocator {
    pub fn new(geolocation: Arc<dyn GeolocationGateway>) -> Self {
        Self { geolocation }
    }

    /// Merchants whose travel distance to `customer_address` is within
    /// `radius_km`, nearest first.
    ///
    /// One provider request covers all candidates. Provider failures yield an
    /// empty list, same as "nobody in range".
    pub async fn closest_merchants(
        &self,
        customer_address: &str,
        candidates: &[MerchantLocation],
        radius_km: f64,
    ) -> Vec<Uuid> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let destinations: Vec<String> = candidates.iter().map(|c| c.address.clone()).collect();
        let elements = match self.geolocation.distance(customer_address, &destinations).await {
            Ok(elements) => elements,
            Err(e) => {
                tracing::warn!("Merchant discovery degraded to empty result: {}", e);
                return Vec::new();
            }
        };

        if elements.len() != candidates.len() {
            tracing::warn!(
                "Merchant discovery degraded to empty result: \
                 provider returned {} elements for {} destinations",
                elements.len(),
                candidates.len()
            );
            return Vec::new();
        }

        let radius_meters = radius_km * 1000.0;
        let mut in_range: Vec<(u64, Uuid)> = candidates
            .iter()
            .zip(elements.iter())
            .filter_map(|(candidate, element)| {
                element
                    .meters()
                    .filter(|meters| (*meters as f64) <= radius_meters)
                    .map(|meters| (meters, candidate.cooker_id))
            })
            .collect();

        in_range.sort_by_key(|(meters, _)| *meters);
        tracing::debug!(
            "{} of {} merchants within {} km",
            in_range.len(),
            candidates.len(),
            radius_km
        );

        in_range.into_iter().map(|(_, cooker_id)| cooker_id).collect()
    }
}
