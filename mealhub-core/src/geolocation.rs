use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

/// Per-destination outcome reported by the distance provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteStatus {
    Ok,
    NotFound,
    ZeroResults,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DistanceElement {
    pub distance_meters: Option<u64>,
    pub status: RouteStatus,
}

impl DistanceElement {
    pub fn routed(distance_meters: u64) -> Self {
        Self {
            distance_meters: Some(distance_meters),
            status: RouteStatus::Ok,
        }
    }

    pub fn no_route(status: RouteStatus) -> Self {
        Self {
            distance_meters: None,
            status,
        }
    }

    /// Distance, only when the provider actually found a route
    pub fn meters(&self) -> Option<u64> {
        match self.status {
            RouteStatus::Ok => self.distance_meters,
            _ => None,
        }
    }
}

/// Provider failures. A missing route is not an error; see `RouteStatus`.
#[derive(Debug, thiserror::Error)]
pub enum GeolocationError {
    #[error("Geolocation provider timed out")]
    Timeout,

    #[error("Geolocation provider unreachable: {0}")]
    Transport(String),

    #[error("Geolocation provider error {status}: {message}")]
    Api { status: String, message: String },

    #[error("Unexpected geolocation response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait GeolocationGateway: Send + Sync {
    /// Travel distance from one origin to each destination, in destination order
    async fn distance(
        &self,
        origin: &str,
        destinations: &[String],
    ) -> Result<Vec<DistanceElement>, GeolocationError>;
}

/// Fixed route table for tests and local runs.
#[derive(Default)]
pub struct MockGeolocationGateway {
    routes: RwLock<HashMap<(String, String), u64>>,
    unavailable: AtomicBool,
    calls: AtomicUsize,
}

impl MockGeolocationGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(self, origin: &str, destination: &str, distance_meters: u64) -> Self {
        self.add_route(origin, destination, distance_meters);
        self
    }

    pub fn add_route(&self, origin: &str, destination: &str, distance_meters: u64) {
        self.routes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert((origin.to_string(), destination.to_string()), distance_meters);
    }

    /// Simulate a provider outage
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeolocationGateway for MockGeolocationGateway {
    async fn distance(
        &self,
        origin: &str,
        destinations: &[String],
    ) -> Result<Vec<DistanceElement>, GeolocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GeolocationError::Timeout);
        }

        let routes = self.routes.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(destinations
            .iter()
            .map(|destination| {
                match routes.get(&(origin.to_string(), destination.clone())) {
                    Some(meters) => DistanceElement::routed(*meters),
                    None => DistanceElement::no_route(RouteStatus::ZeroResults),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_routes_in_destination_order() {
        let gateway = MockGeolocationGateway::new()
            .with_route("kitchen", "home", 1500)
            .with_route("kitchen", "office", 9000);

        let elements = gateway
            .distance("kitchen", &["office".to_string(), "moon".to_string(), "home".to_string()])
            .await
            .unwrap();

        assert_eq!(elements[0].meters(), Some(9000));
        assert_eq!(elements[1].meters(), None);
        assert_eq!(elements[1].status, RouteStatus::ZeroResults);
        assert_eq!(elements[2].meters(), Some(1500));
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_outage() {
        let gateway = MockGeolocationGateway::new();
        gateway.set_unavailable(true);

        let result = gateway.distance("a", &["b".to_string()]).await;
        assert!(matches!(result, Err(GeolocationError::Timeout)));
    }
}
