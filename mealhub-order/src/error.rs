use mealhub_catalog::{CatalogError, PricingError};
use mealhub_core::{GeolocationError, PaymentError};
use uuid::Uuid;

use crate::models::OrderStatus;
use crate::repository::RepositoryError;

pub type OrderResult<T> = Result<T, OrderError>;

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(Uuid),

    #[error("Merchant not found: {0}")]
    MerchantNotFound(Uuid),

    #[error("No order for payment authorization {0}")]
    UnknownAuthorization(String),

    #[error("Invalid state transition from {} to {to}", describe(.from))]
    InvalidTransition {
        from: Option<OrderStatus>,
        to: OrderStatus,
    },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Order {id} cannot be modified in status {status}")]
    NotModifiable { id: Uuid, status: OrderStatus },

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Invalid order: {0}")]
    Validation(String),

    #[error("Invalid delivery distance: {0}")]
    InvalidDistance(String),

    #[error("Untrusted payment event: {0}")]
    UntrustedEvent(String),

    #[error("Geolocation unavailable: {0}")]
    GeolocationUnavailable(String),

    #[error("Payment provider error: {0}")]
    PaymentProvider(String),

    #[error("Order {0} was modified concurrently")]
    PersistenceConflict(Uuid),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Catalog error: {0}")]
    Catalog(String),
}

fn describe(from: &Option<OrderStatus>) -> String {
    from.map(|s| s.to_string()).unwrap_or_else(|| "NONE".to_string())
}

impl OrderError {
    /// Errors caused by the request itself; retrying unchanged will fail again
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            OrderError::NotFound(_)
                | OrderError::MerchantNotFound(_)
                | OrderError::UnknownAuthorization(_)
                | OrderError::InvalidTransition { .. }
                | OrderError::Forbidden(_)
                | OrderError::NotModifiable { .. }
                | OrderError::InvalidSchedule(_)
                | OrderError::Validation(_)
                | OrderError::UntrustedEvent(_)
        )
    }

    /// Optimistic-lock failures; the caller may retry the whole operation once
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrderError::PersistenceConflict(_))
    }
}

impl From<RepositoryError> for OrderError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => OrderError::NotFound(id),
            RepositoryError::Conflict(id) => OrderError::PersistenceConflict(id),
            RepositoryError::Backend(msg) => OrderError::Persistence(msg),
        }
    }
}

impl From<PaymentError> for OrderError {
    fn from(err: PaymentError) -> Self {
        if err.is_untrusted_event() {
            OrderError::UntrustedEvent(err.to_string())
        } else {
            OrderError::PaymentProvider(err.to_string())
        }
    }
}

impl From<GeolocationError> for OrderError {
    fn from(err: GeolocationError) -> Self {
        OrderError::GeolocationUnavailable(err.to_string())
    }
}

impl From<PricingError> for OrderError {
    fn from(err: PricingError) -> Self {
        OrderError::InvalidDistance(err.to_string())
    }
}

impl From<CatalogError> for OrderError {
    fn from(err: CatalogError) -> Self {
        OrderError::Catalog(err.to_string())
    }
}
