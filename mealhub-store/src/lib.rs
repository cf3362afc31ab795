pub mod app_config;
pub mod database;
pub mod order_repo;
pub mod merchant_repo;
pub mod catalog_repo;
pub mod stripe;
pub mod distance_matrix;

pub use app_config::Config;
pub use catalog_repo::PgCatalog;
pub use database::DbClient;
pub use distance_matrix::HttpGeolocationGateway;
pub use merchant_repo::PgMerchantRepository;
pub use order_repo::PgOrderRepository;
pub use stripe::StripePaymentGateway;

use mealhub_order::repository::RepositoryError;

/// sqlx failures surface to the domain as opaque backend errors
pub(crate) fn backend(err: sqlx::Error) -> RepositoryError {
    RepositoryError::Backend(err.to_string())
}
