pub mod product;
pub mod pricing;
pub mod proximity;

pub use product::{Catalog, CatalogEntry, CatalogError, InMemoryCatalog, ItemRef};
pub use pricing::{PricingConfig, PricingEngine, PricingError};
pub use proximity::{MerchantLocation, MerchantLocator};
