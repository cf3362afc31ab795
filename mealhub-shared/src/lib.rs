pub mod pii;
pub mod money;

pub use pii::Masked;
pub use money::MinorUnits;
