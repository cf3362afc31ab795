pub mod payment;
pub mod geolocation;
pub mod webhook;

pub use geolocation::{DistanceElement, GeolocationError, GeolocationGateway, RouteStatus};
pub use payment::{
    PaymentAuthorization, PaymentError, PaymentEvent, PaymentEventKind, PaymentGateway, Refund,
};
pub use webhook::{SignatureError, WebhookVerifier};
