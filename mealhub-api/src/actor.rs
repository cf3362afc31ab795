use axum::{extract::FromRequestParts, http::request::Parts};
use mealhub_order::Actor;
use uuid::Uuid;

use crate::error::AppError;

pub const ROLE_HEADER: &str = "x-actor-role";
pub const ID_HEADER: &str = "x-actor-id";

/// Identity headers are set by the gateway in front of this service after it
/// has authenticated the caller.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ActorError {
    #[error("missing {0} header")]
    Missing(&'static str),

    #[error("unknown actor role: {0}")]
    UnknownRole(String),

    #[error("invalid actor id: {0}")]
    InvalidId(String),
}

pub fn parse_actor(role: &str, id: Option<&str>) -> Result<Actor, ActorError> {
    let parse_id = || -> Result<Uuid, ActorError> {
        let raw = id.ok_or(ActorError::Missing(ID_HEADER))?;
        Uuid::parse_str(raw.trim()).map_err(|_| ActorError::InvalidId(raw.to_string()))
    };

    match role.trim().to_ascii_lowercase().as_str() {
        "customer" => Ok(Actor::Customer(parse_id()?)),
        "cooker" => Ok(Actor::Cooker(parse_id()?)),
        "delivery_agent" => Ok(Actor::DeliveryAgent(parse_id()?)),
        "system" => Ok(Actor::System),
        other => Err(ActorError::UnknownRole(other.to_string())),
    }
}

/// The caller, from the identity headers
#[derive(Debug, Clone, Copy)]
pub struct RequestActor(pub Actor);

impl<S> FromRequestParts<S> for RequestActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok());

        let role = header(ROLE_HEADER).ok_or(ActorError::Missing(ROLE_HEADER))?;
        let actor = parse_actor(role, header(ID_HEADER))?;
        Ok(RequestActor(actor))
    }
}
