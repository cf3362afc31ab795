use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use mealhub_order::{
    Actor, CreateOrderRequest, LineRequest, Order, OrderProjection, OrderStatus, UpdateOrderRequest,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::actor::RequestActor;
use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// The customer comes from the caller identity, not the body
#[derive(Debug, Deserialize)]
pub struct CreateOrderBody {
    pub address_id: Uuid,
    #[serde(default)]
    pub cooker_id: Option<Uuid>,
    pub items: Vec<LineRequest>,
    #[serde(default)]
    pub scheduled_delivery_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct StatusChangeBody {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct RatingBody {
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignAgentBody {
    pub agent_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub address_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct AcceptanceRateResponse {
    pub cooker_id: Uuid,
    pub acceptance_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct NearbyCookersResponse {
    pub cooker_ids: Vec<Uuid>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/orders", post(create_order))
        .route("/v1/orders/{id}", get(get_order).patch(update_order))
        .route("/v1/orders/{id}/status", post(change_status))
        .route("/v1/orders/{id}/rating", post(rate_order))
        .route("/v1/orders/{id}/delivery-agent", post(assign_delivery_agent))
        .route("/v1/cookers/nearby", get(nearby_cookers))
        .route("/v1/cookers/{id}/acceptance-rate/refresh", post(refresh_acceptance_rate))
}

/// Parties to an order, plus internal callers
fn can_view(order: &Order, actor: Actor) -> bool {
    match actor {
        Actor::Customer(id) => id == order.customer_id,
        Actor::Cooker(id) => id == order.cooker_id,
        Actor::DeliveryAgent(id) => order.delivery_agent_id == Some(id),
        Actor::System => true,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/orders
pub async fn create_order(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Json(body): Json<CreateOrderBody>,
) -> Result<(StatusCode, Json<OrderProjection>), AppError> {
    let Actor::Customer(customer_id) = actor else {
        return Err(AppError::AuthorizationError("only customers place orders".to_string()));
    };

    let projection = state
        .orchestrator
        .create_order(CreateOrderRequest {
            customer_id,
            address_id: body.address_id,
            cooker_id: body.cooker_id,
            items: body.items,
            scheduled_delivery_at: body.scheduled_delivery_at,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(projection)))
}

/// GET /v1/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderProjection>, AppError> {
    let projection = state.orchestrator.get_order(id).await?;
    if !can_view(&projection.order, actor) {
        // do not reveal that the order exists
        return Err(AppError::NotFoundError(format!("Order not found: {}", id)));
    }
    Ok(Json(projection))
}

/// PATCH /v1/orders/{id}
pub async fn update_order(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateOrderRequest>,
) -> Result<Json<OrderProjection>, AppError> {
    let projection = state.orchestrator.update_order(id, actor, body).await?;
    Ok(Json(projection))
}

/// POST /v1/orders/{id}/status
pub async fn change_status(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusChangeBody>,
) -> Result<Json<OrderProjection>, AppError> {
    let projection = state
        .orchestrator
        .apply_status_change(id, body.status, actor)
        .await?;
    Ok(Json(projection))
}

/// POST /v1/orders/{id}/rating
pub async fn rate_order(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(id): Path<Uuid>,
    Json(body): Json<RatingBody>,
) -> Result<Json<OrderProjection>, AppError> {
    let projection = state
        .orchestrator
        .rate_order(id, actor, body.rating, body.comment)
        .await?;
    Ok(Json(projection))
}

/// POST /v1/orders/{id}/delivery-agent
pub async fn assign_delivery_agent(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(id): Path<Uuid>,
    Json(body): Json<AssignAgentBody>,
) -> Result<Json<OrderProjection>, AppError> {
    let projection = state
        .orchestrator
        .assign_delivery_agent(id, body.agent_id, actor)
        .await?;
    Ok(Json(projection))
}

/// GET /v1/cookers/nearby?address_id=...
pub async fn nearby_cookers(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<NearbyCookersResponse>, AppError> {
    let Actor::Customer(customer_id) = actor else {
        return Err(AppError::AuthorizationError("only customers search by address".to_string()));
    };

    let cooker_ids = state
        .orchestrator
        .closest_merchants(customer_id, query.address_id)
        .await?;
    Ok(Json(NearbyCookersResponse { cooker_ids }))
}

/// POST /v1/cookers/{id}/acceptance-rate/refresh
pub async fn refresh_acceptance_rate(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(cooker_id): Path<Uuid>,
) -> Result<Json<AcceptanceRateResponse>, AppError> {
    if actor != Actor::System && actor != Actor::Cooker(cooker_id) {
        return Err(AppError::AuthorizationError(format!(
            "{} cannot refresh cooker {}",
            actor, cooker_id
        )));
    }

    let acceptance_rate = state.orchestrator.refresh_acceptance_rate(cooker_id).await?;
    Ok(Json(AcceptanceRateResponse { cooker_id, acceptance_rate }))
}
