use actix_web::{web, HttpRequest, HttpResponse};
use chrono::NaiveDate;
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::claim::ClaimStatus;
use crate::domain::delivery::{DeliveryAddress, DeliveryStatus};
use crate::domain::order::OrderStatus;
use crate::error::FulfillmentError;
use crate::orchestrator::{NewClaim, NewDelivery, NewOrder, NewOrderLine};

use super::{bearer_token, ApiState};

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Deserialize)]
pub struct OrderLineRequest {
    pub article_id: Uuid,
    pub variation_id: Option<Uuid>,
    pub quantity: i32,
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub lines: Vec<OrderLineRequest>,
}

/// Statuses arrive as strings and are parsed case-insensitively; an
/// unknown value is a validation error, never a silent no-op.
#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Deserialize)]
pub struct CreateDeliveryRequest {
    pub order_id: Uuid,
    pub courier_id: Option<Uuid>,
    pub address: DeliveryAddress,
    pub scheduled_date: NaiveDate,
}

#[derive(Deserialize)]
pub struct CreateClaimRequest {
    pub order_id: Uuid,
    pub description: String,
}

#[derive(Deserialize)]
pub struct ClaimDetailsRequest {
    pub description: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn create_order(
    state: web::Data<ApiState>,
    req: HttpRequest,
    body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, FulfillmentError> {
    let caller = state.service.authenticate(bearer_token(&req)?).await?;
    let lines = body
        .into_inner()
        .lines
        .into_iter()
        .map(|line| NewOrderLine {
            article_id: line.article_id,
            variation_id: line.variation_id,
            quantity: line.quantity,
        })
        .collect();

    let order = state.service.create_order(&caller, NewOrder { lines }).await?;
    Ok(HttpResponse::Created().json(order))
}

pub async fn get_order(
    state: web::Data<ApiState>,
    req: HttpRequest,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, FulfillmentError> {
    let caller = state.service.authenticate(bearer_token(&req)?).await?;
    let order = state.service.get_order(&caller, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(order))
}

pub async fn update_order_status(
    state: web::Data<ApiState>,
    req: HttpRequest,
    path: web::Path<Uuid>,
    body: web::Json<StatusRequest>,
) -> Result<HttpResponse, FulfillmentError> {
    let caller = state.service.authenticate(bearer_token(&req)?).await?;
    let target: OrderStatus = body
        .status
        .parse()
        .map_err(FulfillmentError::Validation)?;

    let order = state
        .service
        .update_order_status(&caller, path.into_inner(), target)
        .await?;
    Ok(HttpResponse::Ok().json(order))
}

pub async fn delete_order(
    state: web::Data<ApiState>,
    req: HttpRequest,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, FulfillmentError> {
    let caller = state.service.authenticate(bearer_token(&req)?).await?;
    state.service.delete_order(&caller, path.into_inner()).await?;
    Ok(HttpResponse::Ok().finish())
}

pub async fn create_delivery(
    state: web::Data<ApiState>,
    req: HttpRequest,
    body: web::Json<CreateDeliveryRequest>,
) -> Result<HttpResponse, FulfillmentError> {
    let caller = state.service.authenticate(bearer_token(&req)?).await?;
    let body = body.into_inner();

    let delivery = state
        .service
        .create_delivery(
            &caller,
            NewDelivery {
                order_id: body.order_id,
                courier_id: body.courier_id,
                address: body.address,
                scheduled_date: body.scheduled_date,
            },
        )
        .await?;
    Ok(HttpResponse::Created().json(delivery))
}

pub async fn update_delivery_status(
    state: web::Data<ApiState>,
    req: HttpRequest,
    path: web::Path<Uuid>,
    body: web::Json<StatusRequest>,
) -> Result<HttpResponse, FulfillmentError> {
    let caller = state.service.authenticate(bearer_token(&req)?).await?;
    let target: DeliveryStatus = body
        .status
        .parse()
        .map_err(FulfillmentError::Validation)?;

    let delivery = state
        .service
        .update_delivery_status(&caller, path.into_inner(), target)
        .await?;
    Ok(HttpResponse::Ok().json(delivery))
}

pub async fn delete_delivery(
    state: web::Data<ApiState>,
    req: HttpRequest,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, FulfillmentError> {
    let caller = state.service.authenticate(bearer_token(&req)?).await?;
    state
        .service
        .delete_delivery(&caller, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().finish())
}

pub async fn create_claim(
    state: web::Data<ApiState>,
    req: HttpRequest,
    body: web::Json<CreateClaimRequest>,
) -> Result<HttpResponse, FulfillmentError> {
    let caller = state.service.authenticate(bearer_token(&req)?).await?;
    let body = body.into_inner();

    let claim = state
        .service
        .create_claim(
            &caller,
            NewClaim {
                order_id: body.order_id,
                description: body.description,
            },
        )
        .await?;
    Ok(HttpResponse::Created().json(claim))
}

pub async fn list_claims(
    state: web::Data<ApiState>,
    req: HttpRequest,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, FulfillmentError> {
    let caller = state.service.authenticate(bearer_token(&req)?).await?;
    let claims = state.service.list_claims(&caller, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(claims))
}

pub async fn update_claim_status(
    state: web::Data<ApiState>,
    req: HttpRequest,
    path: web::Path<Uuid>,
    body: web::Json<StatusRequest>,
) -> Result<HttpResponse, FulfillmentError> {
    let caller = state.service.authenticate(bearer_token(&req)?).await?;
    let target: ClaimStatus = body
        .status
        .parse()
        .map_err(FulfillmentError::Validation)?;

    let claim = state
        .service
        .update_claim_status(&caller, path.into_inner(), target)
        .await?;
    Ok(HttpResponse::Ok().json(claim))
}

pub async fn update_claim_details(
    state: web::Data<ApiState>,
    req: HttpRequest,
    path: web::Path<Uuid>,
    body: web::Json<ClaimDetailsRequest>,
) -> Result<HttpResponse, FulfillmentError> {
    let caller = state.service.authenticate(bearer_token(&req)?).await?;
    let claim = state
        .service
        .update_claim_details(&caller, path.into_inner(), body.into_inner().description)
        .await?;
    Ok(HttpResponse::Ok().json(claim))
}

pub async fn delete_claim(
    state: web::Data<ApiState>,
    req: HttpRequest,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, FulfillmentError> {
    let caller = state.service.authenticate(bearer_token(&req)?).await?;
    state.service.delete_claim(&caller, path.into_inner()).await?;
    Ok(HttpResponse::Ok().finish())
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "marketplace-fulfillment"
    }))
}

pub async fn metrics(state: web::Data<ApiState>) -> HttpResponse {
    let encoder = TextEncoder::new();
    let families = state.metrics.registry().gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::error!(error = %e, "failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}
