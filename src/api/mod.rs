use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer, ResponseError};

use crate::error::{ErrorKind, FulfillmentError};
use crate::metrics::Metrics;
use crate::orchestrator::FulfillmentService;
use crate::utils::IsTransient;

mod handlers;

// ============================================================================
// API Layer - Thin HTTP Surface over the Orchestrator
// ============================================================================
//
// Maps the core operations to HTTP verbs; all rules live below. The caller
// authenticates with a bearer token resolved through the orchestrator's
// identity collaborator. /metrics and /health ride on the same server.
//
// ============================================================================

pub struct ApiState {
    pub service: Arc<FulfillmentService>,
    pub metrics: Arc<Metrics>,
}

pub async fn serve(
    service: Arc<FulfillmentService>,
    metrics: Arc<Metrics>,
    port: u16,
) -> std::io::Result<()> {
    tracing::info!("starting fulfillment API on http://0.0.0.0:{}", port);

    let state = web::Data::new(ApiState { service, metrics });
    HttpServer::new(move || App::new().app_data(state.clone()).configure(configure))
        .bind(("0.0.0.0", port))?
        .run()
        .await
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/orders", web::post().to(handlers::create_order))
        .route("/orders/{id}", web::get().to(handlers::get_order))
        .route(
            "/orders/{id}/status",
            web::patch().to(handlers::update_order_status),
        )
        .route("/orders/{id}", web::delete().to(handlers::delete_order))
        .route("/deliveries", web::post().to(handlers::create_delivery))
        .route(
            "/deliveries/{id}/status",
            web::patch().to(handlers::update_delivery_status),
        )
        .route(
            "/deliveries/{id}",
            web::delete().to(handlers::delete_delivery),
        )
        .route(
            "/orders/{id}/claims",
            web::get().to(handlers::list_claims),
        )
        .route("/claims", web::post().to(handlers::create_claim))
        .route(
            "/claims/{id}/status",
            web::patch().to(handlers::update_claim_status),
        )
        .route("/claims/{id}", web::patch().to(handlers::update_claim_details))
        .route("/claims/{id}", web::delete().to(handlers::delete_claim))
        .route("/health", web::get().to(handlers::health))
        .route("/metrics", web::get().to(handlers::metrics));
}

/// Extract the bearer token; the orchestrator resolves it to a caller.
pub(crate) fn bearer_token(req: &HttpRequest) -> Result<&str, FulfillmentError> {
    req.headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(FulfillmentError::Unauthenticated)
}

impl ResponseError for FulfillmentError {
    fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Dependency => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());
        if self.is_transient() {
            builder.insert_header(("Retry-After", "1"));
        }
        builder.json(serde_json::json!({
            "error": self.kind().as_str(),
            "message": self.to_string(),
        }))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
