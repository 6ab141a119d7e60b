use std::sync::Arc;

use rust_decimal::Decimal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

mod api;
mod auth;
mod catalog;
mod config;
mod domain;
mod error;
mod metrics;
mod notify;
mod orchestrator;
mod store;
mod utils;

use auth::{AuthContext, Role, StaticIdentityProvider};
use catalog::{ArticleSummary, StaticCatalog};
use domain::inventory::{StockLedger, Variation};
use notify::LogNotifier;
use orchestrator::FulfillmentService;
use store::{ClaimStore, DeliveryStore, InMemoryStore, InventoryStore, OrderStore, PgStore};
use utils::{retry_transient, RetryConfig};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging; override with RUST_LOG.
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,marketplace_fulfillment=debug")),
        )
        .init();

    let config = config::Config::from_env()?;
    let metrics = Arc::new(metrics::Metrics::new()?);
    let catalog = Arc::new(StaticCatalog::new());

    // The identity provider is an external collaborator; the static one
    // here is the development stand-in.
    let buyer = AuthContext::new(Uuid::new_v4(), Role::Buyer);
    let seller = AuthContext::new(Uuid::new_v4(), Role::Seller);
    let courier = AuthContext::new(Uuid::new_v4(), Role::Courier);
    let admin = AuthContext::new(Uuid::new_v4(), Role::Administrator);
    let identity = Arc::new(
        StaticIdentityProvider::new()
            .with_token("buyer-token", buyer)
            .with_token("seller-token", seller)
            .with_token("courier-token", courier)
            .with_token("admin-token", admin),
    );
    tracing::warn!("using the static development identity provider");
    tracing::info!(
        buyer = "buyer-token",
        seller = "seller-token",
        courier = "courier-token",
        admin = "admin-token",
        "development bearer tokens"
    );

    let (orders, deliveries, claims, ledger): (
        Arc<dyn OrderStore>,
        Arc<dyn DeliveryStore>,
        Arc<dyn ClaimStore>,
        StockLedger,
    ) = match &config.database_url {
        Some(url) => {
            tracing::info!("connecting to Postgres");
            let store = retry_transient(RetryConfig::startup(), |_| PgStore::connect(url)).await?;
            store.ensure_schema().await?;
            let store = Arc::new(store);
            (
                store.clone() as Arc<dyn OrderStore>,
                store.clone() as Arc<dyn DeliveryStore>,
                store.clone() as Arc<dyn ClaimStore>,
                StockLedger::new(store),
            )
        }
        None => {
            tracing::warn!("DATABASE_URL not set, running on the in-memory store");
            let store = Arc::new(InMemoryStore::new());

            // A small demo inventory so the API is usable out of the box.
            let article_id = Uuid::new_v4();
            let variation_id = Uuid::new_v4();
            catalog
                .add_article(ArticleSummary {
                    id: article_id,
                    seller_id: seller.user_id,
                    price: Decimal::new(2450, 2),
                })
                .await;
            catalog.add_variation(article_id, variation_id).await;
            store
                .insert_variation(Variation {
                    id: variation_id,
                    article_id,
                    stock: 25,
                })
                .await?;
            tracing::info!(
                article_id = %article_id,
                variation_id = %variation_id,
                stock = 25,
                "demo catalog seeded"
            );

            (
                store.clone() as Arc<dyn OrderStore>,
                store.clone() as Arc<dyn DeliveryStore>,
                store.clone() as Arc<dyn ClaimStore>,
                StockLedger::new(store.clone()),
            )
        }
    };

    let service = Arc::new(FulfillmentService::new(
        identity,
        catalog,
        Arc::new(LogNotifier),
        orders,
        deliveries,
        claims,
        ledger,
        metrics.clone(),
    ));

    api::serve(service, metrics, config.http_port).await?;
    Ok(())
}
