use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::auth::{AuthContext, IdentityProvider, Role};
use crate::catalog::Catalog;
use crate::domain::claim::{Claim, ClaimStatus};
use crate::domain::delivery::{Delivery, DeliveryAddress, DeliveryError, DeliveryStatus};
use crate::domain::inventory::{StockError, StockLedger};
use crate::domain::order::{Order, OrderLine, OrderStatus, StockEffect};
use crate::error::FulfillmentError;
use crate::metrics::Metrics;
use crate::notify::NotificationSink;
use crate::store::{ClaimStore, DeliveryInsert, DeliveryStore, OrderStore};

// ============================================================================
// Fulfillment Orchestrator
// ============================================================================
//
// The single entry point for every operation: resolves the caller, checks
// ownership/role, sequences the aggregate and store calls, and translates
// domain failures into the error taxonomy. It never mutates state itself;
// it only composes the stock ledger and the stores, and it aborts the
// sequence on the first failure.
//
// Authorization matrix:
//   create order           buyer
//   fetch order            owner or admin
//   order status change    preparing: admin/seller-of-line
//                          cancelled: admin/owning buyer
//                          refunded:  admin
//   delete order           owner or admin
//   create delivery        admin or seller-of-line
//   delivery status change admin or assigned courier
//   delete delivery        admin
//   create claim           owning buyer
//   claim status change    admin
//   claim details/delete   claimant
//
// ============================================================================

pub struct NewOrderLine {
    pub article_id: Uuid,
    pub variation_id: Option<Uuid>,
    pub quantity: i32,
}

pub struct NewOrder {
    pub lines: Vec<NewOrderLine>,
}

pub struct NewDelivery {
    pub order_id: Uuid,
    pub courier_id: Option<Uuid>,
    pub address: DeliveryAddress,
    pub scheduled_date: NaiveDate,
}

pub struct NewClaim {
    pub order_id: Uuid,
    pub description: String,
}

pub struct FulfillmentService {
    identity: Arc<dyn IdentityProvider>,
    catalog: Arc<dyn Catalog>,
    notifier: Arc<dyn NotificationSink>,
    orders: Arc<dyn OrderStore>,
    deliveries: Arc<dyn DeliveryStore>,
    claims: Arc<dyn ClaimStore>,
    ledger: StockLedger,
    metrics: Arc<Metrics>,
}

impl FulfillmentService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        catalog: Arc<dyn Catalog>,
        notifier: Arc<dyn NotificationSink>,
        orders: Arc<dyn OrderStore>,
        deliveries: Arc<dyn DeliveryStore>,
        claims: Arc<dyn ClaimStore>,
        ledger: StockLedger,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            identity,
            catalog,
            notifier,
            orders,
            deliveries,
            claims,
            ledger,
            metrics,
        }
    }

    /// Resolve a bearer token through the identity collaborator.
    pub async fn authenticate(&self, token: &str) -> Result<AuthContext, FulfillmentError> {
        Ok(self.identity.authenticate(token).await?)
    }

    // ------------------------------------------------------------------
    // Orders
    // ------------------------------------------------------------------

    pub async fn create_order(
        &self,
        caller: &AuthContext,
        request: NewOrder,
    ) -> Result<Order, FulfillmentError> {
        self.timed("create_order", self.create_order_inner(caller, request))
            .await
    }

    async fn create_order_inner(
        &self,
        caller: &AuthContext,
        request: NewOrder,
    ) -> Result<Order, FulfillmentError> {
        if caller.role != Role::Buyer {
            return Err(FulfillmentError::Forbidden);
        }

        // Snapshot unit prices from the catalog and validate every
        // reference before touching any state.
        let mut lines = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let article = self
                .catalog
                .article(line.article_id)
                .await?
                .ok_or(FulfillmentError::NotFound("article"))?;

            if let Some(variation_id) = line.variation_id {
                if !self
                    .catalog
                    .variation_belongs_to(line.article_id, variation_id)
                    .await?
                {
                    return Err(FulfillmentError::NotFound("variation"));
                }
            }

            lines.push(OrderLine {
                article_id: line.article_id,
                variation_id: line.variation_id,
                quantity: line.quantity,
                unit_price: article.price,
            });
        }

        let order = Order::new(caller.user_id, lines)?;
        let reserved = order.reserved_lines();

        if let Err(e) = self.ledger.reserve_lines(&reserved).await {
            self.metrics.record_reservation(match &e {
                StockError::Insufficient { .. } => "insufficient",
                StockError::VariationNotFound(_) => "not_found",
                _ => "error",
            });
            return Err(e.into());
        }
        self.metrics.record_reservation("reserved");

        if let Err(e) = self.orders.insert(&order).await {
            // The reservation must not leak if the order row never lands.
            if let Err(release_err) = self.ledger.release_lines(&reserved).await {
                tracing::error!(
                    order_id = %order.id,
                    error = %release_err,
                    "failed to roll back reservation after insert failure"
                );
            }
            return Err(e.into());
        }

        tracing::info!(
            order_id = %order.id,
            buyer_id = %caller.user_id,
            line_count = order.lines.len(),
            total_price = %order.total_price,
            "order created"
        );
        Ok(order)
    }

    pub async fn get_order(
        &self,
        caller: &AuthContext,
        order_id: Uuid,
    ) -> Result<Order, FulfillmentError> {
        self.timed("get_order", async {
            let order = self
                .orders
                .get(order_id)
                .await?
                .ok_or(FulfillmentError::NotFound("order"))?;
            if !caller.is_admin() && order.buyer_id != caller.user_id {
                return Err(FulfillmentError::Forbidden);
            }
            Ok(order)
        })
        .await
    }

    pub async fn update_order_status(
        &self,
        caller: &AuthContext,
        order_id: Uuid,
        target: OrderStatus,
    ) -> Result<Order, FulfillmentError> {
        self.timed(
            "update_order_status",
            self.update_order_status_inner(caller, order_id, target),
        )
        .await
    }

    async fn update_order_status_inner(
        &self,
        caller: &AuthContext,
        order_id: Uuid,
        target: OrderStatus,
    ) -> Result<Order, FulfillmentError> {
        let mut order = self
            .orders
            .get(order_id)
            .await?
            .ok_or(FulfillmentError::NotFound("order"))?;

        match target {
            OrderStatus::Preparing => {
                if !caller.is_admin() && !self.is_seller_of(caller, &order).await? {
                    return Err(FulfillmentError::Forbidden);
                }
            }
            OrderStatus::Cancelled => {
                let owning_buyer =
                    caller.role == Role::Buyer && order.buyer_id == caller.user_id;
                if !caller.is_admin() && !owning_buyer {
                    return Err(FulfillmentError::Forbidden);
                }
            }
            OrderStatus::Refunded => {
                if !caller.is_admin() {
                    return Err(FulfillmentError::Forbidden);
                }
            }
            // Delivery-driven targets fall through; client_transition
            // rejects them uniformly for every caller.
            _ => {}
        }

        let previous = order.status;
        let effect = order.client_transition(target)?;
        self.orders.update_status(order.id, order.status).await?;
        self.apply_stock_effect(&order, effect).await?;

        if caller.user_id != order.buyer_id {
            self.notify_best_effort(
                order.buyer_id,
                "Order updated",
                &format!("Your order is now {}.", order.status),
                &format!("/orders/{}", order.id),
            )
            .await;
        }

        tracing::info!(
            order_id = %order.id,
            from = %previous,
            to = %order.status,
            "order status changed"
        );
        Ok(order)
    }

    pub async fn delete_order(
        &self,
        caller: &AuthContext,
        order_id: Uuid,
    ) -> Result<(), FulfillmentError> {
        self.timed("delete_order", self.delete_order_inner(caller, order_id))
            .await
    }

    async fn delete_order_inner(
        &self,
        caller: &AuthContext,
        order_id: Uuid,
    ) -> Result<(), FulfillmentError> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or(FulfillmentError::NotFound("order"))?;

        if !caller.is_admin() && order.buyer_id != caller.user_id {
            return Err(FulfillmentError::Forbidden);
        }

        let effect = order.deletion_effect()?;
        let release = match effect {
            StockEffect::Release => order.reserved_lines(),
            StockEffect::None => Vec::new(),
        };

        // Lines, delivery, and claims are removed with the order in one
        // unit of work; the release happens inside the same transaction.
        self.orders.delete_cascade(order.id, &release).await?;

        if !release.is_empty() {
            self.metrics
                .record_release(release.iter().map(|&(_, qty)| qty).sum::<i32>());
        }

        tracing::info!(
            order_id = %order.id,
            status = %order.status,
            released_lines = release.len(),
            "order deleted"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Deliveries
    // ------------------------------------------------------------------

    pub async fn create_delivery(
        &self,
        caller: &AuthContext,
        request: NewDelivery,
    ) -> Result<Delivery, FulfillmentError> {
        self.timed(
            "create_delivery",
            self.create_delivery_inner(caller, request),
        )
        .await
    }

    async fn create_delivery_inner(
        &self,
        caller: &AuthContext,
        request: NewDelivery,
    ) -> Result<Delivery, FulfillmentError> {
        let mut order = self
            .orders
            .get(request.order_id)
            .await?
            .ok_or(FulfillmentError::NotFound("order"))?;

        if !caller.is_admin() && !self.is_seller_of(caller, &order).await? {
            return Err(FulfillmentError::Forbidden);
        }

        if order.status.is_terminal() {
            return Err(FulfillmentError::TerminalStateViolation {
                status: order.status,
            });
        }
        if !matches!(order.status, OrderStatus::Pending | OrderStatus::Preparing) {
            // ready_for_delivery / in_delivery imply an attached delivery;
            // a cancelled order is a plain transition conflict.
            if self.deliveries.get_by_order(order.id).await?.is_some() {
                return Err(DeliveryError::AlreadyExists(order.id).into());
            }
            return Err(FulfillmentError::InvalidStatusTransition {
                from: order.status.to_string(),
                to: OrderStatus::ReadyForDelivery.to_string(),
            });
        }

        let delivery = Delivery::new(
            request.order_id,
            request.address,
            request.courier_id,
            request.scheduled_date,
        );

        // The store enforces the 1:1 constraint atomically; a concurrent
        // create loses here, not at the read above.
        match self.deliveries.insert(&delivery).await? {
            DeliveryInsert::DuplicateOrder => {
                return Err(DeliveryError::AlreadyExists(order.id).into())
            }
            DeliveryInsert::Inserted => {}
        }

        order.transition(OrderStatus::ReadyForDelivery)?;
        self.orders.update_status(order.id, order.status).await?;

        self.notify_best_effort(
            order.buyer_id,
            "Delivery scheduled",
            "A delivery has been scheduled for your order.",
            &format!("/orders/{}", order.id),
        )
        .await;

        tracing::info!(
            delivery_id = %delivery.id,
            order_id = %order.id,
            courier_id = ?delivery.courier_id,
            "delivery created"
        );
        Ok(delivery)
    }

    pub async fn update_delivery_status(
        &self,
        caller: &AuthContext,
        delivery_id: Uuid,
        target: DeliveryStatus,
    ) -> Result<Delivery, FulfillmentError> {
        self.timed(
            "update_delivery_status",
            self.update_delivery_status_inner(caller, delivery_id, target),
        )
        .await
    }

    async fn update_delivery_status_inner(
        &self,
        caller: &AuthContext,
        delivery_id: Uuid,
        target: DeliveryStatus,
    ) -> Result<Delivery, FulfillmentError> {
        let mut delivery = self
            .deliveries
            .get(delivery_id)
            .await?
            .ok_or(FulfillmentError::NotFound("delivery"))?;

        let assigned_courier =
            caller.role == Role::Courier && delivery.is_assigned_to(caller.user_id);
        if !caller.is_admin() && !assigned_courier {
            return Err(FulfillmentError::Forbidden);
        }

        let changed = delivery.set_status(target)?;
        if !changed {
            return Ok(delivery);
        }
        self.deliveries
            .update_status(delivery.id, delivery.status)
            .await?;

        // One-directional propagation: delivery -> order.
        if let Some(order_target) = delivery.status.order_status() {
            let mut order = self
                .orders
                .get(delivery.order_id)
                .await?
                .ok_or(FulfillmentError::NotFound("order"))?;
            if order.status != order_target {
                order.transition(order_target)?;
                self.orders.update_status(order.id, order.status).await?;
            }

            self.notify_best_effort(
                order.buyer_id,
                "Delivery update",
                &format!("Your delivery is now {}.", delivery.status),
                &format!("/orders/{}", order.id),
            )
            .await;
        }

        tracing::info!(
            delivery_id = %delivery.id,
            order_id = %delivery.order_id,
            status = %delivery.status,
            "delivery status changed"
        );
        Ok(delivery)
    }

    pub async fn delete_delivery(
        &self,
        caller: &AuthContext,
        delivery_id: Uuid,
    ) -> Result<(), FulfillmentError> {
        self.timed(
            "delete_delivery",
            self.delete_delivery_inner(caller, delivery_id),
        )
        .await
    }

    async fn delete_delivery_inner(
        &self,
        caller: &AuthContext,
        delivery_id: Uuid,
    ) -> Result<(), FulfillmentError> {
        if !caller.is_admin() {
            return Err(FulfillmentError::Forbidden);
        }

        let delivery = self
            .deliveries
            .get(delivery_id)
            .await?
            .ok_or(FulfillmentError::NotFound("delivery"))?;
        delivery.check_deletable()?;

        self.deliveries.delete(delivery.id).await?;

        // The order falls back to preparation; its reservation is intact.
        if let Some(mut order) = self.orders.get(delivery.order_id).await? {
            if order.status.is_delivery_driven() {
                order.transition(OrderStatus::Preparing)?;
                self.orders.update_status(order.id, order.status).await?;
            }
        }

        tracing::info!(
            delivery_id = %delivery.id,
            order_id = %delivery.order_id,
            "delivery deleted"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Claims
    // ------------------------------------------------------------------

    pub async fn create_claim(
        &self,
        caller: &AuthContext,
        request: NewClaim,
    ) -> Result<Claim, FulfillmentError> {
        self.timed("create_claim", async {
            if caller.role != Role::Buyer {
                return Err(FulfillmentError::Forbidden);
            }
            let order = self
                .orders
                .get(request.order_id)
                .await?
                .ok_or(FulfillmentError::NotFound("order"))?;
            if order.buyer_id != caller.user_id {
                return Err(FulfillmentError::Forbidden);
            }

            let claim = Claim::new(order.id, caller.user_id, request.description)?;
            self.claims.insert(&claim).await?;

            tracing::info!(claim_id = %claim.id, order_id = %order.id, "claim opened");
            Ok(claim)
        })
        .await
    }

    /// Claims attached to an order, for display alongside it.
    pub async fn list_claims(
        &self,
        caller: &AuthContext,
        order_id: Uuid,
    ) -> Result<Vec<Claim>, FulfillmentError> {
        self.timed("list_claims", async {
            let order = self
                .orders
                .get(order_id)
                .await?
                .ok_or(FulfillmentError::NotFound("order"))?;
            if !caller.is_admin() && order.buyer_id != caller.user_id {
                return Err(FulfillmentError::Forbidden);
            }
            Ok(self.claims.list_by_order(order.id).await?)
        })
        .await
    }

    pub async fn update_claim_status(
        &self,
        caller: &AuthContext,
        claim_id: Uuid,
        status: ClaimStatus,
    ) -> Result<Claim, FulfillmentError> {
        self.timed("update_claim_status", async {
            if !caller.is_admin() {
                return Err(FulfillmentError::Forbidden);
            }
            let mut claim = self
                .claims
                .get(claim_id)
                .await?
                .ok_or(FulfillmentError::NotFound("claim"))?;

            claim.set_status(status);
            self.claims.update(&claim).await?;

            self.notify_best_effort(
                claim.claimant_id,
                "Claim update",
                &format!("Your claim is now {}.", claim.status),
                &format!("/claims/{}", claim.id),
            )
            .await;

            tracing::info!(claim_id = %claim.id, status = %claim.status, "claim status changed");
            Ok(claim)
        })
        .await
    }

    pub async fn update_claim_details(
        &self,
        caller: &AuthContext,
        claim_id: Uuid,
        description: String,
    ) -> Result<Claim, FulfillmentError> {
        self.timed("update_claim_details", async {
            let mut claim = self
                .claims
                .get(claim_id)
                .await?
                .ok_or(FulfillmentError::NotFound("claim"))?;
            if claim.claimant_id != caller.user_id {
                return Err(FulfillmentError::Forbidden);
            }

            claim.set_description(description)?;
            self.claims.update(&claim).await?;
            Ok(claim)
        })
        .await
    }

    pub async fn delete_claim(
        &self,
        caller: &AuthContext,
        claim_id: Uuid,
    ) -> Result<(), FulfillmentError> {
        self.timed("delete_claim", async {
            let claim = self
                .claims
                .get(claim_id)
                .await?
                .ok_or(FulfillmentError::NotFound("claim"))?;
            if claim.claimant_id != caller.user_id {
                return Err(FulfillmentError::Forbidden);
            }

            self.claims.delete(claim.id).await?;
            tracing::info!(claim_id = %claim.id, "claim deleted");
            Ok(())
        })
        .await
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Whether the caller is a seller owning at least one line's article.
    async fn is_seller_of(
        &self,
        caller: &AuthContext,
        order: &Order,
    ) -> Result<bool, FulfillmentError> {
        if caller.role != Role::Seller {
            return Ok(false);
        }
        for line in &order.lines {
            if let Some(article) = self.catalog.article(line.article_id).await? {
                if article.seller_id == caller.user_id {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Carry out the stock side effect of an already-persisted transition.
    /// A failure here is surfaced to the caller rather than unwound; the
    /// state machine guarantees the release is not re-attempted later.
    async fn apply_stock_effect(
        &self,
        order: &Order,
        effect: StockEffect,
    ) -> Result<(), FulfillmentError> {
        if effect == StockEffect::Release {
            let lines = order.reserved_lines();
            self.ledger.release_lines(&lines).await?;
            self.metrics
                .record_release(lines.iter().map(|&(_, qty)| qty).sum::<i32>());
        }
        Ok(())
    }

    /// Fire-and-forget: a sink failure is logged and counted, never
    /// propagated.
    async fn notify_best_effort(&self, user_id: Uuid, title: &str, message: &str, link: &str) {
        if let Err(e) = self.notifier.notify(user_id, title, message, link).await {
            self.metrics.notifications_failed.inc();
            tracing::warn!(user_id = %user_id, error = %e, "notification dropped");
        }
    }

    async fn timed<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T, FulfillmentError>>,
    ) -> Result<T, FulfillmentError> {
        let start = Instant::now();
        let result = fut.await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind().as_str(),
        };
        self.metrics
            .record_operation(operation, outcome, start.elapsed().as_secs_f64());
        result
    }
}

// ============================================================================
// Scenario Tests (in-memory store)
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticIdentityProvider;
    use crate::catalog::{ArticleSummary, StaticCatalog};
    use crate::domain::inventory::Variation;
    use crate::notify::LogNotifier;
    use crate::store::{InMemoryStore, InventoryStore};
    use rust_decimal::Decimal;

    struct Harness {
        service: FulfillmentService,
        store: Arc<InMemoryStore>,
        buyer: AuthContext,
        other_buyer: AuthContext,
        seller: AuthContext,
        courier: AuthContext,
        admin: AuthContext,
        article_id: Uuid,
        variation_id: Uuid,
    }

    impl Harness {
        async fn with_stock(stock: i32) -> Self {
            let store = Arc::new(InMemoryStore::new());
            let catalog = Arc::new(StaticCatalog::new());

            let buyer = AuthContext::new(Uuid::new_v4(), Role::Buyer);
            let other_buyer = AuthContext::new(Uuid::new_v4(), Role::Buyer);
            let seller = AuthContext::new(Uuid::new_v4(), Role::Seller);
            let courier = AuthContext::new(Uuid::new_v4(), Role::Courier);
            let admin = AuthContext::new(Uuid::new_v4(), Role::Administrator);

            let article_id = Uuid::new_v4();
            let variation_id = Uuid::new_v4();
            catalog
                .add_article(ArticleSummary {
                    id: article_id,
                    seller_id: seller.user_id,
                    price: Decimal::new(1999, 2),
                })
                .await;
            catalog.add_variation(article_id, variation_id).await;
            store
                .insert_variation(Variation {
                    id: variation_id,
                    article_id,
                    stock,
                })
                .await
                .unwrap();

            let service = FulfillmentService::new(
                Arc::new(StaticIdentityProvider::new()),
                catalog,
                Arc::new(LogNotifier),
                store.clone(),
                store.clone(),
                store.clone(),
                StockLedger::new(store.clone()),
                Arc::new(Metrics::new().unwrap()),
            );

            Self {
                service,
                store,
                buyer,
                other_buyer,
                seller,
                courier,
                admin,
                article_id,
                variation_id,
            }
        }

        async fn place_order(&self, quantity: i32) -> Result<Order, FulfillmentError> {
            self.service
                .create_order(
                    &self.buyer,
                    NewOrder {
                        lines: vec![NewOrderLine {
                            article_id: self.article_id,
                            variation_id: Some(self.variation_id),
                            quantity,
                        }],
                    },
                )
                .await
        }

        fn new_delivery(&self, order_id: Uuid, courier_id: Option<Uuid>) -> NewDelivery {
            NewDelivery {
                order_id,
                courier_id,
                address: DeliveryAddress {
                    street: "8 rue de la Verrerie".into(),
                    city: "Nantes".into(),
                    postal_code: "44000".into(),
                    country: "FR".into(),
                },
                scheduled_date: NaiveDate::from_ymd_opt(2026, 4, 20).unwrap(),
            }
        }

        async fn stock(&self) -> i32 {
            self.store
                .variation(self.variation_id)
                .await
                .unwrap()
                .unwrap()
                .stock
        }
    }

    #[tokio::test]
    async fn test_order_creation_reserves_exact_stock() {
        let h = Harness::with_stock(3).await;

        let order = h.place_order(3).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_price, Decimal::new(5997, 2));
        assert_eq!(h.stock().await, 0);

        // The exact same request immediately afterwards must fail.
        let err = h.place_order(3).await.unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::InsufficientStock {
                requested: 3,
                available: 0,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_order_creation_requires_known_article() {
        let h = Harness::with_stock(5).await;

        let err = h
            .service
            .create_order(
                &h.buyer,
                NewOrder {
                    lines: vec![NewOrderLine {
                        article_id: Uuid::new_v4(),
                        variation_id: None,
                        quantity: 1,
                    }],
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::NotFound("article")));
        assert_eq!(h.stock().await, 5);
    }

    #[tokio::test]
    async fn test_order_creation_rejects_foreign_variation() {
        let h = Harness::with_stock(5).await;

        let err = h
            .service
            .create_order(
                &h.buyer,
                NewOrder {
                    lines: vec![NewOrderLine {
                        article_id: h.article_id,
                        variation_id: Some(Uuid::new_v4()),
                        quantity: 1,
                    }],
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::NotFound("variation")));
        assert_eq!(h.stock().await, 5);
    }

    #[tokio::test]
    async fn test_only_buyers_place_orders() {
        let h = Harness::with_stock(5).await;
        for caller in [h.seller, h.courier, h.admin] {
            let err = h
                .service
                .create_order(
                    &caller,
                    NewOrder {
                        lines: vec![NewOrderLine {
                            article_id: h.article_id,
                            variation_id: Some(h.variation_id),
                            quantity: 1,
                        }],
                    },
                )
                .await
                .unwrap_err();
            assert!(matches!(err, FulfillmentError::Forbidden));
        }
        assert_eq!(h.stock().await, 5);
    }

    #[tokio::test]
    async fn test_deleting_pending_order_restores_stock() {
        let h = Harness::with_stock(5).await;
        let order = h.place_order(2).await.unwrap();
        assert_eq!(h.stock().await, 3);

        h.service.delete_order(&h.buyer, order.id).await.unwrap();
        assert_eq!(h.stock().await, 5);
        assert!(matches!(
            h.service.get_order(&h.admin, order.id).await.unwrap_err(),
            FulfillmentError::NotFound("order")
        ));
    }

    #[tokio::test]
    async fn test_deleting_delivered_order_fails_and_keeps_stock() {
        let h = Harness::with_stock(5).await;
        let order = h.place_order(2).await.unwrap();
        let delivery = h
            .service
            .create_delivery(&h.admin, h.new_delivery(order.id, None))
            .await
            .unwrap();
        h.service
            .update_delivery_status(&h.admin, delivery.id, DeliveryStatus::InTransit)
            .await
            .unwrap();
        h.service
            .update_delivery_status(&h.admin, delivery.id, DeliveryStatus::Delivered)
            .await
            .unwrap();

        let err = h.service.delete_order(&h.admin, order.id).await.unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::InvalidStateForDeletion {
                status: OrderStatus::Delivered
            }
        ));
        assert_eq!(h.stock().await, 3);
    }

    #[tokio::test]
    async fn test_only_owner_or_admin_deletes_an_order() {
        let h = Harness::with_stock(5).await;
        let order = h.place_order(1).await.unwrap();

        let err = h
            .service
            .delete_order(&h.other_buyer, order.id)
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::Forbidden));

        h.service.delete_order(&h.admin, order.id).await.unwrap();
        assert_eq!(h.stock().await, 5);
    }

    #[tokio::test]
    async fn test_cancellation_releases_once_deletion_does_not_double_release() {
        let h = Harness::with_stock(5).await;
        let order = h.place_order(4).await.unwrap();
        assert_eq!(h.stock().await, 1);

        h.service
            .update_order_status(&h.buyer, order.id, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(h.stock().await, 5);

        // Deleting the cancelled order must not credit stock again.
        h.service.delete_order(&h.buyer, order.id).await.unwrap();
        assert_eq!(h.stock().await, 5);
    }

    #[tokio::test]
    async fn test_refund_from_pending_releases_stock() {
        let h = Harness::with_stock(5).await;
        let order = h.place_order(2).await.unwrap();

        h.service
            .update_order_status(&h.admin, order.id, OrderStatus::Refunded)
            .await
            .unwrap();
        assert_eq!(h.stock().await, 5);

        // Refunded is terminal.
        let err = h
            .service
            .update_order_status(&h.admin, order.id, OrderStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::TerminalStateViolation {
                status: OrderStatus::Refunded
            }
        ));
    }

    #[tokio::test]
    async fn test_refund_is_admin_only_and_buyer_cannot_cancel_others() {
        let h = Harness::with_stock(5).await;
        let order = h.place_order(1).await.unwrap();

        let err = h
            .service
            .update_order_status(&h.buyer, order.id, OrderStatus::Refunded)
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::Forbidden));

        let err = h
            .service
            .update_order_status(&h.other_buyer, order.id, OrderStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::Forbidden));
    }

    #[tokio::test]
    async fn test_client_cannot_drive_delivery_statuses() {
        let h = Harness::with_stock(5).await;
        let order = h.place_order(1).await.unwrap();

        let err = h
            .service
            .update_order_status(&h.admin, order.id, OrderStatus::Delivered)
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delivery_creation_advances_order_and_is_unique() {
        let h = Harness::with_stock(5).await;
        let order = h.place_order(1).await.unwrap();

        h.service
            .create_delivery(&h.seller, h.new_delivery(order.id, None))
            .await
            .unwrap();
        let order = h.service.get_order(&h.admin, order.id).await.unwrap();
        assert_eq!(order.status, OrderStatus::ReadyForDelivery);

        let err = h
            .service
            .create_delivery(&h.seller, h.new_delivery(order.id, None))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::DeliveryAlreadyExists { order_id } if order_id == order.id
        ));
    }

    #[tokio::test]
    async fn test_delivery_creation_requires_seller_of_line_or_admin() {
        let h = Harness::with_stock(5).await;
        let order = h.place_order(1).await.unwrap();

        let foreign_seller = AuthContext::new(Uuid::new_v4(), Role::Seller);
        for caller in [h.buyer, h.courier, foreign_seller] {
            let err = h
                .service
                .create_delivery(&caller, h.new_delivery(order.id, None))
                .await
                .unwrap_err();
            assert!(matches!(err, FulfillmentError::Forbidden));
        }
    }

    #[tokio::test]
    async fn test_delivery_creation_rejected_for_cancelled_and_missing_orders() {
        let h = Harness::with_stock(5).await;
        let order = h.place_order(1).await.unwrap();
        h.service
            .update_order_status(&h.buyer, order.id, OrderStatus::Cancelled)
            .await
            .unwrap();

        let err = h
            .service
            .create_delivery(&h.admin, h.new_delivery(order.id, None))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::InvalidStatusTransition { .. }
        ));

        let err = h
            .service
            .create_delivery(&h.admin, h.new_delivery(Uuid::new_v4(), None))
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::NotFound("order")));
    }

    #[tokio::test]
    async fn test_delivery_round_trip_drives_order_status() {
        let h = Harness::with_stock(5).await;
        let order = h.place_order(1).await.unwrap();
        let delivery = h
            .service
            .create_delivery(&h.admin, h.new_delivery(order.id, Some(h.courier.user_id)))
            .await
            .unwrap();

        h.service
            .update_delivery_status(&h.courier, delivery.id, DeliveryStatus::InTransit)
            .await
            .unwrap();
        let current = h.service.get_order(&h.admin, order.id).await.unwrap();
        assert_eq!(current.status, OrderStatus::InDelivery);

        h.service
            .update_delivery_status(&h.courier, delivery.id, DeliveryStatus::Delivered)
            .await
            .unwrap();
        let current = h.service.get_order(&h.admin, order.id).await.unwrap();
        assert_eq!(current.status, OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn test_only_assigned_courier_or_admin_updates_a_delivery() {
        let h = Harness::with_stock(5).await;
        let order = h.place_order(1).await.unwrap();
        let delivery = h
            .service
            .create_delivery(&h.admin, h.new_delivery(order.id, None))
            .await
            .unwrap();

        // No courier assigned: even a courier is rejected.
        let err = h
            .service
            .update_delivery_status(&h.courier, delivery.id, DeliveryStatus::InTransit)
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::Forbidden));

        let err = h
            .service
            .update_delivery_status(&h.seller, delivery.id, DeliveryStatus::InTransit)
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::Forbidden));

        h.service
            .update_delivery_status(&h.admin, delivery.id, DeliveryStatus::InTransit)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_completed_delivery_cannot_be_deleted() {
        let h = Harness::with_stock(5).await;
        let order = h.place_order(1).await.unwrap();
        let delivery = h
            .service
            .create_delivery(&h.admin, h.new_delivery(order.id, None))
            .await
            .unwrap();
        h.service
            .update_delivery_status(&h.admin, delivery.id, DeliveryStatus::Delivered)
            .await
            .unwrap();

        let err = h
            .service
            .delete_delivery(&h.admin, delivery.id)
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::DeliveryAlreadyCompleted));
    }

    #[tokio::test]
    async fn test_deleting_a_delivery_reverts_the_order_to_preparing() {
        let h = Harness::with_stock(5).await;
        let order = h.place_order(1).await.unwrap();
        let delivery = h
            .service
            .create_delivery(&h.admin, h.new_delivery(order.id, None))
            .await
            .unwrap();

        // Admin only.
        let err = h
            .service
            .delete_delivery(&h.seller, delivery.id)
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::Forbidden));

        h.service.delete_delivery(&h.admin, delivery.id).await.unwrap();
        let current = h.service.get_order(&h.admin, order.id).await.unwrap();
        assert_eq!(current.status, OrderStatus::Preparing);

        // A fresh delivery can be attached again afterwards.
        h.service
            .create_delivery(&h.admin, h.new_delivery(order.id, None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_claims_are_owner_bound_and_admin_reviewed() {
        let h = Harness::with_stock(5).await;
        let order = h.place_order(1).await.unwrap();

        let err = h
            .service
            .create_claim(
                &h.other_buyer,
                NewClaim {
                    order_id: order.id,
                    description: "not my order".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::Forbidden));

        let claim = h
            .service
            .create_claim(
                &h.buyer,
                NewClaim {
                    order_id: order.id,
                    description: "item arrived chipped".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(claim.status, ClaimStatus::PendingReview);

        let err = h
            .service
            .update_claim_status(&h.buyer, claim.id, ClaimStatus::Refunded)
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::Forbidden));

        let updated = h
            .service
            .update_claim_status(&h.admin, claim.id, ClaimStatus::InProgress)
            .await
            .unwrap();
        assert_eq!(updated.status, ClaimStatus::InProgress);

        // Details and deletion belong to the claimant.
        let err = h
            .service
            .update_claim_details(&h.admin, claim.id, "rewritten".into())
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::Forbidden));

        h.service
            .update_claim_details(&h.buyer, claim.id, "item arrived shattered".into())
            .await
            .unwrap();
        h.service.delete_claim(&h.buyer, claim.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_claim_lifecycle_never_touches_order_or_delivery() {
        let h = Harness::with_stock(5).await;
        let order = h.place_order(1).await.unwrap();
        let delivery = h
            .service
            .create_delivery(&h.admin, h.new_delivery(order.id, None))
            .await
            .unwrap();

        let claim = h
            .service
            .create_claim(
                &h.buyer,
                NewClaim {
                    order_id: order.id,
                    description: "box was soaked".into(),
                },
            )
            .await
            .unwrap();

        for status in [
            ClaimStatus::InProgress,
            ClaimStatus::Rejected,
            ClaimStatus::Refunded,
        ] {
            h.service
                .update_claim_status(&h.admin, claim.id, status)
                .await
                .unwrap();

            let order_now = h.service.get_order(&h.admin, order.id).await.unwrap();
            assert_eq!(order_now.status, OrderStatus::ReadyForDelivery);
            let delivery_now = h
                .service
                .update_delivery_status(&h.admin, delivery.id, DeliveryStatus::Scheduled)
                .await
                .unwrap();
            assert_eq!(delivery_now.status, DeliveryStatus::Scheduled);
        }
    }

    #[tokio::test]
    async fn test_claims_listing_is_owner_or_admin_only() {
        let h = Harness::with_stock(5).await;
        let order = h.place_order(1).await.unwrap();
        for description in ["seam came undone", "missing a button"] {
            h.service
                .create_claim(
                    &h.buyer,
                    NewClaim {
                        order_id: order.id,
                        description: description.into(),
                    },
                )
                .await
                .unwrap();
        }

        let listed = h.service.list_claims(&h.buyer, order.id).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(h.service.list_claims(&h.admin, order.id).await.is_ok());
        assert!(matches!(
            h.service.list_claims(&h.other_buyer, order.id).await,
            Err(FulfillmentError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_order_fetch_is_owner_or_admin_only() {
        let h = Harness::with_stock(5).await;
        let order = h.place_order(1).await.unwrap();

        assert!(h.service.get_order(&h.buyer, order.id).await.is_ok());
        assert!(h.service.get_order(&h.admin, order.id).await.is_ok());
        assert!(matches!(
            h.service.get_order(&h.other_buyer, order.id).await,
            Err(FulfillmentError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_orders_never_oversell() {
        let h = Harness::with_stock(5).await;
        let service = Arc::new(h.service);

        // Eight buyers race for five units, one unit each.
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                let article_id = h.article_id;
                let variation_id = h.variation_id;
                tokio::spawn(async move {
                    let buyer = AuthContext::new(Uuid::new_v4(), Role::Buyer);
                    service
                        .create_order(
                            &buyer,
                            NewOrder {
                                lines: vec![NewOrderLine {
                                    article_id,
                                    variation_id: Some(variation_id),
                                    quantity: 1,
                                }],
                            },
                        )
                        .await
                })
            })
            .collect();

        let results = futures_util::future::join_all(tasks).await;
        let mut created = 0;
        let mut rejected = 0;
        for result in results {
            match result.unwrap() {
                Ok(_) => created += 1,
                Err(FulfillmentError::InsufficientStock { .. }) => rejected += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(created, 5);
        assert_eq!(rejected, 3);
        let remaining = h
            .store
            .variation(h.variation_id)
            .await
            .unwrap()
            .unwrap()
            .stock;
        assert_eq!(remaining, 0);
    }
}
