//! Order workflow: placement, corrections, status changes.
//!
//! Placement runs inside one transaction: every line is resolved and checked
//! against stock before the first decrement, so a failing line leaves the
//! catalog, the cart and the order book exactly as they were.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::Principal;
use crate::domain::aggregates::{Cart, Item, Order, OrderLine, OrderStatus, PaymentMethod, PaymentStatus, Transition};
use crate::publisher::EventPublisher;
use crate::services::catalog;
use crate::store::{OrderFilter, Store, Transaction};
use crate::{CommerceError, Result};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineRequest {
    pub item_id: Uuid,
    pub quantity: i64,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkout {
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub delivery_address: String,
    /// Retrying with the same key returns the order the first attempt placed.
    pub idempotency_key: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrder {
    pub lines: Vec<LineRequest>,
    #[serde(flatten)]
    pub checkout: Checkout,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub status: String,
    pub payment_status: Option<String>,
}

#[derive(Clone)]
pub struct Orders {
    store: Arc<dyn Store>,
    events: Arc<dyn EventPublisher>,
}

impl Orders {
    pub fn new(store: Arc<dyn Store>, events: Arc<dyn EventPublisher>) -> Self {
        Self { store, events }
    }

    /// Places an order for explicit lines and empties the account's cart.
    #[instrument(skip(self, request), fields(actor = %actor.account_id, lines = request.lines.len()))]
    pub async fn place_order(&self, actor: &Principal, account_id: Uuid, request: PlaceOrder) -> Result<Order> {
        actor.require_owner_or_admin(account_id)?;
        let key = request.checkout.idempotency_key.clone();
        let placed: Result<Order> = async move {
            let mut tx = self.store.begin().await?;
            if let Some(existing) = replay(&mut *tx, account_id, &request.checkout).await? {
                return Ok(existing);
            }
            let wanted = merge_lines(&request.lines)?;
            ensure_buyer(&mut *tx, account_id).await?;
            self.place(tx, account_id, wanted, request.checkout, None).await
        }
        .await;
        self.settle(account_id, key, placed).await
    }

    /// Places an order for everything in the account's cart.
    #[instrument(skip(self, checkout), fields(actor = %actor.account_id))]
    pub async fn place_order_from_cart(&self, actor: &Principal, account_id: Uuid, checkout: Checkout) -> Result<Order> {
        actor.require_owner_or_admin(account_id)?;
        let key = checkout.idempotency_key.clone();
        let placed: Result<Order> = async move {
            let mut tx = self.store.begin().await?;
            if let Some(existing) = replay(&mut *tx, account_id, &checkout).await? {
                return Ok(existing);
            }
            ensure_buyer(&mut *tx, account_id).await?;
            let snapshot = tx.cart_snapshot(account_id).await?.unwrap_or_else(|| Cart::for_account(account_id));
            let lines: Vec<LineRequest> =
                snapshot.lines().iter().map(|l| LineRequest { item_id: l.item_id, quantity: i64::from(l.quantity) }).collect();
            if lines.is_empty() {
                return Err(CommerceError::InvalidInput("cart is empty".into()));
            }
            let wanted = merge_lines(&lines)?;
            self.place(tx, account_id, wanted, checkout, Some(snapshot)).await
        }
        .await;
        self.settle(account_id, key, placed).await
    }

    /// Locks the items, then the cart. A checkout from `expected_cart` fails
    /// with `Conflict` when the cart changed after it was read.
    async fn place(
        &self,
        mut tx: Box<dyn Transaction>,
        account_id: Uuid,
        wanted: Vec<(Uuid, u32)>,
        checkout: Checkout,
        expected_cart: Option<Cart>,
    ) -> Result<Order> {
        let ids: Vec<Uuid> = wanted.iter().map(|(id, _)| *id).collect();
        let mut items: HashMap<Uuid, Item> = tx.items(&ids).await?.into_iter().map(|i| (i.id(), i)).collect();
        let missing: Vec<Uuid> = ids.iter().copied().filter(|id| !items.contains_key(id)).collect();
        if !missing.is_empty() {
            return Err(CommerceError::ItemsNotFound(missing));
        }

        // Validate every line before the first write.
        for (id, quantity) in &wanted {
            if let Some(item) = items.get(id) {
                item.ensure_stock(u64::from(*quantity))?;
            }
        }

        let mut lines = Vec::with_capacity(wanted.len());
        let mut touched = Vec::with_capacity(wanted.len());
        for (id, quantity) in wanted {
            let mut item = items.remove(&id).ok_or(CommerceError::ItemNotFound(id))?;
            catalog::adjust_in(&mut *tx, &mut item, -i64::from(quantity)).await?;
            lines.push(OrderLine {
                item_id: id,
                item_name: item.name().to_string(),
                quantity,
                unit_price_at_purchase: item.price(),
                allocated_quantity: quantity,
            });
            touched.push(item);
        }

        let mut cart = tx.cart(account_id).await?.unwrap_or_else(|| Cart::for_account(account_id));
        if expected_cart.is_some_and(|expected| expected.lines() != cart.lines()) {
            return Err(CommerceError::Conflict("cart changed during checkout".into()));
        }
        let mut order = Order::place(account_id, lines, checkout.payment_method, checkout.delivery_address, checkout.idempotency_key)?;
        tx.save_order(&order).await?;
        cart.clear();
        tx.save_cart(&cart).await?;
        tx.commit().await?;

        info!(order_id = %order.id(), %account_id, total = %order.total_amount(), "order placed");
        let mut events = order.take_events();
        for item in &mut touched {
            events.extend(item.take_events());
        }
        self.events.publish_all(events).await;
        Ok(order)
    }

    /// A concurrent attempt with the same idempotency key can commit after this
    /// one missed the replay lookup. This attempt then fails (on the unique key,
    /// the emptied cart or the stock it took) and answers with the winner's order.
    async fn settle(&self, account_id: Uuid, key: Option<String>, placed: Result<Order>) -> Result<Order> {
        let key = match key {
            Some(key) if placed.is_err() => key,
            _ => return placed,
        };
        let mut tx = self.store.begin().await?;
        match tx.order_by_idempotency_key(account_id, &key).await? {
            Some(order) => {
                info!(order_id = %order.id(), idempotency_key = %key, "concurrent placement already stored this order");
                Ok(order)
            }
            None => placed,
        }
    }

    pub async fn get_order(&self, actor: &Principal, order_id: Uuid) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        let order = tx.order(order_id).await?.ok_or(CommerceError::OrderNotFound(order_id))?;
        actor.require_owner_or_admin(order.owner_account_id())?;
        Ok(order)
    }

    /// Admins see every order (optionally one account's); others only their own.
    pub async fn list_orders(&self, actor: &Principal, owner: Option<Uuid>) -> Result<Vec<Order>> {
        let owner = match owner {
            Some(owner) => {
                actor.require_owner_or_admin(owner)?;
                Some(owner)
            }
            None if actor.is_admin() => None,
            None => Some(actor.account_id),
        };
        let mut tx = self.store.begin().await?;
        tx.orders(OrderFilter { owner, ..Default::default() }).await
    }

    /// Billing correction by an admin. Purchase prices and stock allocations are untouched.
    #[instrument(skip(self, lines), fields(actor = %actor.account_id))]
    pub async fn update_order_lines(&self, actor: &Principal, order_id: Uuid, lines: &[LineRequest]) -> Result<Order> {
        actor.require_admin()?;
        let updates: Vec<(Uuid, i64)> = lines.iter().map(|l| (l.item_id, l.quantity)).collect();
        let mut tx = self.store.begin().await?;
        let mut order = tx.order(order_id).await?.ok_or(CommerceError::OrderNotFound(order_id))?;
        order.correct_lines(&updates)?;
        tx.save_order(&order).await?;
        tx.commit().await?;
        info!(%order_id, total = %order.total_amount(), "order lines corrected");
        self.events.publish_all(order.take_events()).await;
        Ok(order)
    }

    /// Moves the order along its fulfilment table and optionally settles it.
    /// Moving to `cancelled` returns the allocated stock.
    #[instrument(skip(self), fields(actor = %actor.account_id))]
    pub async fn transition_status(&self, actor: &Principal, order_id: Uuid, change: &StatusChange) -> Result<Order> {
        let next = OrderStatus::parse(&change.status)?;
        let payment = change.payment_status.as_deref().map(PaymentStatus::parse).transpose()?;
        let mut tx = self.store.begin().await?;
        let mut order = tx.order(order_id).await?.ok_or(CommerceError::OrderNotFound(order_id))?;
        actor.require_owner_or_admin(order.owner_account_id())?;
        let outcome = order.transition(next, payment)?;
        self.finish_transition(tx, order, outcome).await
    }

    #[instrument(skip(self), fields(actor = %actor.account_id))]
    pub async fn cancel_order(&self, actor: &Principal, order_id: Uuid) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        let mut order = tx.order(order_id).await?.ok_or(CommerceError::OrderNotFound(order_id))?;
        actor.require_owner_or_admin(order.owner_account_id())?;
        let outcome = order.cancel()?;
        self.finish_transition(tx, order, outcome).await
    }

    async fn finish_transition(&self, mut tx: Box<dyn Transaction>, mut order: Order, outcome: Transition) -> Result<Order> {
        let mut touched = Vec::new();
        if let Transition::Cancelled(released) = &outcome {
            touched = restock(&mut *tx, released).await?;
        }
        tx.save_order(&order).await?;
        tx.commit().await?;
        match outcome {
            Transition::Unchanged => info!(order_id = %order.id(), payment = %order.payment_status(), "order settlement updated"),
            _ => info!(order_id = %order.id(), status = %order.status(), "order status changed"),
        }
        let mut events = order.take_events();
        for item in &mut touched {
            events.extend(item.take_events());
        }
        self.events.publish_all(events).await;
        Ok(order)
    }

    /// Hard-deletes an order. A pending order's allocations go back to stock first.
    #[instrument(skip(self), fields(actor = %actor.account_id))]
    pub async fn purge_order(&self, actor: &Principal, order_id: Uuid) -> Result<()> {
        actor.require_admin()?;
        let mut tx = self.store.begin().await?;
        let mut order = tx.order(order_id).await?.ok_or(CommerceError::OrderNotFound(order_id))?;
        let mut touched = Vec::new();
        if order.status() == OrderStatus::Pending {
            let released = order.release_allocations();
            touched = restock(&mut *tx, &released).await?;
        }
        order.mark_purged();
        tx.delete_order(order_id).await?;
        tx.commit().await?;
        info!(%order_id, restocked = touched.len(), "order purged");
        let mut events = order.take_events();
        for item in &mut touched {
            events.extend(item.take_events());
        }
        self.events.publish_all(events).await;
        Ok(())
    }
}

/// Admins curate the catalog but cannot buy.
async fn ensure_buyer(tx: &mut dyn Transaction, account_id: Uuid) -> Result<()> {
    let account = tx.account(account_id).await?.ok_or(CommerceError::AccountNotFound(account_id))?;
    if !account.role().is_buyer() {
        return Err(CommerceError::Forbidden(format!("role {} cannot place orders", account.role())));
    }
    Ok(())
}

/// The order a previous attempt with the same idempotency key placed, if any.
async fn replay(tx: &mut dyn Transaction, account_id: Uuid, checkout: &Checkout) -> Result<Option<Order>> {
    let Some(key) = checkout.idempotency_key.as_deref() else { return Ok(None) };
    let existing = tx.order_by_idempotency_key(account_id, key).await?;
    if let Some(order) = &existing {
        info!(order_id = %order.id(), idempotency_key = key, "returning previously placed order");
    }
    Ok(existing)
}

/// Validates quantities and folds repeated items into one line, keeping first-seen order.
fn merge_lines(lines: &[LineRequest]) -> Result<Vec<(Uuid, u32)>> {
    if lines.is_empty() {
        return Err(CommerceError::InvalidInput("order needs at least one line".into()));
    }
    let mut merged: Vec<(Uuid, u32)> = Vec::with_capacity(lines.len());
    for line in lines {
        let quantity = u32::try_from(line.quantity).ok().filter(|q| *q > 0).ok_or(CommerceError::InvalidQuantity(line.quantity))?;
        match merged.iter_mut().find(|(id, _)| *id == line.item_id) {
            Some((_, total)) => {
                *total = total.checked_add(quantity).ok_or(CommerceError::InvalidQuantity(line.quantity))?;
            }
            None => merged.push((line.item_id, quantity)),
        }
    }
    Ok(merged)
}

/// Returns released allocations to stock. Items deleted since are skipped.
async fn restock(tx: &mut dyn Transaction, released: &[(Uuid, u32)]) -> Result<Vec<Item>> {
    let ids: Vec<Uuid> = released.iter().map(|(id, _)| *id).collect();
    let mut items: HashMap<Uuid, Item> = tx.items(&ids).await?.into_iter().map(|i| (i.id(), i)).collect();
    let mut touched = Vec::with_capacity(released.len());
    for &(id, quantity) in released {
        let Some(mut item) = items.remove(&id) else {
            warn!(item_id = %id, quantity, "allocation dropped, item no longer exists");
            continue;
        };
        catalog::adjust_in(tx, &mut item, i64::from(quantity)).await?;
        touched.push(item);
    }
    Ok(touched)
}
