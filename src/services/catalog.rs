//! Catalog store: items and their stock.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::auth::Principal;
use crate::domain::aggregates::{Item, ItemDraft, ItemPatch, ItemStatus};
use crate::domain::events::{DomainEvent, ItemEvent};
use crate::domain::value_objects::Category;
use crate::publisher::EventPublisher;
use crate::store::{OrderFilter, Store, Transaction};
use crate::{CommerceError, Result};

#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn Store>,
    events: Arc<dyn EventPublisher>,
}

impl Catalog {
    pub fn new(store: Arc<dyn Store>, events: Arc<dyn EventPublisher>) -> Self {
        Self { store, events }
    }

    #[instrument(skip(self, draft), fields(actor = %actor.account_id))]
    pub async fn create_item(&self, actor: &Principal, draft: ItemDraft) -> Result<Item> {
        actor.require_admin()?;
        let mut item = Item::create(draft, actor.account_id)?;
        let mut tx = self.store.begin().await?;
        tx.save_item(&item).await?;
        tx.commit().await?;
        info!(item_id = %item.id(), quantity = item.quantity(), "item created");
        self.events.publish_all(item.take_events()).await;
        Ok(item)
    }

    pub async fn get_item(&self, id: Uuid) -> Result<Item> {
        let mut tx = self.store.begin().await?;
        tx.item_shared(id).await?.ok_or(CommerceError::ItemNotFound(id))
    }

    pub async fn list_items(&self) -> Result<Vec<Item>> {
        let mut tx = self.store.begin().await?;
        tx.list_items(None).await
    }

    #[instrument(skip(self))]
    pub async fn list_by_category(&self, category: &Category) -> Result<Vec<Item>> {
        let mut tx = self.store.begin().await?;
        let items = tx.list_items(Some(category)).await?;
        debug!(count = items.len(), "items in category");
        Ok(items)
    }

    /// Manual stock correction (restock or write-off).
    #[instrument(skip(self), fields(actor = %actor.account_id))]
    pub async fn adjust_quantity(&self, actor: &Principal, id: Uuid, delta: i64) -> Result<Item> {
        actor.require_admin()?;
        let mut tx = self.store.begin().await?;
        let mut item = tx.item(id).await?.ok_or(CommerceError::ItemNotFound(id))?;
        adjust_in(&mut *tx, &mut item, delta).await?;
        tx.commit().await?;
        info!(item_id = %id, quantity = item.quantity(), "stock adjusted");
        self.events.publish_all(item.take_events()).await;
        Ok(item)
    }

    #[instrument(skip(self, patch), fields(actor = %actor.account_id))]
    pub async fn update_item(&self, actor: &Principal, id: Uuid, patch: ItemPatch) -> Result<Item> {
        actor.require_admin()?;
        let mut tx = self.store.begin().await?;
        let mut item = tx.item(id).await?.ok_or(CommerceError::ItemNotFound(id))?;
        item.apply_patch(patch)?;
        tx.save_item(&item).await?;
        tx.commit().await?;
        info!(item_id = %id, "item updated");
        self.events.publish_all(item.take_events()).await;
        Ok(item)
    }

    /// Removes an item no open order still references. `expected_status`, when
    /// given, must name the item's current status.
    #[instrument(skip(self), fields(actor = %actor.account_id))]
    pub async fn delete_item(&self, actor: &Principal, id: Uuid, expected_status: Option<&str>) -> Result<()> {
        actor.require_admin()?;
        let expected = expected_status.map(ItemStatus::parse).transpose()?;
        let mut tx = self.store.begin().await?;
        let item = tx.item(id).await?.ok_or(CommerceError::ItemNotFound(id))?;
        if let Some(expected) = expected.filter(|s| *s != item.status()) {
            return Err(CommerceError::Conflict(format!("item {id} is {}, not {expected}", item.status())));
        }
        let open = tx.orders(OrderFilter { item: Some(id), open_only: true, ..Default::default() }).await?;
        if !open.is_empty() {
            warn!(item_id = %id, open_orders = open.len(), "refusing to delete item referenced by open orders");
            return Err(CommerceError::Conflict(format!("item {id} is referenced by {} open order(s)", open.len())));
        }
        // Deleting first waits out cart edits still holding the item, so the
        // scan below sees every line they added.
        tx.delete_item(id).await?;
        for mut cart in tx.carts_containing(id).await? {
            if cart.drop_item(id)? {
                tx.save_cart(&cart).await?;
            }
        }
        tx.commit().await?;
        info!(item_id = %id, "item deleted");
        self.events.publish(&DomainEvent::Item(ItemEvent::Deleted { item_id: id })).await;
        Ok(())
    }
}

/// Applies a stock delta to an item loaded in `tx` and persists it there.
pub(crate) async fn adjust_in(tx: &mut dyn Transaction, item: &mut Item, delta: i64) -> Result<()> {
    item.adjust_quantity(delta)?;
    tx.save_item(item).await
}
