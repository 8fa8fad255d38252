//! In-process store. Transactions are serialized behind one async mutex and
//! work on a private copy of the state that replaces the shared one on commit.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{AccountFilter, OrderFilter, Store, Transaction};
use crate::domain::aggregates::{Account, Cart, Item, Order, Role};
use crate::domain::value_objects::Category;
use crate::{CommerceError, Result};

#[derive(Clone, Debug, Default)]
struct State {
    accounts: HashMap<Uuid, Account>,
    items: HashMap<Uuid, Item>,
    carts: HashMap<Uuid, Cart>,
    orders: HashMap<Uuid, Order>,
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<State>,
    working: State,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn account(&mut self, id: Uuid) -> Result<Option<Account>> {
        Ok(self.working.accounts.get(&id).cloned())
    }

    async fn account_by_email(&mut self, email: &str) -> Result<Option<Account>> {
        Ok(self.working.accounts.values().find(|a| a.email == email).cloned())
    }

    async fn accounts(&mut self, filter: AccountFilter) -> Result<Vec<Account>> {
        let mut found: Vec<Account> = self
            .working
            .accounts
            .values()
            .filter(|a| filter.role.map_or(true, |r| a.role == r))
            .filter(|a| filter.created_by.map_or(true, |c| a.created_by == Some(c)))
            .cloned()
            .collect();
        found.sort_by_key(|a| a.created_at);
        Ok(found)
    }

    async fn insert_account(&mut self, account: &Account) -> Result<()> {
        if self.working.accounts.values().any(|a| a.email == account.email) {
            return Err(CommerceError::Conflict(format!("email {} is already registered", account.email)));
        }
        if account.role == Role::Admin && self.working.accounts.values().any(|a| a.role == Role::Admin) {
            return Err(CommerceError::Conflict("an admin account already exists".into()));
        }
        self.working.accounts.insert(account.id, stored(account, |a| a.events.clear()));
        Ok(())
    }

    async fn update_account(&mut self, account: &Account) -> Result<()> {
        if self.working.accounts.values().any(|a| a.email == account.email && a.id != account.id) {
            return Err(CommerceError::Conflict(format!("email {} is already registered", account.email)));
        }
        self.working.accounts.insert(account.id, stored(account, |a| a.events.clear()));
        Ok(())
    }

    async fn delete_account(&mut self, id: Uuid) -> Result<bool> {
        Ok(self.working.accounts.remove(&id).is_some())
    }

    async fn items(&mut self, ids: &[Uuid]) -> Result<Vec<Item>> {
        Ok(ids.iter().filter_map(|id| self.working.items.get(id).cloned()).collect())
    }

    async fn item_shared(&mut self, id: Uuid) -> Result<Option<Item>> {
        Ok(self.working.items.get(&id).cloned())
    }

    async fn list_items(&mut self, category: Option<&Category>) -> Result<Vec<Item>> {
        let mut found: Vec<Item> =
            self.working.items.values().filter(|i| category.map_or(true, |c| &i.category == c)).cloned().collect();
        found.sort_by_key(|i| i.created_at);
        Ok(found)
    }

    async fn save_item(&mut self, item: &Item) -> Result<()> {
        self.working.items.insert(item.id, stored(item, |i| i.events.clear()));
        Ok(())
    }

    async fn delete_item(&mut self, id: Uuid) -> Result<bool> {
        Ok(self.working.items.remove(&id).is_some())
    }

    async fn cart(&mut self, owner: Uuid) -> Result<Option<Cart>> {
        Ok(self.working.carts.get(&owner).cloned())
    }

    async fn cart_snapshot(&mut self, owner: Uuid) -> Result<Option<Cart>> {
        Ok(self.working.carts.get(&owner).cloned())
    }

    async fn carts_containing(&mut self, item_id: Uuid) -> Result<Vec<Cart>> {
        Ok(self.working.carts.values().filter(|c| c.contains_item(item_id)).cloned().collect())
    }

    async fn save_cart(&mut self, cart: &Cart) -> Result<()> {
        self.working.carts.insert(cart.owner_account_id, cart.clone());
        Ok(())
    }

    async fn delete_cart(&mut self, owner: Uuid) -> Result<bool> {
        Ok(self.working.carts.remove(&owner).is_some())
    }

    async fn order(&mut self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn orders(&mut self, filter: OrderFilter) -> Result<Vec<Order>> {
        let mut found: Vec<Order> = self
            .working
            .orders
            .values()
            .filter(|o| filter.owner.map_or(true, |owner| o.owner_account_id == owner))
            .filter(|o| filter.item.map_or(true, |item| o.references_item(item)))
            .filter(|o| !filter.open_only || o.status.is_open())
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }

    async fn order_by_idempotency_key(&mut self, owner: Uuid, key: &str) -> Result<Option<Order>> {
        Ok(self
            .working
            .orders
            .values()
            .find(|o| o.owner_account_id == owner && o.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn save_order(&mut self, order: &Order) -> Result<()> {
        if let Some(key) = order.idempotency_key.as_deref() {
            let taken = self.working.orders.values().any(|o| {
                o.id != order.id && o.owner_account_id == order.owner_account_id && o.idempotency_key.as_deref() == Some(key)
            });
            if taken {
                return Err(CommerceError::Conflict(format!("idempotency key {key} is already used")));
            }
        }
        self.working.orders.insert(order.id, stored(order, |o| o.events.clear()));
        Ok(())
    }

    async fn delete_order(&mut self, id: Uuid) -> Result<bool> {
        Ok(self.working.orders.remove(&id).is_some())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

/// Pending events belong to the caller, never to the stored copy.
fn stored<T: Clone>(value: &T, strip: impl FnOnce(&mut T)) -> T {
    let mut copy = value.clone();
    strip(&mut copy);
    copy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::ItemDraft;
    use rust_decimal::Decimal;

    fn item() -> Item {
        Item::create(
            ItemDraft {
                name: "Lamp".into(),
                category: Category::new("Acme", "Lighting"),
                price: Decimal::new(30, 0),
                quantity: 4,
                description: String::new(),
                photo_url: None,
                status: None,
            },
            Uuid::new_v4(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_discarded() {
        let store = MemoryStore::new();
        let item = item();
        {
            let mut tx = store.begin().await.unwrap();
            tx.save_item(&item).await.unwrap();
        }
        let mut tx = store.begin().await.unwrap();
        assert!(tx.item(item.id()).await.unwrap().is_none());
        tx.save_item(&item).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let loaded = tx.item(item.id()).await.unwrap().unwrap();
        assert!(loaded.events.is_empty());
    }

    #[tokio::test]
    async fn test_single_admin_and_unique_email() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_account(&Account::create("Root", "root@desk.io", "h".into(), Role::Admin, None)).await.unwrap();
        let second = Account::create("Other", "other@desk.io", "h".into(), Role::Admin, None);
        assert!(matches!(tx.insert_account(&second).await, Err(CommerceError::Conflict(_))));
        let dup = Account::create("Dup", "ROOT@desk.io", "h".into(), Role::Vendor, None);
        assert!(matches!(tx.insert_account(&dup).await, Err(CommerceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_batch_lookup_skips_missing() {
        let store = MemoryStore::new();
        let item = item();
        let mut tx = store.begin().await.unwrap();
        tx.save_item(&item).await.unwrap();
        let found = tx.items(&[item.id(), Uuid::new_v4()]).await.unwrap();
        assert_eq!(found.len(), 1);
    }
}
