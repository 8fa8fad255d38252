//! Persistence seam.
//!
//! Every service operation is one unit of work: it opens a [`Transaction`],
//! reads and writes through it, and commits. Dropping a transaction without
//! committing discards all of its writes. Records read through a transaction
//! stay locked against other writers until it ends, which is what makes the
//! check-then-decrement in order placement safe under concurrency.
//!
//! Locks are taken in one order on every path: orders, then items by id, then
//! carts. Paths that need a cart's contents to know which items to lock read
//! it unlocked first and re-check it once the items are held.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::aggregates::{Account, Cart, Item, Order, Role};
use crate::domain::value_objects::Category;
use crate::Result;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn begin(&self) -> Result<Box<dyn Transaction>>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AccountFilter {
    pub role: Option<Role>,
    pub created_by: Option<Uuid>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct OrderFilter {
    pub owner: Option<Uuid>,
    pub item: Option<Uuid>,
    /// Only `pending` and `shipped` orders.
    pub open_only: bool,
}

#[async_trait]
pub trait Transaction: Send {
    async fn account(&mut self, id: Uuid) -> Result<Option<Account>>;
    async fn account_by_email(&mut self, email: &str) -> Result<Option<Account>>;
    async fn accounts(&mut self, filter: AccountFilter) -> Result<Vec<Account>>;
    /// Fails with `Conflict` on a taken email or a second admin.
    async fn insert_account(&mut self, account: &Account) -> Result<()>;
    async fn update_account(&mut self, account: &Account) -> Result<()>;
    async fn delete_account(&mut self, id: Uuid) -> Result<bool>;

    /// Batch lookup for writing; ids that do not resolve are simply absent from the result.
    async fn items(&mut self, ids: &[Uuid]) -> Result<Vec<Item>>;
    /// Reads an item that only has to outlive the transaction. Stock updates
    /// proceed concurrently; deletion waits.
    async fn item_shared(&mut self, id: Uuid) -> Result<Option<Item>>;
    async fn list_items(&mut self, category: Option<&Category>) -> Result<Vec<Item>>;
    async fn save_item(&mut self, item: &Item) -> Result<()>;
    async fn delete_item(&mut self, id: Uuid) -> Result<bool>;

    async fn cart(&mut self, owner: Uuid) -> Result<Option<Cart>>;
    /// Reads a cart without locking it.
    async fn cart_snapshot(&mut self, owner: Uuid) -> Result<Option<Cart>>;
    async fn carts_containing(&mut self, item_id: Uuid) -> Result<Vec<Cart>>;
    async fn save_cart(&mut self, cart: &Cart) -> Result<()>;
    async fn delete_cart(&mut self, owner: Uuid) -> Result<bool>;

    async fn order(&mut self, id: Uuid) -> Result<Option<Order>>;
    /// Newest first.
    async fn orders(&mut self, filter: OrderFilter) -> Result<Vec<Order>>;
    async fn order_by_idempotency_key(&mut self, owner: Uuid, key: &str) -> Result<Option<Order>>;
    async fn save_order(&mut self, order: &Order) -> Result<()>;
    async fn delete_order(&mut self, id: Uuid) -> Result<bool>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn item(&mut self, id: Uuid) -> Result<Option<Item>> {
        Ok(self.items(&[id]).await?.into_iter().next())
    }
}
