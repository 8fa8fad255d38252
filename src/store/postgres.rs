//! Postgres store (sqlx).
//!
//! Rows read for writing are locked with `SELECT … FOR UPDATE`, in the order
//! orders, items, carts. Items taken for a stock change are locked
//! `FOR NO KEY UPDATE` in id order; items a cart line merely refers to are held
//! `FOR KEY SHARE`, which blocks their deletion but not stock changes. Cart and
//! order lines live in JSONB columns on their owning row, so they are written
//! and purged together with it.
//!
//! Deadlocks and serialization failures surface as `Conflict`, so clients can
//! retry them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::Postgres;
use uuid::Uuid;

use super::{AccountFilter, OrderFilter, Store, Transaction};
use crate::domain::aggregates::{
    Account, Cart, CartLine, Item, ItemStatus, Order, OrderLine, OrderStatus, PaymentMethod, PaymentStatus, Role,
};
use crate::domain::value_objects::{Category, Money, Quantity};
use crate::{CommerceError, Result};

const DEADLOCK_DETECTED: &str = "40P01";
const SERIALIZATION_FAILURE: &str = "40001";

impl From<sqlx::Error> for CommerceError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => CommerceError::Conflict(db.message().to_string()),
            sqlx::Error::Database(db) if matches!(db.code().as_deref(), Some(DEADLOCK_DETECTED | SERIALIZATION_FAILURE)) => {
                CommerceError::Conflict(format!("concurrent update, retry: {}", db.message()))
            }
            _ => CommerceError::Storage(err.to_string()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|e| CommerceError::Storage(e.to_string()))
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        Ok(Box::new(PgTransaction { tx: self.pool.begin().await? }))
    }
}

struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

const ACCOUNT_COLUMNS: &str = "id, name, email, password_hash, role, created_by, created_at, updated_at";
const ITEM_COLUMNS: &str =
    "id, name, company_name, product_name, price, quantity, status, owner_account_id, photo_url, description, created_at, updated_at";
const ORDER_COLUMNS: &str = "id, owner_account_id, lines, total_amount, status, payment_method, payment_status, \
                             delivery_address, idempotency_key, created_at, updated_at";

#[async_trait]
impl Transaction for PgTransaction {
    async fn account(&mut self, id: Uuid) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Account::try_from).transpose()
    }

    async fn account_by_email(&mut self, email: &str) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1"))
            .bind(email)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Account::try_from).transpose()
    }

    async fn accounts(&mut self, filter: AccountFilter) -> Result<Vec<Account>> {
        let rows = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts \
             WHERE ($1::text IS NULL OR role = $1) AND ($2::uuid IS NULL OR created_by = $2) \
             ORDER BY created_at"
        ))
        .bind(filter.role.map(|r| r.to_string()))
        .bind(filter.created_by)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(Account::try_from).collect()
    }

    async fn insert_account(&mut self, account: &Account) -> Result<()> {
        sqlx::query(&format!("INSERT INTO accounts ({ACCOUNT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"))
            .bind(account.id)
            .bind(&account.name)
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(account.role.to_string())
            .bind(account.created_by)
            .bind(account.created_at)
            .bind(account.updated_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn update_account(&mut self, account: &Account) -> Result<()> {
        sqlx::query("UPDATE accounts SET name = $2, email = $3, password_hash = $4, updated_at = $5 WHERE id = $1")
            .bind(account.id)
            .bind(&account.name)
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(account.updated_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_account(&mut self, id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM accounts WHERE id = $1").bind(id).execute(&mut *self.tx).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn items(&mut self, ids: &[Uuid]) -> Result<Vec<Item>> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id = ANY($1) ORDER BY id FOR NO KEY UPDATE"
        ))
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(Item::try_from).collect()
    }

    async fn item_shared(&mut self, id: Uuid) -> Result<Option<Item>> {
        let row = sqlx::query_as::<_, ItemRow>(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1 FOR KEY SHARE"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Item::try_from).transpose()
    }

    async fn list_items(&mut self, category: Option<&Category>) -> Result<Vec<Item>> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items \
             WHERE ($1::text IS NULL OR (company_name = $1 AND product_name = $2)) ORDER BY created_at"
        ))
        .bind(category.map(|c| c.company_name.as_str()))
        .bind(category.map(|c| c.product_name.as_str()))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(Item::try_from).collect()
    }

    async fn save_item(&mut self, item: &Item) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO items ({ITEM_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (id) DO UPDATE SET name = $2, company_name = $3, product_name = $4, price = $5, \
             quantity = $6, status = $7, photo_url = $9, description = $10, updated_at = $12"
        ))
        .bind(item.id)
        .bind(&item.name)
        .bind(&item.category.company_name)
        .bind(&item.category.product_name)
        .bind(item.price.amount())
        .bind(to_db_quantity(item.quantity.value())?)
        .bind(item.status.as_ref())
        .bind(item.owner_account_id)
        .bind(&item.photo_url)
        .bind(&item.description)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_item(&mut self, id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM items WHERE id = $1").bind(id).execute(&mut *self.tx).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn cart(&mut self, owner: Uuid) -> Result<Option<Cart>> {
        let row = sqlx::query_as::<_, CartRow>(
            "SELECT owner_account_id, lines, total_price, updated_at FROM carts WHERE owner_account_id = $1 FOR UPDATE",
        )
        .bind(owner)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Cart::try_from).transpose()
    }

    async fn cart_snapshot(&mut self, owner: Uuid) -> Result<Option<Cart>> {
        let row = sqlx::query_as::<_, CartRow>(
            "SELECT owner_account_id, lines, total_price, updated_at FROM carts WHERE owner_account_id = $1",
        )
        .bind(owner)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Cart::try_from).transpose()
    }

    async fn carts_containing(&mut self, item_id: Uuid) -> Result<Vec<Cart>> {
        let rows = sqlx::query_as::<_, CartRow>(
            "SELECT owner_account_id, lines, total_price, updated_at FROM carts WHERE lines @> $1 FOR UPDATE",
        )
        .bind(Json(serde_json::json!([{ "itemId": item_id }])))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(Cart::try_from).collect()
    }

    async fn save_cart(&mut self, cart: &Cart) -> Result<()> {
        sqlx::query(
            "INSERT INTO carts (owner_account_id, lines, total_price, updated_at) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (owner_account_id) DO UPDATE SET lines = $2, total_price = $3, updated_at = $4",
        )
        .bind(cart.owner_account_id)
        .bind(Json(&cart.lines))
        .bind(cart.total_price.amount())
        .bind(cart.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_cart(&mut self, owner: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM carts WHERE owner_account_id = $1").bind(owner).execute(&mut *self.tx).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn order(&mut self, id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Order::try_from).transpose()
    }

    async fn orders(&mut self, filter: OrderFilter) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE ($1::uuid IS NULL OR owner_account_id = $1) \
               AND ($2::jsonb IS NULL OR lines @> $2) \
               AND (NOT $3 OR status IN ('pending', 'shipped')) \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(filter.owner)
        .bind(filter.item.map(|item_id| Json(serde_json::json!([{ "itemId": item_id }]))))
        .bind(filter.open_only)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn order_by_idempotency_key(&mut self, owner: Uuid, key: &str) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE owner_account_id = $1 AND idempotency_key = $2"
        ))
        .bind(owner)
        .bind(key)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Order::try_from).transpose()
    }

    async fn save_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (id) DO UPDATE SET lines = $3, total_amount = $4, status = $5, payment_status = $7, \
             delivery_address = $8, updated_at = $11"
        ))
        .bind(order.id)
        .bind(order.owner_account_id)
        .bind(Json(&order.lines))
        .bind(order.total_amount.amount())
        .bind(order.status.as_ref())
        .bind(order.payment_method.as_ref())
        .bind(order.payment_status.as_ref())
        .bind(&order.delivery_address)
        .bind(&order.idempotency_key)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_order(&mut self, id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM orders WHERE id = $1").bind(id).execute(&mut *self.tx).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

// =============================================================================
// Row mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = CommerceError;

    fn try_from(row: AccountRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role: row.role.parse::<Role>().map_err(|_| corrupt("accounts.role", &row.role))?,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            events: vec![],
        })
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    name: String,
    company_name: String,
    product_name: String,
    price: Decimal,
    quantity: i32,
    status: String,
    owner_account_id: Uuid,
    photo_url: Option<String>,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ItemRow> for Item {
    type Error = CommerceError;

    fn try_from(row: ItemRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            name: row.name,
            category: Category::new(row.company_name, row.product_name),
            price: Money::new(row.price).map_err(|_| corrupt("items.price", &row.price.to_string()))?,
            quantity: Quantity::new(u32::try_from(row.quantity).map_err(|_| corrupt("items.quantity", &row.quantity.to_string()))?),
            status: ItemStatus::parse(&row.status).map_err(|_| corrupt("items.status", &row.status))?,
            owner_account_id: row.owner_account_id,
            photo_url: row.photo_url,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
            events: vec![],
        })
    }
}

#[derive(sqlx::FromRow)]
struct CartRow {
    owner_account_id: Uuid,
    lines: Json<Vec<CartLine>>,
    total_price: Decimal,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CartRow> for Cart {
    type Error = CommerceError;

    fn try_from(row: CartRow) -> Result<Self> {
        Ok(Self {
            owner_account_id: row.owner_account_id,
            lines: row.lines.0,
            total_price: Money::new(row.total_price).map_err(|_| corrupt("carts.total_price", &row.total_price.to_string()))?,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    owner_account_id: Uuid,
    lines: Json<Vec<OrderLine>>,
    total_amount: Decimal,
    status: String,
    payment_method: String,
    payment_status: String,
    delivery_address: String,
    idempotency_key: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = CommerceError;

    fn try_from(row: OrderRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            owner_account_id: row.owner_account_id,
            lines: row.lines.0,
            total_amount: Money::new(row.total_amount).map_err(|_| corrupt("orders.total_amount", &row.total_amount.to_string()))?,
            status: OrderStatus::parse(&row.status).map_err(|_| corrupt("orders.status", &row.status))?,
            payment_method: PaymentMethod::parse(&row.payment_method).map_err(|_| corrupt("orders.payment_method", &row.payment_method))?,
            payment_status: PaymentStatus::parse(&row.payment_status).map_err(|_| corrupt("orders.payment_status", &row.payment_status))?,
            delivery_address: row.delivery_address,
            idempotency_key: row.idempotency_key,
            created_at: row.created_at,
            updated_at: row.updated_at,
            events: vec![],
        })
    }
}

fn to_db_quantity(quantity: u32) -> Result<i32> {
    i32::try_from(quantity).map_err(|_| CommerceError::InvalidQuantity(i64::from(quantity)))
}

fn corrupt(column: &str, value: &str) -> CommerceError {
    CommerceError::Storage(format!("unreadable value {value:?} in {column}"))
}
