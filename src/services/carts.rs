//! Cart store: one cart per vendor / customer-care account.

use std::sync::Arc;

use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::auth::Principal;
use crate::domain::aggregates::Cart;
use crate::store::{Store, Transaction};
use crate::{CommerceError, Result};

#[derive(Clone)]
pub struct Carts {
    store: Arc<dyn Store>,
}

impl Carts {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[instrument(skip(self), fields(actor = %actor.account_id))]
    pub async fn get_or_create_cart(&self, actor: &Principal, account_id: Uuid) -> Result<Cart> {
        actor.require_owner_or_admin(account_id)?;
        let mut tx = self.store.begin().await?;
        let (cart, created) = cart_for(&mut *tx, account_id).await?;
        if created {
            tx.save_cart(&cart).await?;
            tx.commit().await?;
            debug!(%account_id, "cart created");
        }
        Ok(cart)
    }

    /// Adds `quantity` of an item at its current catalog price, merging with an
    /// existing line for the same item. Stock is not reserved, so the item is
    /// read without blocking placements.
    #[instrument(skip(self), fields(actor = %actor.account_id))]
    pub async fn add_line(&self, actor: &Principal, account_id: Uuid, item_id: Uuid, quantity: i64) -> Result<Cart> {
        actor.require_owner_or_admin(account_id)?;
        let quantity = positive(quantity)?;
        let mut tx = self.store.begin().await?;
        let item = tx.item_shared(item_id).await?.ok_or(CommerceError::ItemNotFound(item_id))?;
        let (mut cart, _) = cart_for(&mut *tx, account_id).await?;
        cart.add_line(item.id(), quantity, item.price())?;
        tx.save_cart(&cart).await?;
        tx.commit().await?;
        info!(%account_id, %item_id, quantity, "cart line added");
        Ok(cart)
    }

    /// Sets a line's quantity at the item's current price; zero removes it.
    #[instrument(skip(self), fields(actor = %actor.account_id))]
    pub async fn update_line(&self, actor: &Principal, account_id: Uuid, line_id: Uuid, quantity: i64) -> Result<Cart> {
        actor.require_owner_or_admin(account_id)?;
        let quantity = u32::try_from(quantity).map_err(|_| CommerceError::InvalidQuantity(quantity))?;
        let mut tx = self.store.begin().await?;
        // The item is held before the cart row, so find it from an unlocked read.
        let snapshot = match tx.cart_snapshot(account_id).await? {
            Some(cart) => cart,
            None => cart_for(&mut *tx, account_id).await?.0,
        };
        let item_id = snapshot.line(line_id)?.item_id;
        let item = tx.item_shared(item_id).await?.ok_or(CommerceError::ItemNotFound(item_id))?;
        let (mut cart, _) = cart_for(&mut *tx, account_id).await?;
        cart.update_line(line_id, quantity, item.price())?;
        tx.save_cart(&cart).await?;
        tx.commit().await?;
        info!(%account_id, %line_id, quantity, "cart line updated");
        Ok(cart)
    }

    #[instrument(skip(self), fields(actor = %actor.account_id))]
    pub async fn remove_line(&self, actor: &Principal, account_id: Uuid, line_id: Uuid) -> Result<Cart> {
        actor.require_owner_or_admin(account_id)?;
        let mut tx = self.store.begin().await?;
        let (mut cart, _) = cart_for(&mut *tx, account_id).await?;
        cart.remove_line(line_id)?;
        tx.save_cart(&cart).await?;
        tx.commit().await?;
        info!(%account_id, %line_id, "cart line removed");
        Ok(cart)
    }

    /// Empties the cart. Clearing an empty cart succeeds.
    #[instrument(skip(self), fields(actor = %actor.account_id))]
    pub async fn clear(&self, actor: &Principal, account_id: Uuid) -> Result<Cart> {
        actor.require_owner_or_admin(account_id)?;
        let mut tx = self.store.begin().await?;
        let cart = clear_in(&mut *tx, account_id).await?;
        tx.commit().await?;
        Ok(cart)
    }
}

/// Loads the account's cart, or a fresh unsaved one. Only buyer accounts have carts.
async fn cart_for(tx: &mut dyn Transaction, account_id: Uuid) -> Result<(Cart, bool)> {
    if let Some(cart) = tx.cart(account_id).await? {
        return Ok((cart, false));
    }
    let account = tx.account(account_id).await?.ok_or(CommerceError::AccountNotFound(account_id))?;
    if !account.role().is_buyer() {
        return Err(CommerceError::Forbidden(format!("role {} has no cart", account.role())));
    }
    Ok((Cart::for_account(account_id), true))
}

async fn clear_in(tx: &mut dyn Transaction, account_id: Uuid) -> Result<Cart> {
    let (mut cart, _) = cart_for(tx, account_id).await?;
    cart.clear();
    tx.save_cart(&cart).await?;
    Ok(cart)
}

fn positive(quantity: i64) -> Result<u32> {
    u32::try_from(quantity).ok().filter(|q| *q > 0).ok_or(CommerceError::InvalidQuantity(quantity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Account, Item, ItemDraft, Role};
    use crate::domain::value_objects::{Category, Money};
    use crate::store::MemoryStore;
    use rust_decimal_macros::dec;

    struct Fixture {
        carts: Carts,
        vendor: Principal,
        kettle: Uuid,
        store: Arc<MemoryStore>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let account = Account::create("Vee", "vee@desk.io", "h".into(), Role::Vendor, None);
        let item = Item::create(
            ItemDraft {
                name: "Kettle".into(),
                category: Category::new("Acme", "Kitchen"),
                price: dec!(12.50),
                quantity: 3,
                description: String::new(),
                photo_url: None,
                status: None,
            },
            Uuid::new_v4(),
        )
        .unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.insert_account(&account).await.unwrap();
        tx.save_item(&item).await.unwrap();
        tx.commit().await.unwrap();
        Fixture { carts: Carts::new(store.clone()), vendor: Principal::new(account.id(), Role::Vendor), kettle: item.id(), store }
    }

    #[tokio::test]
    async fn test_add_merges_and_totals() {
        let f = fixture().await;
        let id = f.vendor.account_id;
        f.carts.add_line(&f.vendor, id, f.kettle, 1).await.unwrap();
        let cart = f.carts.add_line(&f.vendor, id, f.kettle, 4).await.unwrap();
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].quantity, 5);
        assert_eq!(cart.total_price(), Money::new(dec!(62.50)).unwrap());
    }

    #[tokio::test]
    async fn test_add_rejects_bad_input() {
        let f = fixture().await;
        let id = f.vendor.account_id;
        assert!(matches!(f.carts.add_line(&f.vendor, id, f.kettle, 0).await, Err(CommerceError::InvalidQuantity(0))));
        assert!(matches!(f.carts.add_line(&f.vendor, id, f.kettle, -2).await, Err(CommerceError::InvalidQuantity(-2))));
        assert!(matches!(f.carts.add_line(&f.vendor, id, Uuid::new_v4(), 1).await, Err(CommerceError::ItemNotFound(_))));
        let stranger = Principal::new(Uuid::new_v4(), Role::Vendor);
        assert!(matches!(f.carts.add_line(&stranger, id, f.kettle, 1).await, Err(CommerceError::Forbidden(_))));
        assert!(f.carts.get_or_create_cart(&f.vendor, id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_to_zero_removes_line() {
        let f = fixture().await;
        let id = f.vendor.account_id;
        let cart = f.carts.add_line(&f.vendor, id, f.kettle, 2).await.unwrap();
        let line_id = cart.lines()[0].id;
        let cart = f.carts.update_line(&f.vendor, id, line_id, 0).await.unwrap();
        assert!(cart.is_empty());
        assert!(matches!(f.carts.remove_line(&f.vendor, id, line_id).await, Err(CommerceError::CartLineNotFound(_))));
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let f = fixture().await;
        let id = f.vendor.account_id;
        f.carts.add_line(&f.vendor, id, f.kettle, 2).await.unwrap();
        f.carts.clear(&f.vendor, id).await.unwrap();
        let cart = f.carts.clear(&f.vendor, id).await.unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.total_price(), Money::ZERO);
    }

    #[tokio::test]
    async fn test_admin_has_no_cart() {
        let f = fixture().await;
        let admin = Account::create("Root", "root@desk.io", "h".into(), Role::Admin, None);
        let mut tx = f.store.begin().await.unwrap();
        tx.insert_account(&admin).await.unwrap();
        tx.commit().await.unwrap();
        let principal = Principal::new(admin.id(), Role::Admin);
        assert!(matches!(f.carts.get_or_create_cart(&principal, admin.id()).await, Err(CommerceError::Forbidden(_))));
        assert!(matches!(f.carts.get_or_create_cart(&principal, Uuid::new_v4()).await, Err(CommerceError::AccountNotFound(_))));
    }
}
