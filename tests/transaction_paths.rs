//! Service paths observed through a store that records every row lock a
//! transaction takes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use orderdesk::auth::{AuthGateway, Principal};
use orderdesk::domain::aggregates::{Account, Cart, Item, ItemDraft, NewAccount, Order, PaymentMethod, Role};
use orderdesk::domain::value_objects::Category;
use orderdesk::publisher::LogPublisher;
use orderdesk::services::{Checkout, LineRequest, PlaceOrder, Services};
use orderdesk::store::{AccountFilter, MemoryStore, OrderFilter, Store, Transaction};
use rust_decimal_macros::dec;
use uuid::Uuid;

/// Lock classes in the order a transaction may take them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Lock {
    Order,
    Item,
    Cart,
}

type Journal = Arc<Mutex<Vec<Vec<Lock>>>>;

#[derive(Default)]
struct RecordingStore {
    inner: MemoryStore,
    journal: Journal,
    /// Idempotency lookups still to answer with "not found".
    blind_lookups: Arc<AtomicUsize>,
}

#[async_trait]
impl Store for RecordingStore {
    async fn begin(&self) -> orderdesk::Result<Box<dyn Transaction>> {
        let inner = self.inner.begin().await?;
        Ok(Box::new(RecordingTx {
            inner: Some(inner),
            held: vec![],
            journal: self.journal.clone(),
            blind_lookups: self.blind_lookups.clone(),
        }))
    }
}

struct RecordingTx {
    inner: Option<Box<dyn Transaction>>,
    held: Vec<(Lock, Uuid)>,
    journal: Journal,
    blind_lookups: Arc<AtomicUsize>,
}

impl RecordingTx {
    fn tx(&mut self) -> &mut dyn Transaction {
        self.inner.as_deref_mut().expect("transaction already committed")
    }

    /// Rows locked again by the same transaction are not new acquisitions.
    fn hold(&mut self, lock: Lock, ids: impl IntoIterator<Item = Uuid>) {
        for id in ids {
            if !self.held.contains(&(lock, id)) {
                self.held.push((lock, id));
            }
        }
    }
}

impl Drop for RecordingTx {
    fn drop(&mut self) {
        let locks = self.held.iter().map(|(lock, _)| *lock).collect();
        self.journal.lock().unwrap().push(locks);
    }
}

#[async_trait]
impl Transaction for RecordingTx {
    async fn account(&mut self, id: Uuid) -> orderdesk::Result<Option<Account>> { self.tx().account(id).await }
    async fn account_by_email(&mut self, email: &str) -> orderdesk::Result<Option<Account>> { self.tx().account_by_email(email).await }
    async fn accounts(&mut self, filter: AccountFilter) -> orderdesk::Result<Vec<Account>> { self.tx().accounts(filter).await }
    async fn insert_account(&mut self, account: &Account) -> orderdesk::Result<()> { self.tx().insert_account(account).await }
    async fn update_account(&mut self, account: &Account) -> orderdesk::Result<()> { self.tx().update_account(account).await }
    async fn delete_account(&mut self, id: Uuid) -> orderdesk::Result<bool> { self.tx().delete_account(id).await }

    async fn items(&mut self, ids: &[Uuid]) -> orderdesk::Result<Vec<Item>> {
        let items = self.tx().items(ids).await?;
        self.hold(Lock::Item, items.iter().map(Item::id));
        Ok(items)
    }
    async fn item_shared(&mut self, id: Uuid) -> orderdesk::Result<Option<Item>> {
        let item = self.tx().item_shared(id).await?;
        self.hold(Lock::Item, item.iter().map(Item::id));
        Ok(item)
    }
    async fn list_items(&mut self, category: Option<&Category>) -> orderdesk::Result<Vec<Item>> { self.tx().list_items(category).await }
    async fn save_item(&mut self, item: &Item) -> orderdesk::Result<()> { self.tx().save_item(item).await }
    async fn delete_item(&mut self, id: Uuid) -> orderdesk::Result<bool> {
        self.hold(Lock::Item, [id]);
        self.tx().delete_item(id).await
    }

    async fn cart(&mut self, owner: Uuid) -> orderdesk::Result<Option<Cart>> {
        let cart = self.tx().cart(owner).await?;
        self.hold(Lock::Cart, cart.iter().map(Cart::owner_account_id));
        Ok(cart)
    }
    async fn cart_snapshot(&mut self, owner: Uuid) -> orderdesk::Result<Option<Cart>> { self.tx().cart_snapshot(owner).await }
    async fn carts_containing(&mut self, item_id: Uuid) -> orderdesk::Result<Vec<Cart>> {
        let carts = self.tx().carts_containing(item_id).await?;
        self.hold(Lock::Cart, carts.iter().map(Cart::owner_account_id));
        Ok(carts)
    }
    async fn save_cart(&mut self, cart: &Cart) -> orderdesk::Result<()> { self.tx().save_cart(cart).await }
    async fn delete_cart(&mut self, owner: Uuid) -> orderdesk::Result<bool> {
        self.hold(Lock::Cart, [owner]);
        self.tx().delete_cart(owner).await
    }

    async fn order(&mut self, id: Uuid) -> orderdesk::Result<Option<Order>> {
        let order = self.tx().order(id).await?;
        self.hold(Lock::Order, order.iter().map(Order::id));
        Ok(order)
    }
    async fn orders(&mut self, filter: OrderFilter) -> orderdesk::Result<Vec<Order>> { self.tx().orders(filter).await }
    async fn order_by_idempotency_key(&mut self, owner: Uuid, key: &str) -> orderdesk::Result<Option<Order>> {
        let blinded = self.blind_lookups.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok();
        if blinded {
            return Ok(None);
        }
        self.tx().order_by_idempotency_key(owner, key).await
    }
    async fn save_order(&mut self, order: &Order) -> orderdesk::Result<()> { self.tx().save_order(order).await }
    async fn delete_order(&mut self, id: Uuid) -> orderdesk::Result<bool> {
        self.hold(Lock::Order, [id]);
        self.tx().delete_order(id).await
    }

    async fn commit(self: Box<Self>) -> orderdesk::Result<()> {
        let mut this = self;
        let inner = this.inner.take().expect("transaction already committed");
        inner.commit().await
    }
}

struct Desk {
    services: Services,
    journal: Journal,
    blind_lookups: Arc<AtomicUsize>,
    admin: Principal,
    vendor: Principal,
}

async fn desk() -> Desk {
    let store = RecordingStore::default();
    let (journal, blind_lookups) = (store.journal.clone(), store.blind_lookups.clone());
    let auth = AuthGateway::new("0123456789abcdef0123456789abcdef", Duration::from_secs(3600));
    let services = Services::new(Arc::new(store), Arc::new(LogPublisher), Arc::new(auth));
    let admin = services
        .accounts
        .signup_admin(NewAccount { name: "Root".into(), email: "root@desk.io".into(), password: "rootroot1".into() })
        .await
        .unwrap();
    let admin = Principal::new(admin.id(), Role::Admin);
    let vendor = services
        .accounts
        .create_account(&admin, Role::Vendor, NewAccount { name: "Vee".into(), email: "vee@desk.io".into(), password: "vendor123".into() })
        .await
        .unwrap();
    let vendor = Principal::new(vendor.id(), Role::Vendor);
    Desk { services, journal, blind_lookups, admin, vendor }
}

impl Desk {
    async fn stock(&self, name: &str, quantity: u32) -> Item {
        let draft = ItemDraft {
            name: name.into(),
            category: Category::new("Acme", "Widgets"),
            price: dec!(3),
            quantity,
            description: String::new(),
            photo_url: None,
            status: None,
        };
        self.services.catalog.create_item(&self.admin, draft).await.unwrap()
    }

    async fn order(&self, lines: &[(Uuid, i64)], key: Option<&str>) -> orderdesk::Result<Order> {
        let request = PlaceOrder {
            lines: lines.iter().map(|&(item_id, quantity)| LineRequest { item_id, quantity }).collect(),
            checkout: Checkout { payment_method: PaymentMethod::Cash, delivery_address: String::new(), idempotency_key: key.map(str::to_string) },
        };
        self.services.orders.place_order(&self.vendor, self.vendor.account_id, request).await
    }
}

#[tokio::test]
async fn test_locks_follow_one_order_on_every_path() {
    let desk = desk().await;
    let me = desk.vendor.account_id;
    let (a, b, c) = (desk.stock("A", 10).await, desk.stock("B", 10).await, desk.stock("C", 10).await);
    let (carts, orders) = (&desk.services.carts, &desk.services.orders);

    let cart = carts.add_line(&desk.vendor, me, a.id(), 1).await.unwrap();
    carts.update_line(&desk.vendor, me, cart.lines()[0].id, 2).await.unwrap();
    carts.add_line(&desk.vendor, me, b.id(), 1).await.unwrap();
    let from_cart = orders.place_order_from_cart(&desk.vendor, me, Checkout::default()).await.unwrap();

    carts.add_line(&desk.vendor, me, a.id(), 1).await.unwrap();
    let explicit = desk.order(&[(b.id(), 1), (a.id(), 1)], None).await.unwrap();
    orders.cancel_order(&desk.vendor, explicit.id()).await.unwrap();
    orders.purge_order(&desk.admin, from_cart.id()).await.unwrap();

    carts.add_line(&desk.vendor, me, c.id(), 1).await.unwrap();
    desk.services.catalog.delete_item(&desk.admin, c.id(), None).await.unwrap();
    assert!(carts.get_or_create_cart(&desk.vendor, me).await.unwrap().is_empty());

    let journal = desk.journal.lock().unwrap();
    let mixed = journal.iter().filter(|locks| locks.contains(&Lock::Item) && locks.contains(&Lock::Cart)).count();
    assert!(mixed >= 5, "expected item and cart locks together, got {journal:?}");
    assert!(journal.iter().any(|locks| locks.starts_with(&[Lock::Order, Lock::Item])));
    for locks in journal.iter() {
        assert!(locks.windows(2).all(|w| w[0] <= w[1]), "out of order: {locks:?}");
    }
}

#[tokio::test]
async fn test_replay_missed_by_a_racing_retry_returns_the_stored_order() {
    let desk = desk().await;
    let sku = desk.stock("Widget", 5).await;
    let first = desk.order(&[(sku.id(), 2)], Some("req-7")).await.unwrap();

    desk.blind_lookups.store(1, Ordering::SeqCst);
    let retry = desk.order(&[(sku.id(), 2)], Some("req-7")).await.unwrap();
    assert_eq!(retry.id(), first.id());
    assert_eq!(desk.blind_lookups.load(Ordering::SeqCst), 0);
    assert_eq!(desk.services.catalog.get_item(sku.id()).await.unwrap().quantity(), 3);
    assert_eq!(desk.services.orders.list_orders(&desk.vendor, None).await.unwrap().len(), 1);

    desk.blind_lookups.store(1, Ordering::SeqCst);
    let err = desk.order(&[(sku.id(), 9)], Some("req-8")).await.unwrap_err();
    assert_eq!(err.kind(), orderdesk::ErrorKind::InsufficientStock);
}
