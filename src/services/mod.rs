//! Application services. Each public operation is one unit of work against the
//! [`Store`]; events are published only after it commits.

pub mod accounts;
pub mod carts;
pub mod catalog;
pub mod orders;

use std::sync::Arc;

pub use accounts::{Accounts, Session};
pub use carts::Carts;
pub use catalog::Catalog;
pub use orders::{Checkout, LineRequest, Orders, PlaceOrder, StatusChange};

use crate::auth::AuthGateway;
use crate::publisher::EventPublisher;
use crate::store::Store;

#[derive(Clone)]
pub struct Services {
    pub accounts: Accounts,
    pub catalog: Catalog,
    pub carts: Carts,
    pub orders: Orders,
}

impl Services {
    pub fn new(store: Arc<dyn Store>, events: Arc<dyn EventPublisher>, auth: Arc<AuthGateway>) -> Self {
        Self {
            accounts: Accounts::new(store.clone(), events.clone(), auth),
            catalog: Catalog::new(store.clone(), events.clone()),
            carts: Carts::new(store.clone()),
            orders: Orders::new(store, events),
        }
    }
}
