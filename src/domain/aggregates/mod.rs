//! Aggregates module
pub mod account;
pub mod cart;
pub mod item;
pub mod order;

pub use account::{Account, AccountPatch, NewAccount, Role};
pub use cart::{Cart, CartLine};
pub use item::{Item, ItemDraft, ItemPatch, ItemStatus};
pub use order::{Order, OrderLine, OrderStatus, PaymentMethod, PaymentStatus, Transition};
