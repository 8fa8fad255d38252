//! Orderdesk
//!
//! Multi-role order desk backend: an admin curates the catalog and the
//! vendor / customer-care accounts, those accounts fill carts and place orders.
//!
//! ## Features
//! - Item catalog with stock tracking (`available` / `soldout` derived from quantity)
//! - One cart per account with reconciled totals
//! - All-or-nothing order placement: validate every line, then commit every decrement
//! - Order status and settlement transitions, restock on cancellation
//! - JWT bearer auth, argon2 password hashing
//! - Postgres or in-memory persistence behind one transactional seam

pub mod auth;
pub mod config;
pub mod domain;
pub mod http;
pub mod publisher;
pub mod services;
pub mod store;

use domain::aggregates::OrderStatus;
use domain::value_objects::MoneyError;
use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum CommerceError {
    #[error("Account {0} not found")]
    AccountNotFound(Uuid),

    #[error("Item {0} not found")]
    ItemNotFound(Uuid),

    #[error("Items not found: {}", join_ids(.0))]
    ItemsNotFound(Vec<Uuid>),

    #[error("Order {0} not found")]
    OrderNotFound(Uuid),

    #[error("Cart line {0} not found")]
    CartLineNotFound(Uuid),

    #[error("Order has no line for item {0}")]
    LineNotFound(Uuid),

    #[error("Insufficient stock for item {item_id}: requested {requested}, available {available}")]
    InsufficientStock { item_id: Uuid, requested: u64, available: u32 },

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order {id} is {status} and its lines can no longer be corrected")]
    OrderClosed { id: Uuid, status: OrderStatus },

    #[error("Payment status of order {0} is frozen by cancellation")]
    PaymentFrozen(Uuid),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure classes callers branch on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    InsufficientStock,
    Unauthorized,
    Conflict,
    Internal,
}

impl CommerceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AccountNotFound(_)
            | Self::ItemNotFound(_)
            | Self::ItemsNotFound(_)
            | Self::OrderNotFound(_)
            | Self::CartLineNotFound(_)
            | Self::LineNotFound(_) => ErrorKind::NotFound,
            Self::InvalidQuantity(_) | Self::InvalidStatus(_) | Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            Self::Unauthorized(_) | Self::Forbidden(_) => ErrorKind::Unauthorized,
            Self::InvalidTransition { .. } | Self::OrderClosed { .. } | Self::PaymentFrozen(_) | Self::Conflict(_) => {
                ErrorKind::Conflict
            }
            Self::Storage(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<validator::ValidationErrors> for CommerceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::InvalidInput(errors.to_string())
    }
}

impl From<MoneyError> for CommerceError {
    fn from(error: MoneyError) -> Self {
        Self::InvalidInput(error.to_string())
    }
}

fn join_ids(ids: &[Uuid]) -> String {
    ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(", ")
}

pub type Result<T> = std::result::Result<T, CommerceError>;
