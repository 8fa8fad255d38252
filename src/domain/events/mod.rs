//! Domain events
use crate::domain::value_objects::Money;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "aggregate", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Item(ItemEvent),
    Order(OrderEvent),
    Account(AccountEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemEvent {
    Created { item_id: Uuid },
    StockAdjusted { item_id: Uuid, delta: i64, quantity: u32 },
    SoldOut { item_id: Uuid },
    BackInStock { item_id: Uuid, quantity: u32 },
    Deleted { item_id: Uuid },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, account_id: Uuid, total: Money },
    LinesCorrected { order_id: Uuid, total: Money },
    StatusChanged { order_id: Uuid, from: String, to: String },
    PaymentStatusChanged { order_id: Uuid, payment_status: String },
    Purged { order_id: Uuid },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AccountEvent {
    Created { account_id: Uuid, role: String },
    Deleted { account_id: Uuid },
}

impl DomainEvent {
    /// Subject suffix the event is published under, e.g. `order.placed`.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Item(ItemEvent::Created { .. }) => "item.created",
            Self::Item(ItemEvent::StockAdjusted { .. }) => "item.stock_adjusted",
            Self::Item(ItemEvent::SoldOut { .. }) => "item.sold_out",
            Self::Item(ItemEvent::BackInStock { .. }) => "item.back_in_stock",
            Self::Item(ItemEvent::Deleted { .. }) => "item.deleted",
            Self::Order(OrderEvent::Placed { .. }) => "order.placed",
            Self::Order(OrderEvent::LinesCorrected { .. }) => "order.lines_corrected",
            Self::Order(OrderEvent::StatusChanged { .. }) => "order.status_changed",
            Self::Order(OrderEvent::PaymentStatusChanged { .. }) => "order.payment_status_changed",
            Self::Order(OrderEvent::Purged { .. }) => "order.purged",
            Self::Account(AccountEvent::Created { .. }) => "account.created",
            Self::Account(AccountEvent::Deleted { .. }) => "account.deleted",
        }
    }
}
