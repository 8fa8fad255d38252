//! Order Aggregate
//!
//! Two independent axes: fulfilment (`pending → shipped → delivered`, or
//! `pending → cancelled`) and settlement (`unpaid ⇄ paid`, frozen once cancelled).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{Money, MoneyError};
use crate::{CommerceError, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub(crate) id: Uuid,
    pub(crate) owner_account_id: Uuid,
    pub(crate) lines: Vec<OrderLine>,
    pub(crate) total_amount: Money,
    pub(crate) status: OrderStatus,
    pub(crate) payment_method: PaymentMethod,
    pub(crate) payment_status: PaymentStatus,
    pub(crate) delivery_address: String,
    pub(crate) idempotency_key: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub item_id: Uuid,
    pub item_name: String,
    pub quantity: u32,
    pub unit_price_at_purchase: Money,
    /// Units taken from stock at placement; what a cancellation gives back.
    pub allocated_quantity: u32,
}

impl OrderLine {
    pub fn line_total(&self) -> std::result::Result<Money, MoneyError> { self.unit_price_at_purchase.multiply(self.quantity) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OrderStatus {
    #[default]
    Pending,
    Shipped,
    Delivered,
    Cancelled,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase", try_from = "String")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PaymentMethod {
    #[default]
    Cash,
    Card,
    Online,
}

impl OrderStatus {
    pub fn parse(raw: &str) -> Result<Self> { raw.parse().map_err(|_| CommerceError::InvalidStatus(raw.to_string())) }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        matches!((self, next), (Self::Pending, Self::Shipped) | (Self::Pending, Self::Cancelled) | (Self::Shipped, Self::Delivered))
    }

    pub fn is_terminal(self) -> bool { matches!(self, Self::Delivered | Self::Cancelled) }

    /// Pending and shipped orders still reference live stock.
    pub fn is_open(self) -> bool { !self.is_terminal() }
}

impl PaymentStatus {
    pub fn parse(raw: &str) -> Result<Self> { raw.parse().map_err(|_| CommerceError::InvalidStatus(raw.to_string())) }
}

impl PaymentMethod {
    pub fn parse(raw: &str) -> Result<Self> {
        raw.parse().map_err(|_| CommerceError::InvalidInput(format!("unknown payment method {raw}")))
    }
}

impl TryFrom<String> for PaymentMethod {
    type Error = CommerceError;

    fn try_from(raw: String) -> Result<Self> { Self::parse(&raw) }
}

/// Outcome of a status change the caller must act on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Moved,
    /// The order was cancelled; these allocations go back to stock.
    Cancelled(Vec<(Uuid, u32)>),
}

impl Order {
    pub fn place(
        owner_account_id: Uuid,
        lines: Vec<OrderLine>,
        payment_method: PaymentMethod,
        delivery_address: impl Into<String>,
        idempotency_key: Option<String>,
    ) -> Result<Self> {
        if lines.is_empty() { return Err(CommerceError::InvalidInput("order needs at least one line".into())); }
        let total_amount = Money::total(lines.iter().map(OrderLine::line_total))?;
        let id = Uuid::now_v7();
        let now = Utc::now();
        let mut order = Self {
            id, owner_account_id, lines, total_amount, status: OrderStatus::Pending, payment_method,
            payment_status: PaymentStatus::Unpaid, delivery_address: delivery_address.into(), idempotency_key,
            created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed { order_id: id, account_id: owner_account_id, total: order.total_amount }));
        Ok(order)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn owner_account_id(&self) -> Uuid { self.owner_account_id }
    pub fn lines(&self) -> &[OrderLine] { &self.lines }
    pub fn total_amount(&self) -> Money { self.total_amount }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn payment_method(&self) -> PaymentMethod { self.payment_method }
    pub fn payment_status(&self) -> PaymentStatus { self.payment_status }
    pub fn delivery_address(&self) -> &str { &self.delivery_address }
    pub fn idempotency_key(&self) -> Option<&str> { self.idempotency_key.as_deref() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn references_item(&self, item_id: Uuid) -> bool { self.lines.iter().any(|l| l.item_id == item_id) }

    /// Billing correction: overwrite line quantities, keep purchase prices, recompute the total.
    pub fn correct_lines(&mut self, updates: &[(Uuid, i64)]) -> Result<()> {
        if updates.is_empty() { return Err(CommerceError::InvalidInput("no line corrections supplied".into())); }
        if self.status.is_terminal() {
            return Err(CommerceError::OrderClosed { id: self.id, status: self.status });
        }
        let mut resolved = Vec::with_capacity(updates.len());
        for &(item_id, quantity) in updates {
            let idx = self.lines.iter().position(|l| l.item_id == item_id).ok_or(CommerceError::LineNotFound(item_id))?;
            let quantity = u32::try_from(quantity).ok().filter(|q| *q > 0).ok_or(CommerceError::InvalidQuantity(quantity))?;
            resolved.push((idx, quantity));
        }
        let mut lines = self.lines.clone();
        for (idx, quantity) in resolved { lines[idx].quantity = quantity; }
        self.total_amount = Money::total(lines.iter().map(OrderLine::line_total))?;
        self.lines = lines;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::LinesCorrected { order_id: self.id, total: self.total_amount }));
        Ok(())
    }

    /// Validates both axes before changing either.
    pub fn transition(&mut self, next: OrderStatus, payment: Option<PaymentStatus>) -> Result<Transition> {
        if next != self.status && !self.status.can_transition_to(next) {
            return Err(CommerceError::InvalidTransition { from: self.status, to: next });
        }
        if let Some(payment) = payment {
            let frozen = self.status == OrderStatus::Cancelled || next == OrderStatus::Cancelled;
            if frozen && payment != self.payment_status { return Err(CommerceError::PaymentFrozen(self.id)); }
        }

        if let Some(payment) = payment.filter(|p| *p != self.payment_status) {
            self.payment_status = payment;
            self.raise_event(DomainEvent::Order(OrderEvent::PaymentStatusChanged { order_id: self.id, payment_status: payment.to_string() }));
        }
        if next == self.status {
            self.touch();
            return Ok(Transition::Unchanged);
        }
        let from = std::mem::replace(&mut self.status, next);
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id, from: from.to_string(), to: next.to_string() }));
        if next == OrderStatus::Cancelled {
            return Ok(Transition::Cancelled(self.release_allocations()));
        }
        Ok(Transition::Moved)
    }

    pub fn cancel(&mut self) -> Result<Transition> {
        if self.status == OrderStatus::Cancelled {
            return Err(CommerceError::InvalidTransition { from: self.status, to: OrderStatus::Cancelled });
        }
        self.transition(OrderStatus::Cancelled, None)
    }

    /// Allocations still held by a pending order, zeroed so they are returned once.
    pub fn release_allocations(&mut self) -> Vec<(Uuid, u32)> {
        self.lines
            .iter_mut()
            .filter(|l| l.allocated_quantity > 0)
            .map(|l| (l.item_id, std::mem::take(&mut l.allocated_quantity)))
            .collect()
    }

    pub fn mark_purged(&mut self) { self.raise_event(DomainEvent::Order(OrderEvent::Purged { order_id: self.id })); }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn line(item_id: Uuid, quantity: u32, price: i64) -> OrderLine {
        OrderLine {
            item_id,
            item_name: "Widget".into(),
            quantity,
            unit_price_at_purchase: Money::new(Decimal::new(price, 0)).unwrap(),
            allocated_quantity: quantity,
        }
    }

    fn order() -> (Order, Uuid, Uuid) {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let o = Order::place(Uuid::new_v4(), vec![line(a, 2, 10), line(b, 1, 5)], PaymentMethod::Cash, "1 Main St", None).unwrap();
        (o, a, b)
    }

    #[test]
    fn test_order_workflow() {
        let (mut order, _, _) = order();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.payment_status(), PaymentStatus::Unpaid);
        assert_eq!(order.total_amount().amount(), Decimal::new(25, 0));
        assert_eq!(order.transition(OrderStatus::Shipped, Some(PaymentStatus::Paid)).unwrap(), Transition::Moved);
        assert_eq!(order.transition(OrderStatus::Delivered, None).unwrap(), Transition::Moved);
        assert!(order.status().is_terminal());
    }

    #[test]
    fn test_empty_order_rejected() {
        assert!(matches!(Order::place(Uuid::new_v4(), vec![], PaymentMethod::Card, "", None), Err(CommerceError::InvalidInput(_))));
    }

    #[test]
    fn test_cancelled_is_terminal() {
        let (mut order, a, b) = order();
        let released = order.cancel().unwrap();
        assert_eq!(released, Transition::Cancelled(vec![(a, 2), (b, 1)]));
        let err = order.transition(OrderStatus::Shipped, None).unwrap_err();
        assert!(matches!(err, CommerceError::InvalidTransition { from: OrderStatus::Cancelled, to: OrderStatus::Shipped }));
        assert!(matches!(order.cancel(), Err(CommerceError::InvalidTransition { .. })));
    }

    #[test]
    fn test_cancellation_freezes_payment() {
        let (mut order, _, _) = order();
        assert!(matches!(order.transition(OrderStatus::Cancelled, Some(PaymentStatus::Paid)), Err(CommerceError::PaymentFrozen(_))));
        assert_eq!(order.status(), OrderStatus::Pending);
        order.cancel().unwrap();
        assert!(matches!(order.transition(OrderStatus::Cancelled, Some(PaymentStatus::Paid)), Err(CommerceError::PaymentFrozen(_))));
        assert_eq!(order.transition(OrderStatus::Cancelled, Some(PaymentStatus::Unpaid)).unwrap(), Transition::Unchanged);
    }

    #[test]
    fn test_payment_alone_on_same_status() {
        let (mut order, _, _) = order();
        assert_eq!(order.transition(OrderStatus::Pending, Some(PaymentStatus::Paid)).unwrap(), Transition::Unchanged);
        assert_eq!(order.payment_status(), PaymentStatus::Paid);
    }

    #[test]
    fn test_delivered_cannot_go_back() {
        let (mut order, _, _) = order();
        assert!(order.transition(OrderStatus::Delivered, None).is_err());
        order.transition(OrderStatus::Shipped, None).unwrap();
        assert!(order.transition(OrderStatus::Pending, None).is_err());
        assert!(order.transition(OrderStatus::Cancelled, None).is_err());
    }

    #[test]
    fn test_correct_lines_recomputes_total() {
        let (mut order, a, b) = order();
        order.correct_lines(&[(a, 5)]).unwrap();
        assert_eq!(order.total_amount().amount(), Decimal::new(55, 0));
        let released_before = order.lines().iter().map(|l| l.allocated_quantity).sum::<u32>();
        assert_eq!(released_before, 3);

        assert!(matches!(order.correct_lines(&[(b, 2), (Uuid::nil(), 1)]), Err(CommerceError::LineNotFound(_))));
        assert!(matches!(order.correct_lines(&[(b, 0)]), Err(CommerceError::InvalidQuantity(0))));
        assert_eq!(order.lines()[1].quantity, 1);
        assert_eq!(order.total_amount().amount(), Decimal::new(55, 0));

        order.cancel().unwrap();
        let err = order.correct_lines(&[(a, 1)]).unwrap_err();
        assert!(matches!(err, CommerceError::OrderClosed { status: OrderStatus::Cancelled, .. }));
        assert!(err.to_string().contains("is cancelled"));
    }

    #[test]
    fn test_correction_past_representable_total_is_rejected() {
        let item = Uuid::new_v4();
        let mut huge = line(item, 1, 0);
        huge.unit_price_at_purchase = Money::new(Decimal::MAX).unwrap();
        let mut order = Order::place(Uuid::new_v4(), vec![huge], PaymentMethod::Cash, "1 Main St", None).unwrap();
        assert!(matches!(order.correct_lines(&[(item, 2)]), Err(CommerceError::InvalidInput(_))));
        assert_eq!(order.lines()[0].quantity, 1);
        assert_eq!(order.total_amount().amount(), Decimal::MAX);

        let mut twice = line(item, 2, 0);
        twice.unit_price_at_purchase = Money::new(Decimal::MAX).unwrap();
        assert!(matches!(Order::place(Uuid::new_v4(), vec![twice], PaymentMethod::Cash, "", None), Err(CommerceError::InvalidInput(_))));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(OrderStatus::parse("Shipped").unwrap(), OrderStatus::Shipped);
        assert!(matches!(OrderStatus::parse("lost"), Err(CommerceError::InvalidStatus(_))));
        assert!(matches!(PaymentStatus::parse("refunded"), Err(CommerceError::InvalidStatus(_))));
        assert_eq!(OrderStatus::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_payment_method_from_json() {
        let method: PaymentMethod = serde_json::from_str("\"Card\"").unwrap();
        assert_eq!(method, PaymentMethod::Card);
        let err = serde_json::from_str::<PaymentMethod>("\"barter\"").unwrap_err();
        assert!(err.to_string().contains("unknown payment method barter"));
        assert_eq!(serde_json::to_string(&PaymentMethod::Online).unwrap(), "\"online\"");
    }
}
