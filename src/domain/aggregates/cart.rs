//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::{Money, MoneyError};
use crate::{CommerceError, Result};

/// One cart per account. `total_price` is recomputed on every mutation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub(crate) owner_account_id: Uuid,
    pub(crate) lines: Vec<CartLine>,
    pub(crate) total_price: Money,
    pub(crate) updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub id: Uuid,
    pub item_id: Uuid,
    pub quantity: u32,
    /// Catalog price when the line was last added or updated.
    pub unit_price_at_add: Money,
}

impl CartLine {
    pub fn line_total(&self) -> std::result::Result<Money, MoneyError> { self.unit_price_at_add.multiply(self.quantity) }
}

impl Cart {
    pub fn for_account(owner_account_id: Uuid) -> Self {
        Self { owner_account_id, lines: vec![], total_price: Money::ZERO, updated_at: Utc::now() }
    }

    pub fn owner_account_id(&self) -> Uuid { self.owner_account_id }
    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn total_price(&self) -> Money { self.total_price }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn contains_item(&self, item_id: Uuid) -> bool { self.lines.iter().any(|l| l.item_id == item_id) }

    /// Merges into an existing line for the item (refreshing its price) or appends a new one.
    pub fn add_line(&mut self, item_id: Uuid, quantity: u32, current_price: Money) -> Result<&CartLine> {
        if quantity == 0 { return Err(CommerceError::InvalidQuantity(0)); }
        let mut lines = self.lines.clone();
        let idx = match lines.iter().position(|l| l.item_id == item_id) {
            Some(idx) => {
                let line = &mut lines[idx];
                line.quantity = line.quantity.checked_add(quantity).ok_or(CommerceError::InvalidQuantity(i64::from(quantity)))?;
                line.unit_price_at_add = current_price;
                idx
            }
            None => {
                lines.push(CartLine { id: Uuid::now_v7(), item_id, quantity, unit_price_at_add: current_price });
                lines.len() - 1
            }
        };
        self.replace_lines(lines)?;
        Ok(&self.lines[idx])
    }

    /// Sets a line's quantity; zero removes the line.
    pub fn update_line(&mut self, line_id: Uuid, quantity: u32, current_price: Money) -> Result<()> {
        self.line(line_id)?;
        let mut lines = self.lines.clone();
        if quantity == 0 {
            lines.retain(|l| l.id != line_id);
        } else if let Some(line) = lines.iter_mut().find(|l| l.id == line_id) {
            line.quantity = quantity;
            line.unit_price_at_add = current_price;
        }
        self.replace_lines(lines)
    }

    pub fn line(&self, line_id: Uuid) -> Result<&CartLine> {
        self.lines.iter().find(|l| l.id == line_id).ok_or(CommerceError::CartLineNotFound(line_id))
    }

    pub fn remove_line(&mut self, line_id: Uuid) -> Result<()> {
        self.line(line_id)?;
        let lines = self.lines.iter().filter(|l| l.id != line_id).cloned().collect();
        self.replace_lines(lines)
    }

    /// Drops every line referencing `item_id`. Returns whether anything changed.
    pub fn drop_item(&mut self, item_id: Uuid) -> Result<bool> {
        if !self.contains_item(item_id) { return Ok(false); }
        let lines = self.lines.iter().filter(|l| l.item_id != item_id).cloned().collect();
        self.replace_lines(lines)?;
        Ok(true)
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.total_price = Money::ZERO;
        self.updated_at = Utc::now();
    }

    /// Installs `lines` only if their total is representable.
    fn replace_lines(&mut self, lines: Vec<CartLine>) -> Result<()> {
        let total = Money::total(lines.iter().map(CartLine::line_total))?;
        self.lines = lines;
        self.total_price = total;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn price(units: i64) -> Money { Money::new(Decimal::new(units, 0)).unwrap() }

    fn assert_reconciled(cart: &Cart) {
        let expected = Money::total(cart.lines().iter().map(|l| l.unit_price_at_add.multiply(l.quantity))).unwrap();
        assert_eq!(cart.total_price(), expected);
    }

    #[test]
    fn test_cart_operations() {
        let mut cart = Cart::for_account(Uuid::new_v4());
        let p1 = Uuid::new_v4();
        cart.add_line(p1, 2, price(10)).unwrap();
        assert_eq!(cart.total_price(), price(20));
        cart.add_line(p1, 1, price(12)).unwrap();
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].quantity, 3); // Merged, price refreshed
        assert_eq!(cart.total_price(), price(36));
        assert_reconciled(&cart);
    }

    #[test]
    fn test_update_and_remove_lines() {
        let mut cart = Cart::for_account(Uuid::new_v4());
        let a = cart.add_line(Uuid::new_v4(), 1, price(5)).unwrap().id;
        let b = cart.add_line(Uuid::new_v4(), 4, price(2)).unwrap().id;
        cart.update_line(a, 3, price(5)).unwrap();
        assert_eq!(cart.total_price(), price(23));
        cart.update_line(b, 0, price(2)).unwrap();
        assert_eq!(cart.lines().len(), 1);
        assert_reconciled(&cart);
        assert!(matches!(cart.remove_line(b), Err(CommerceError::CartLineNotFound(id)) if id == b));
        cart.remove_line(a).unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.total_price(), Money::ZERO);
    }

    #[test]
    fn test_add_zero_quantity_rejected() {
        let mut cart = Cart::for_account(Uuid::new_v4());
        assert!(matches!(cart.add_line(Uuid::new_v4(), 0, price(1)), Err(CommerceError::InvalidQuantity(0))));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_unrepresentable_total_leaves_cart_untouched() {
        let mut cart = Cart::for_account(Uuid::new_v4());
        let item = Uuid::new_v4();
        cart.add_line(item, 1, Money::new(Decimal::MAX).unwrap()).unwrap();
        assert!(matches!(cart.add_line(item, 1, Money::new(Decimal::MAX).unwrap()), Err(CommerceError::InvalidInput(_))));
        assert!(matches!(cart.add_line(Uuid::new_v4(), 3, price(1)), Err(CommerceError::InvalidInput(_))));
        let line = cart.lines()[0].id;
        assert!(matches!(cart.update_line(line, 2, Money::new(Decimal::MAX).unwrap()), Err(CommerceError::InvalidInput(_))));
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].quantity, 1);
        assert_eq!(cart.total_price().amount(), Decimal::MAX);
    }

    #[test]
    fn test_clear_twice_is_noop() {
        let mut cart = Cart::for_account(Uuid::new_v4());
        cart.add_line(Uuid::new_v4(), 2, price(7)).unwrap();
        cart.clear();
        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(cart.total_price(), Money::ZERO);
    }
}
