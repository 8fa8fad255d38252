//! Value Objects for the order desk

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Non-negative monetary amount. The desk trades in a single currency.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() { return Err(MoneyError::Negative); }
        Ok(Self(amount))
    }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn add(&self, other: Money) -> Result<Money, MoneyError> {
        self.0.checked_add(other.0).map(Money).ok_or(MoneyError::Overflow)
    }
    pub fn multiply(&self, qty: u32) -> Result<Money, MoneyError> {
        self.0.checked_mul(Decimal::from(qty)).map(Money).ok_or(MoneyError::Overflow)
    }

    /// Sum of `amounts`, failing instead of wrapping past `Decimal::MAX`.
    pub fn total<I: IntoIterator<Item = Result<Money, MoneyError>>>(amounts: I) -> Result<Money, MoneyError> {
        amounts.into_iter().try_fold(Money::ZERO, |acc, m| acc.add(m?))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum MoneyError { Negative, Overflow }
impl std::error::Error for MoneyError {}
impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Negative => write!(f, "amount must not be negative"),
            Self::Overflow => write!(f, "amount exceeds the representable range"),
        }
    }
}

/// Stock quantity value object
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Self { Self(value) }
    pub fn value(&self) -> u32 { self.0 }
    pub fn is_zero(&self) -> bool { self.0 == 0 }

    /// Applies a signed delta. `None` when the result would leave `0..=u32::MAX`.
    pub fn offset(&self, delta: i64) -> Option<Self> {
        let next = i64::from(self.0).checked_add(delta)?;
        u32::try_from(next).ok().map(Self)
    }
}

/// Structured item category: the maker and the product line.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub company_name: String,
    pub product_name: String,
}

impl Category {
    pub fn new(company_name: impl Into<String>, product_name: impl Into<String>) -> Self {
        Self { company_name: company_name.into(), product_name: product_name.into() }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}/{}", self.company_name, self.product_name) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_rejects_negative() {
        assert_eq!(Money::new(Decimal::new(-1, 0)), Err(MoneyError::Negative));
        assert!(Money::new(Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_money_total() {
        let total = Money::total([Ok(Money::new(Decimal::new(1050, 2)).unwrap()), Money::new(Decimal::new(250, 2)).unwrap().multiply(2)])
            .unwrap();
        assert_eq!(total.amount(), Decimal::new(1550, 2));
    }

    #[test]
    fn test_money_overflow_is_an_error() {
        let max = Money::new(Decimal::MAX).unwrap();
        assert_eq!(max.multiply(2), Err(MoneyError::Overflow));
        assert_eq!(max.add(Money::new(Decimal::ONE).unwrap()), Err(MoneyError::Overflow));
        assert_eq!(Money::total([Ok(max), Ok(max)]), Err(MoneyError::Overflow));
        assert_eq!(max.multiply(1), Ok(max));
    }

    #[test]
    fn test_quantity_offset() {
        let q = Quantity::new(5);
        assert_eq!(q.offset(-5), Some(Quantity::new(0)));
        assert_eq!(q.offset(-6), None);
        assert_eq!(q.offset(3).map(|q| q.value()), Some(8));
        assert_eq!(Quantity::new(u32::MAX).offset(1), None);
    }
}
