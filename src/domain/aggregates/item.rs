//! Item Aggregate
//!
//! A sellable catalog entry. `status` is never set independently: it is
//! `soldout` exactly when `quantity` is zero.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;
use validator::Validate;

use crate::domain::events::{DomainEvent, ItemEvent};
use crate::domain::value_objects::{Category, Money, Quantity};
use crate::{CommerceError, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    pub(crate) category: Category,
    pub(crate) price: Money,
    pub(crate) quantity: Quantity,
    pub(crate) status: ItemStatus,
    pub(crate) owner_account_id: Uuid,
    pub(crate) photo_url: Option<String>,
    pub(crate) description: String,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ItemStatus {
    #[default]
    Available,
    Soldout,
}

impl ItemStatus {
    pub fn for_quantity(quantity: Quantity) -> Self {
        if quantity.is_zero() { Self::Soldout } else { Self::Available }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        raw.parse().map_err(|_| CommerceError::InvalidStatus(raw.to_string()))
    }
}

/// Fields an admin supplies when listing a new item.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ItemDraft {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub category: Category,
    pub price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub description: String,
    pub photo_url: Option<String>,
    /// Optional explicit status; must agree with `quantity`.
    pub status: Option<String>,
}

/// Partial update of an item. Absent fields are left untouched.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ItemPatch {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub category: Option<Category>,
    pub price: Option<Decimal>,
    pub quantity: Option<u32>,
    pub description: Option<String>,
    pub photo_url: Option<String>,
    pub status: Option<String>,
}

impl Item {
    pub fn create(draft: ItemDraft, owner_account_id: Uuid) -> Result<Self> {
        draft.validate()?;
        let price = parse_price(draft.price)?;
        let quantity = Quantity::new(draft.quantity);
        let status = reconcile_status(draft.status.as_deref(), quantity)?;
        let id = Uuid::now_v7();
        let now = Utc::now();
        let mut item = Self {
            id, name: draft.name, category: draft.category, price, quantity, status, owner_account_id,
            photo_url: draft.photo_url, description: draft.description, created_at: now, updated_at: now, events: vec![],
        };
        item.raise_event(DomainEvent::Item(ItemEvent::Created { item_id: id }));
        Ok(item)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn category(&self) -> &Category { &self.category }
    pub fn price(&self) -> Money { self.price }
    pub fn quantity(&self) -> u32 { self.quantity.value() }
    pub fn status(&self) -> ItemStatus { self.status }
    pub fn owner_account_id(&self) -> Uuid { self.owner_account_id }
    pub fn photo_url(&self) -> Option<&str> { self.photo_url.as_deref() }
    pub fn description(&self) -> &str { &self.description }

    /// Fails with `InsufficientStock` unless `requested` units can be taken.
    pub fn ensure_stock(&self, requested: u64) -> Result<()> {
        if u64::from(self.quantity.value()) < requested {
            return Err(CommerceError::InsufficientStock { item_id: self.id, requested, available: self.quantity.value() });
        }
        Ok(())
    }

    pub fn adjust_quantity(&mut self, delta: i64) -> Result<()> {
        let next = self.quantity.offset(delta).ok_or_else(|| {
            if delta < 0 {
                CommerceError::InsufficientStock { item_id: self.id, requested: delta.unsigned_abs(), available: self.quantity.value() }
            } else {
                CommerceError::InvalidQuantity(delta)
            }
        })?;
        self.set_quantity(next);
        Ok(())
    }

    /// Validates the whole patch before touching any field.
    pub fn apply_patch(&mut self, patch: ItemPatch) -> Result<()> {
        patch.validate()?;
        let price = patch.price.map(parse_price).transpose()?;
        let quantity = patch.quantity.map(Quantity::new).unwrap_or(self.quantity);
        reconcile_status(patch.status.as_deref(), quantity)?;

        if let Some(name) = patch.name { self.name = name; }
        if let Some(category) = patch.category { self.category = category; }
        if let Some(price) = price { self.price = price; }
        if let Some(description) = patch.description { self.description = description; }
        if let Some(photo_url) = patch.photo_url { self.photo_url = Some(photo_url); }
        if quantity != self.quantity { self.set_quantity(quantity); }
        self.touch();
        Ok(())
    }

    fn set_quantity(&mut self, next: Quantity) {
        let delta = i64::from(next.value()) - i64::from(self.quantity.value());
        let before = self.status;
        self.quantity = next;
        self.status = ItemStatus::for_quantity(next);
        self.touch();
        self.raise_event(DomainEvent::Item(ItemEvent::StockAdjusted { item_id: self.id, delta, quantity: next.value() }));
        match (before, self.status) {
            (ItemStatus::Available, ItemStatus::Soldout) => self.raise_event(DomainEvent::Item(ItemEvent::SoldOut { item_id: self.id })),
            (ItemStatus::Soldout, ItemStatus::Available) => {
                self.raise_event(DomainEvent::Item(ItemEvent::BackInStock { item_id: self.id, quantity: next.value() }))
            }
            _ => {}
        }
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

fn parse_price(amount: Decimal) -> Result<Money> {
    Money::new(amount).map_err(|_| CommerceError::InvalidInput(format!("price must not be negative, got {amount}")))
}

fn reconcile_status(explicit: Option<&str>, quantity: Quantity) -> Result<ItemStatus> {
    let derived = ItemStatus::for_quantity(quantity);
    match explicit.map(ItemStatus::parse).transpose()? {
        Some(status) if status != derived => Err(CommerceError::InvalidInput(format!(
            "status {status} contradicts quantity {}",
            quantity.value()
        ))),
        _ => Ok(derived),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(quantity: u32) -> ItemDraft {
        ItemDraft {
            name: "Basmati 5kg".into(),
            category: Category::new("Tilda", "Rice"),
            price: Decimal::new(10, 0),
            quantity,
            description: String::new(),
            photo_url: None,
            status: None,
        }
    }

    #[test]
    fn test_status_follows_quantity_on_create() {
        let owner = Uuid::new_v4();
        assert_eq!(Item::create(draft(3), owner).unwrap().status(), ItemStatus::Available);
        assert_eq!(Item::create(draft(0), owner).unwrap().status(), ItemStatus::Soldout);
    }

    #[test]
    fn test_create_rejects_unknown_or_contradicting_status() {
        let owner = Uuid::new_v4();
        let mut d = draft(3);
        d.status = Some("discontinued".into());
        assert!(matches!(Item::create(d, owner), Err(CommerceError::InvalidStatus(s)) if s == "discontinued"));

        let mut d = draft(3);
        d.status = Some("soldout".into());
        assert!(matches!(Item::create(d, owner), Err(CommerceError::InvalidInput(_))));
    }

    #[test]
    fn test_create_rejects_negative_price() {
        let mut d = draft(1);
        d.price = Decimal::new(-1, 0);
        assert!(matches!(Item::create(d, Uuid::new_v4()), Err(CommerceError::InvalidInput(_))));
    }

    #[test]
    fn test_adjust_quantity_to_zero_sells_out_and_back() {
        let mut item = Item::create(draft(2), Uuid::new_v4()).unwrap();
        item.take_events();
        item.adjust_quantity(-2).unwrap();
        assert_eq!(item.quantity(), 0);
        assert_eq!(item.status(), ItemStatus::Soldout);
        assert!(item.take_events().contains(&DomainEvent::Item(ItemEvent::SoldOut { item_id: item.id() })));

        item.adjust_quantity(4).unwrap();
        assert_eq!(item.status(), ItemStatus::Available);
        assert_eq!(item.quantity(), 4);
    }

    #[test]
    fn test_adjust_quantity_never_goes_negative() {
        let mut item = Item::create(draft(2), Uuid::new_v4()).unwrap();
        let err = item.adjust_quantity(-3).unwrap_err();
        assert!(matches!(err, CommerceError::InsufficientStock { requested: 3, available: 2, .. }));
        assert_eq!(item.quantity(), 2);
    }

    #[test]
    fn test_patch_is_all_or_nothing() {
        let mut item = Item::create(draft(5), Uuid::new_v4()).unwrap();
        let patch = ItemPatch { name: Some("Renamed".into()), status: Some("gone".into()), ..Default::default() };
        assert!(item.apply_patch(patch).is_err());
        assert_eq!(item.name(), "Basmati 5kg");

        let patch = ItemPatch { quantity: Some(0), status: Some("soldout".into()), ..Default::default() };
        item.apply_patch(patch).unwrap();
        assert_eq!(item.status(), ItemStatus::Soldout);
    }
}
