//! Account Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;
use validator::Validate;

use crate::domain::events::{AccountEvent, DomainEvent};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    pub(crate) email: String,
    #[serde(skip_serializing)]
    pub(crate) password_hash: String,
    pub(crate) role: Role,
    /// The admin that created this account; `None` for the admin itself.
    pub(crate) created_by: Option<Uuid>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase", ascii_case_insensitive)]
pub enum Role {
    Admin,
    Vendor,
    CustomerCare,
}

impl Role {
    /// Roles that own a cart and place orders.
    pub fn is_buyer(self) -> bool { matches!(self, Self::Vendor | Self::CustomerCare) }
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewAccount {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct AccountPatch {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 8, max = 128))]
    pub password: Option<String>,
}

impl Account {
    pub fn create(name: impl Into<String>, email: &str, password_hash: String, role: Role, created_by: Option<Uuid>) -> Self {
        let id = Uuid::now_v7();
        let now = Utc::now();
        let mut account = Self {
            id, name: name.into(), email: normalize_email(email), password_hash, role, created_by,
            created_at: now, updated_at: now, events: vec![],
        };
        account.raise_event(DomainEvent::Account(AccountEvent::Created { account_id: id, role: role.to_string() }));
        account
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn email(&self) -> &str { &self.email }
    pub fn password_hash(&self) -> &str { &self.password_hash }
    pub fn role(&self) -> Role { self.role }
    pub fn created_by(&self) -> Option<Uuid> { self.created_by }

    pub fn rename(&mut self, name: String) { self.name = name; self.touch(); }
    pub fn change_email(&mut self, email: &str) { self.email = normalize_email(email); self.touch(); }
    pub fn change_password_hash(&mut self, hash: String) { self.password_hash = hash; self.touch(); }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

pub fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }
