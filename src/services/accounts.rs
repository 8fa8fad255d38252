//! Account directory: the single admin and the vendor / customer-care
//! accounts it manages.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{AuthGateway, Principal};
use crate::domain::aggregates::account::normalize_email;
use crate::domain::aggregates::{Account, AccountPatch, Cart, NewAccount, Role};
use crate::domain::events::{AccountEvent, DomainEvent};
use crate::publisher::EventPublisher;
use crate::store::{AccountFilter, OrderFilter, Store};
use crate::{CommerceError, Result};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub account: Account,
}

#[derive(Clone)]
pub struct Accounts {
    store: Arc<dyn Store>,
    events: Arc<dyn EventPublisher>,
    auth: Arc<AuthGateway>,
}

impl Accounts {
    pub fn new(store: Arc<dyn Store>, events: Arc<dyn EventPublisher>, auth: Arc<AuthGateway>) -> Self {
        Self { store, events, auth }
    }

    /// Registers the one admin account. A second signup fails with `Conflict`.
    #[instrument(skip(self, new), fields(email = %new.email))]
    pub async fn signup_admin(&self, new: NewAccount) -> Result<Account> {
        new.validate()?;
        let hash = self.auth.hash_password(&new.password)?;
        let mut account = Account::create(new.name, &new.email, hash, Role::Admin, None);
        let mut tx = self.store.begin().await?;
        tx.insert_account(&account).await?;
        tx.commit().await?;
        info!(account_id = %account.id(), "admin registered");
        self.events.publish_all(account.take_events()).await;
        Ok(account)
    }

    /// Admin-only: creates a vendor or customer-care account together with its empty cart.
    #[instrument(skip(self, new), fields(actor = %actor.account_id, email = %new.email))]
    pub async fn create_account(&self, actor: &Principal, role: Role, new: NewAccount) -> Result<Account> {
        actor.require_admin()?;
        if !role.is_buyer() {
            return Err(CommerceError::InvalidInput(format!("cannot create {role} accounts")));
        }
        new.validate()?;
        let hash = self.auth.hash_password(&new.password)?;
        let mut account = Account::create(new.name, &new.email, hash, role, Some(actor.account_id));
        let mut tx = self.store.begin().await?;
        tx.insert_account(&account).await?;
        tx.save_cart(&Cart::for_account(account.id())).await?;
        tx.commit().await?;
        info!(account_id = %account.id(), %role, "account created");
        self.events.publish_all(account.take_events()).await;
        Ok(account)
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        let mut tx = self.store.begin().await?;
        let account = tx.account_by_email(&normalize_email(email)).await?;
        let account = match account {
            Some(account) if self.auth.verify_password(password, account.password_hash()) => account,
            _ => {
                warn!("login rejected");
                return Err(CommerceError::Unauthorized("invalid email or password".into()));
            }
        };
        let token = self.auth.issue_token(&account)?;
        info!(account_id = %account.id(), "login");
        Ok(Session { token, account })
    }

    /// Resolves a bearer token to a live principal. Tokens of deleted accounts are refused.
    pub async fn authenticate(&self, token: &str) -> Result<Principal> {
        let claims = self.auth.verify_token(token)?;
        let mut tx = self.store.begin().await?;
        let account = tx
            .account(claims.sub)
            .await?
            .ok_or_else(|| CommerceError::Unauthorized("account no longer exists".into()))?;
        Ok(Principal::new(account.id(), account.role()))
    }

    pub async fn get_account(&self, id: Uuid) -> Result<Account> {
        let mut tx = self.store.begin().await?;
        tx.account(id).await?.ok_or(CommerceError::AccountNotFound(id))
    }

    pub async fn account_exists(&self, id: Uuid) -> Result<bool> {
        let mut tx = self.store.begin().await?;
        Ok(tx.account(id).await?.is_some())
    }

    pub async fn list_accounts(&self, actor: &Principal, role: Option<Role>) -> Result<Vec<Account>> {
        actor.require_admin()?;
        let mut tx = self.store.begin().await?;
        tx.accounts(AccountFilter { role, ..Default::default() }).await
    }

    /// Accounts the calling admin created.
    pub async fn managed_accounts(&self, actor: &Principal) -> Result<Vec<Account>> {
        actor.require_admin()?;
        let mut tx = self.store.begin().await?;
        tx.accounts(AccountFilter { created_by: Some(actor.account_id), ..Default::default() }).await
    }

    #[instrument(skip(self, patch), fields(actor = %actor.account_id))]
    pub async fn update_account(&self, actor: &Principal, id: Uuid, patch: AccountPatch) -> Result<Account> {
        actor.require_owner_or_admin(id)?;
        patch.validate()?;
        let hash = patch.password.as_deref().map(|p| self.auth.hash_password(p)).transpose()?;
        let mut tx = self.store.begin().await?;
        let mut account = tx.account(id).await?.ok_or(CommerceError::AccountNotFound(id))?;
        if let Some(name) = patch.name {
            account.rename(name);
        }
        if let Some(email) = patch.email.as_deref() {
            account.change_email(email);
        }
        if let Some(hash) = hash {
            account.change_password_hash(hash);
        }
        tx.update_account(&account).await?;
        tx.commit().await?;
        info!(account_id = %id, "account updated");
        Ok(account)
    }

    /// Admin-only. Refused while the account still has open orders; its cart and
    /// closed orders go with it.
    #[instrument(skip(self), fields(actor = %actor.account_id))]
    pub async fn delete_account(&self, actor: &Principal, id: Uuid) -> Result<()> {
        actor.require_admin()?;
        if id == actor.account_id {
            return Err(CommerceError::InvalidInput("the admin account cannot delete itself".into()));
        }
        let mut tx = self.store.begin().await?;
        tx.account(id).await?.ok_or(CommerceError::AccountNotFound(id))?;
        let orders = tx.orders(OrderFilter { owner: Some(id), ..Default::default() }).await?;
        let open = orders.iter().filter(|o| o.status().is_open()).count();
        if open > 0 {
            return Err(CommerceError::Conflict(format!("account {id} has {open} open order(s)")));
        }
        for order in &orders {
            tx.delete_order(order.id()).await?;
        }
        tx.delete_cart(id).await?;
        tx.delete_account(id).await?;
        tx.commit().await?;
        info!(account_id = %id, closed_orders = orders.len(), "account deleted");
        self.events.publish(&DomainEvent::Account(AccountEvent::Deleted { account_id: id })).await;
        Ok(())
    }
}
