//! Customer account service: delivery addresses and orders
//!
//! Customers only ever see their own rows; a foreign id behaves exactly like
//! a missing one. Staff order handling lives at the bottom.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{AccountRepository, OrderRejection};
use crate::models::{Address, AddressInput, Order, OrderStatus, PlaceOrderInput, User};
use crate::services::email::Mailer;
use crate::services::validation::FieldErrors;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

const MAX_ORDER_LINES: usize = 50;
const MAX_LINE_QUANTITY: i64 = 999;
const CACHE_PATTERN_CONTENT: &str = "content:*";

#[derive(Debug, thiserror::Error)]
pub enum AccountServiceError {
    #[error("Uppgifterna innehåller fel: {0}")]
    Invalid(FieldErrors),

    #[error("{kind} hittades inte: {id}")]
    NotFound { kind: &'static str, id: i64 },

    #[error("Ordern kan inte gå från {from} till {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl AccountServiceError {
    fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::Invalid(FieldErrors::single(field, message))
    }
}

#[derive(Debug, Serialize)]
pub struct OrderList {
    pub orders: Vec<Order>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

pub struct AccountService {
    repo: Arc<dyn AccountRepository>,
    mailer: Arc<Mailer>,
    cache: Arc<Cache>,
}

impl AccountService {
    pub fn new(repo: Arc<dyn AccountRepository>, mailer: Arc<Mailer>, cache: Arc<Cache>) -> Self {
        Self { repo, mailer, cache }
    }

    // ========================================================================
    // Addresses
    // ========================================================================

    pub async fn list_addresses(&self, user: &User) -> Result<Vec<Address>, AccountServiceError> {
        Ok(self.repo.list_addresses(user.id).await?)
    }

    pub async fn get_address(&self, user: &User, id: i64) -> Result<Address, AccountServiceError> {
        self.repo
            .get_address(user.id, id)
            .await?
            .ok_or(AccountServiceError::NotFound { kind: "Adressen", id })
    }

    pub async fn create_address(&self, user: &User, input: AddressInput) -> Result<Address, AccountServiceError> {
        let input = normalize_address(input).map_err(AccountServiceError::Invalid)?;
        let address = self.repo.create_address(user.id, &input).await?;
        tracing::debug!(user_id = user.id, address_id = address.id, "Address created");
        Ok(address)
    }

    pub async fn update_address(
        &self,
        user: &User,
        id: i64,
        input: AddressInput,
    ) -> Result<Address, AccountServiceError> {
        let input = normalize_address(input).map_err(AccountServiceError::Invalid)?;
        self.repo
            .update_address(user.id, id, &input)
            .await?
            .ok_or(AccountServiceError::NotFound { kind: "Adressen", id })
    }

    /// Orders keep their own copy of the shipping address, so this never
    /// touches order history
    pub async fn delete_address(&self, user: &User, id: i64) -> Result<(), AccountServiceError> {
        if !self.repo.delete_address(user.id, id).await? {
            return Err(AccountServiceError::NotFound { kind: "Adressen", id });
        }
        Ok(())
    }

    // ========================================================================
    // Orders
    // ========================================================================

    pub async fn place_order(&self, user: &User, input: PlaceOrderInput) -> Result<Order, AccountServiceError> {
        validate_lines(&input).map_err(AccountServiceError::Invalid)?;

        let address = self
            .repo
            .get_address(user.id, input.address_id)
            .await?
            .ok_or_else(|| AccountServiceError::invalid("address_id", "Välj en av dina sparade adresser"))?;

        let order = match self.repo.place_order(user.id, &address, &input.items).await? {
            Ok(order) => order,
            Err(OrderRejection::UnknownProduct(id)) => {
                return Err(AccountServiceError::invalid("items", format!("Produkten {} finns inte", id)));
            }
            Err(OrderRejection::Unavailable { name, .. }) => {
                return Err(AccountServiceError::invalid(
                    "items",
                    format!("{} finns inte i önskat antal", name),
                ));
            }
        };

        // Stock changed
        let _ = self.cache.delete_pattern(CACHE_PATTERN_CONTENT).await;

        tracing::info!(
            order_id = order.id,
            user_id = user.id,
            total_ore = order.total_ore,
            "Order placed"
        );

        if self.mailer.is_enabled() {
            let mailer = Arc::clone(&self.mailer);
            let to = user.email.clone();
            let receipt = order.clone();
            tokio::spawn(async move {
                if let Err(e) = mailer.send_order_confirmation(&to, &receipt).await {
                    tracing::warn!(order_id = receipt.id, error = %e, "Order confirmation mail failed");
                }
            });
        }

        Ok(order)
    }

    pub async fn list_orders(&self, user: &User) -> Result<Vec<Order>, AccountServiceError> {
        Ok(self.repo.list_orders_for_user(user.id).await?)
    }

    pub async fn get_order(&self, user: &User, id: i64) -> Result<Order, AccountServiceError> {
        match self.repo.get_order(id).await? {
            Some(order) if order.user_id == user.id => Ok(order),
            _ => Err(AccountServiceError::NotFound { kind: "Ordern", id }),
        }
    }

    // ========================================================================
    // Staff
    // ========================================================================

    pub async fn list_all_orders(
        &self,
        status: Option<OrderStatus>,
        page: i64,
        per_page: i64,
    ) -> Result<OrderList, AccountServiceError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);
        let (orders, total) = self.repo.list_orders(status, page, per_page).await?;
        Ok(OrderList { orders, total, page, per_page })
    }

    pub async fn get_any_order(&self, id: i64) -> Result<Order, AccountServiceError> {
        self.repo
            .get_order(id)
            .await?
            .ok_or(AccountServiceError::NotFound { kind: "Ordern", id })
    }

    pub async fn update_order_status(&self, id: i64, status: OrderStatus) -> Result<Order, AccountServiceError> {
        let order = self.get_any_order(id).await?;
        if order.status == status {
            return Ok(order);
        }
        if !order.status.can_transition_to(status) {
            return Err(AccountServiceError::InvalidTransition { from: order.status, to: status });
        }

        if !self.repo.update_order_status(id, order.status, status).await? {
            // Changed or removed since it was read
            let current = self.get_any_order(id).await?;
            return Err(AccountServiceError::InvalidTransition { from: current.status, to: status });
        }
        tracing::info!(order_id = id, from = %order.status, to = %status, "Order status changed");
        self.get_any_order(id).await
    }

    pub async fn count_orders(&self, status: Option<OrderStatus>) -> Result<i64, AccountServiceError> {
        Ok(self.repo.count_orders(status).await?)
    }
}

fn normalize_address(input: AddressInput) -> Result<AddressInput, FieldErrors> {
    let mut errors = FieldErrors::new();

    let recipient = input.recipient.trim().to_string();
    errors.check(!recipient.is_empty(), "recipient", "Mottagare måste anges");
    let street = input.street.trim().to_string();
    errors.check(!street.is_empty(), "street", "Gatuadress måste anges");
    let city = input.city.trim().to_string();
    errors.check(!city.is_empty(), "city", "Ort måste anges");

    let country = input.country.trim().to_uppercase();
    errors.check(
        country.len() == 2 && country.chars().all(|c| c.is_ascii_uppercase()),
        "country",
        "Ange landskod med två bokstäver, t.ex. SE",
    );

    let postal_code = normalize_postal_code(&input.postal_code, &country);
    errors.check(postal_code.is_some(), "postal_code", "Ogiltigt postnummer");

    errors.into_result()?;

    let trimmed = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    Ok(AddressInput {
        label: trimmed(input.label),
        recipient,
        street,
        postal_code: postal_code.unwrap_or_default(),
        city,
        country,
        phone: trimmed(input.phone),
        is_default: input.is_default,
    })
}

/// Swedish postal codes are five digits written `NNN NN`
fn normalize_postal_code(raw: &str, country: &str) -> Option<String> {
    let raw = raw.trim();
    if country == "SE" {
        let digits: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        if digits.len() == 5 && digits.chars().all(|c| c.is_ascii_digit()) {
            return Some(format!("{} {}", &digits[..3], &digits[3..]));
        }
        return None;
    }
    (!raw.is_empty() && raw.len() <= 12).then(|| raw.to_string())
}

fn validate_lines(input: &PlaceOrderInput) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    errors.check(!input.items.is_empty(), "items", "Ordern måste innehålla minst en produkt");
    errors.check(
        input.items.len() <= MAX_ORDER_LINES,
        "items",
        format!("Högst {} orderrader per order", MAX_ORDER_LINES),
    );
    errors.check(
        input.items.iter().all(|l| (1..=MAX_LINE_QUANTITY).contains(&l.quantity)),
        "items",
        format!("Antal måste vara mellan 1 och {}", MAX_LINE_QUANTITY),
    );
    let mut seen = HashSet::new();
    errors.check(
        input.items.iter().all(|l| seen.insert(l.product_id)),
        "items",
        "Samma produkt förekommer flera gånger",
    );
    errors.into_result()
}
