//! Customer account repository: addresses and orders

use super::product::row_to_product;
use crate::db::DbPool;
use crate::models::{Address, AddressInput, Order, OrderItem, OrderLineInput, OrderStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

const ADDRESS_COLUMNS: &str = "id, user_id, label, recipient, street, postal_code, city, country, phone, \
    is_default, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, user_id, status, total_ore, currency, shipping_recipient, shipping_street, \
    shipping_postal_code, shipping_city, shipping_country, created_at, updated_at";

/// Why an order could not be placed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderRejection {
    UnknownProduct(i64),
    /// Inactive, or not enough in stock
    Unavailable { product_id: i64, name: String },
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn list_addresses(&self, user_id: i64) -> Result<Vec<Address>>;

    /// Address owned by `user_id`
    async fn get_address(&self, user_id: i64, id: i64) -> Result<Option<Address>>;

    /// A user's first address becomes the default; a new default clears the old one
    async fn create_address(&self, user_id: i64, input: &AddressInput) -> Result<Address>;

    async fn update_address(&self, user_id: i64, id: i64, input: &AddressInput) -> Result<Option<Address>>;

    async fn delete_address(&self, user_id: i64, id: i64) -> Result<bool>;

    /// Check stock, decrement it, snapshot prices and write the order in one
    /// transaction. Nothing is written when a line is rejected.
    async fn place_order(
        &self,
        user_id: i64,
        address: &Address,
        lines: &[OrderLineInput],
    ) -> Result<std::result::Result<Order, OrderRejection>>;

    async fn get_order(&self, id: i64) -> Result<Option<Order>>;

    async fn list_orders_for_user(&self, user_id: i64) -> Result<Vec<Order>>;

    /// All orders, newest first, optionally filtered by status
    async fn list_orders(&self, status: Option<OrderStatus>, page: i64, per_page: i64) -> Result<(Vec<Order>, i64)>;

    /// Move an order from `from` to `to`. False when the order is gone or
    /// no longer in `from`.
    async fn update_order_status(&self, id: i64, from: OrderStatus, to: OrderStatus) -> Result<bool>;

    async fn count_orders(&self, status: Option<OrderStatus>) -> Result<i64>;
}

pub struct SqlxAccountRepository {
    pool: DbPool,
}

impl SqlxAccountRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn AccountRepository> {
        Arc::new(Self::new(pool))
    }

    async fn items_for(&self, order_id: i64) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query(
            "SELECT id, order_id, product_id, product_name, unit_price_ore, quantity FROM order_items WHERE order_id = ? ORDER BY id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load order items")?;

        Ok(rows
            .iter()
            .map(|r| OrderItem {
                id: r.get("id"),
                order_id: r.get("order_id"),
                product_id: r.get("product_id"),
                product_name: r.get("product_name"),
                unit_price_ore: r.get("unit_price_ore"),
                quantity: r.get("quantity"),
            })
            .collect())
    }

    async fn with_items(&self, rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<Order>> {
        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut order = row_to_order(row);
            order.items = self.items_for(order.id).await?;
            orders.push(order);
        }
        Ok(orders)
    }
}

async fn clear_default(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, user_id: i64) -> Result<()> {
    sqlx::query("UPDATE addresses SET is_default = 0 WHERE user_id = ? AND is_default = 1")
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .context("Failed to clear default address")?;
    Ok(())
}

#[async_trait]
impl AccountRepository for SqlxAccountRepository {
    async fn list_addresses(&self, user_id: i64) -> Result<Vec<Address>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM addresses WHERE user_id = ? ORDER BY is_default DESC, id",
            ADDRESS_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list addresses")?;
        Ok(rows.iter().map(row_to_address).collect())
    }

    async fn get_address(&self, user_id: i64, id: i64) -> Result<Option<Address>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM addresses WHERE id = ? AND user_id = ?",
            ADDRESS_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get address")?;
        Ok(row.map(|r| row_to_address(&r)))
    }

    async fn create_address(&self, user_id: i64, input: &AddressInput) -> Result<Address> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let existing: i64 = sqlx::query("SELECT COUNT(*) as count FROM addresses WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await
            .context("Failed to count addresses")?
            .get("count");
        let is_default = input.is_default || existing == 0;
        if is_default {
            clear_default(&mut tx, user_id).await?;
        }

        let result = sqlx::query(
            r#"
            INSERT INTO addresses (user_id, label, recipient, street, postal_code, city, country, phone,
                                   is_default, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(&input.label)
        .bind(&input.recipient)
        .bind(&input.street)
        .bind(&input.postal_code)
        .bind(&input.city)
        .bind(&input.country)
        .bind(&input.phone)
        .bind(is_default)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create address")?;

        tx.commit().await.context("Failed to commit address")?;

        Ok(Address {
            id: result.last_insert_rowid(),
            user_id,
            label: input.label.clone(),
            recipient: input.recipient.clone(),
            street: input.street.clone(),
            postal_code: input.postal_code.clone(),
            city: input.city.clone(),
            country: input.country.clone(),
            phone: input.phone.clone(),
            is_default,
            created_at: now,
            updated_at: now,
        })
    }

    async fn update_address(&self, user_id: i64, id: i64, input: &AddressInput) -> Result<Option<Address>> {
        let Some(current) = self.get_address(user_id, id).await? else {
            return Ok(None);
        };
        let now = Utc::now();
        // Unsetting the flag on the current default is ignored; another address must take over
        let is_default = input.is_default || current.is_default;

        let mut tx = self.pool.begin().await?;
        if is_default && !current.is_default {
            clear_default(&mut tx, user_id).await?;
        }

        sqlx::query(
            r#"
            UPDATE addresses
            SET label = ?, recipient = ?, street = ?, postal_code = ?, city = ?, country = ?, phone = ?,
                is_default = ?, updated_at = ?
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(&input.label)
        .bind(&input.recipient)
        .bind(&input.street)
        .bind(&input.postal_code)
        .bind(&input.city)
        .bind(&input.country)
        .bind(&input.phone)
        .bind(is_default)
        .bind(now)
        .bind(id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to update address")?;

        tx.commit().await.context("Failed to commit address update")?;

        Ok(Some(Address {
            label: input.label.clone(),
            recipient: input.recipient.clone(),
            street: input.street.clone(),
            postal_code: input.postal_code.clone(),
            city: input.city.clone(),
            country: input.country.clone(),
            phone: input.phone.clone(),
            is_default,
            updated_at: now,
            ..current
        }))
    }

    async fn delete_address(&self, user_id: i64, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM addresses WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete address")?;
        Ok(result.rows_affected() == 1)
    }

    async fn place_order(
        &self,
        user_id: i64,
        address: &Address,
        lines: &[OrderLineInput],
    ) -> Result<std::result::Result<Order, OrderRejection>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut items = Vec::with_capacity(lines.len());

        for line in lines {
            let row = sqlx::query(
                "SELECT id, name, slug, description, price_ore, currency, stock, active, image_media_id, created_at, updated_at FROM products WHERE id = ?",
            )
            .bind(line.product_id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to load product for order")?;
            let Some(row) = row else {
                return Ok(Err(OrderRejection::UnknownProduct(line.product_id)));
            };
            let product = row_to_product(&row);
            if !product.can_fulfil(line.quantity) {
                return Ok(Err(OrderRejection::Unavailable {
                    product_id: product.id,
                    name: product.name,
                }));
            }

            sqlx::query("UPDATE products SET stock = stock - ?, updated_at = ? WHERE id = ?")
                .bind(line.quantity)
                .bind(now)
                .bind(product.id)
                .execute(&mut *tx)
                .await
                .context("Failed to decrement stock")?;

            items.push(OrderItem {
                id: 0,
                order_id: 0,
                product_id: Some(product.id),
                product_name: product.name,
                unit_price_ore: product.price_ore,
                quantity: line.quantity,
            });
        }

        let total_ore: i64 = items.iter().map(OrderItem::line_total).sum();
        let result = sqlx::query(
            r#"
            INSERT INTO orders (user_id, status, total_ore, currency, shipping_recipient, shipping_street,
                                shipping_postal_code, shipping_city, shipping_country, created_at, updated_at)
            VALUES (?, 'pending', ?, 'SEK', ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(total_ore)
        .bind(&address.recipient)
        .bind(&address.street)
        .bind(&address.postal_code)
        .bind(&address.city)
        .bind(&address.country)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create order")?;
        let order_id = result.last_insert_rowid();

        for item in &mut items {
            let result = sqlx::query(
                "INSERT INTO order_items (order_id, product_id, product_name, unit_price_ore, quantity) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(order_id)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(item.unit_price_ore)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await
            .context("Failed to create order item")?;
            item.id = result.last_insert_rowid();
            item.order_id = order_id;
        }

        tx.commit().await.context("Failed to commit order")?;

        Ok(Ok(Order {
            id: order_id,
            user_id,
            status: OrderStatus::Pending,
            total_ore,
            currency: "SEK".to_string(),
            shipping_recipient: address.recipient.clone(),
            shipping_street: address.street.clone(),
            shipping_postal_code: address.postal_code.clone(),
            shipping_city: address.city.clone(),
            shipping_country: address.country.clone(),
            items,
            created_at: now,
            updated_at: now,
        }))
    }

    async fn get_order(&self, id: i64) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {} FROM orders WHERE id = ?", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get order")?;
        match row {
            Some(row) => Ok(self.with_items(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_orders_for_user(&self, user_id: i64) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM orders WHERE user_id = ? ORDER BY created_at DESC, id DESC",
            ORDER_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list orders")?;
        self.with_items(rows).await
    }

    async fn list_orders(&self, status: Option<OrderStatus>, page: i64, per_page: i64) -> Result<(Vec<Order>, i64)> {
        let offset = (page.max(1) - 1) * per_page;
        let total = self.count_orders(status).await?;
        let status = status.map(|s| s.to_string());

        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM orders
            WHERE (? IS NULL OR status = ?)
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
            ORDER_COLUMNS
        ))
        .bind(&status)
        .bind(&status)
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list orders")?;

        Ok((self.with_items(rows).await?, total))
    }

    async fn update_order_status(&self, id: i64, from: OrderStatus, to: OrderStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
            .bind(to.to_string())
            .bind(Utc::now())
            .bind(id)
            .bind(from.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update order status")?;
        Ok(result.rows_affected() == 1)
    }

    async fn count_orders(&self, status: Option<OrderStatus>) -> Result<i64> {
        let status = status.map(|s| s.to_string());
        let row = sqlx::query("SELECT COUNT(*) as count FROM orders WHERE (? IS NULL OR status = ?)")
            .bind(&status)
            .bind(&status)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count orders")?;
        Ok(row.get("count"))
    }
}

fn row_to_address(row: &sqlx::sqlite::SqliteRow) -> Address {
    Address {
        id: row.get("id"),
        user_id: row.get("user_id"),
        label: row.get("label"),
        recipient: row.get("recipient"),
        street: row.get("street"),
        postal_code: row.get("postal_code"),
        city: row.get("city"),
        country: row.get("country"),
        phone: row.get("phone"),
        is_default: row.get("is_default"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_order(row: &sqlx::sqlite::SqliteRow) -> Order {
    let status: String = row.get("status");
    Order {
        id: row.get("id"),
        user_id: row.get("user_id"),
        status: status.parse().unwrap_or_default(),
        total_ore: row.get("total_ore"),
        currency: row.get("currency"),
        shipping_recipient: row.get("shipping_recipient"),
        shipping_street: row.get("shipping_street"),
        shipping_postal_code: row.get("shipping_postal_code"),
        shipping_city: row.get("shipping_city"),
        shipping_country: row.get("shipping_country"),
        items: Vec::new(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
