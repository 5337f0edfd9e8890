//! Catalog and order aggregate types shared by the storefront jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ProductId = i64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: f64,
    pub is_active: bool,
    /// `None` means unlimited stock.
    pub stock: Option<u32>,
    #[serde(default)]
    pub is_flash_sale: bool,
    #[serde(default)]
    pub flash_sale_order: Option<i32>,
}

impl Product {
    /// Whether `quantity` units can be ordered right now.
    pub fn can_fulfil(&self, quantity: u32) -> bool {
        self.is_active && self.stock.map_or(true, |stock| stock >= quantity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub id: Uuid,
    pub user_id: Uuid,
    pub label: String,
    pub address_line: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    /// Withdrawn before it was complete; never billed or delivered.
    Cancelled,
}

/// Order fields supplied by the caller; the store assigns id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub address_id: Uuid,
    pub subtotal: f64,
    pub delivery_fee: f64,
    pub discount: f64,
    pub total: f64,
    pub payment_method: String,
    pub notes: String,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub address_id: Uuid,
    pub subtotal: f64,
    pub delivery_fee: f64,
    pub discount: f64,
    pub total: f64,
    pub payment_method: String,
    pub notes: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn from_new(id: Uuid, new: NewOrder, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: new.user_id,
            address_id: new.address_id,
            subtotal: new.subtotal,
            delivery_fee: new.delivery_fee,
            discount: new.discount,
            total: new.total,
            payment_method: new.payment_method,
            notes: new.notes,
            status: new.status,
            created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub order_id: Uuid,
    pub product_id: ProductId,
    pub product_name: String,
    pub product_price: f64,
    pub quantity: u32,
    pub subtotal: f64,
}

/// Round a currency amount to two decimal places.
pub fn round_currency(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
