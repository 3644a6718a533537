use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::Display as EnumDisplay;

use crate::error::StoreError;

pub type ProductId = String;
pub type UserId = String;
pub type OrderId = String;
pub type NotificationId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumDisplay)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Manager,
    Customer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumDisplay)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Paid,
    Partial,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumDisplay)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Online,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub category: String,
    pub price: f64,
    /// MRP before any discount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<f64>,
    pub stock: u32,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Product {
    /// The anchor a discount is measured against.
    pub fn reference_price(&self) -> f64 {
        self.original_price.unwrap_or(self.price)
    }

    pub fn is_discounted(&self) -> bool {
        self.original_price.is_some_and(|mrp| mrp > self.price)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.name.trim().is_empty() {
            return Err(StoreError::invalid("product name must not be empty"));
        }
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(StoreError::invalid(format!(
                "price of {} must be positive, got {}",
                self.id, self.price
            )));
        }
        if let Some(mrp) = self.original_price {
            if !mrp.is_finite() || self.price > mrp {
                return Err(StoreError::invalid(format!(
                    "price {} of {} exceeds its original price {}",
                    self.price, self.id, mrp
                )));
            }
        }
        Ok(())
    }

    /// Lowers the selling price, pinning the original price on first discount.
    /// Returns the price that was replaced.
    pub fn apply_discount(&mut self, new_price: f64) -> Result<f64, StoreError> {
        if !new_price.is_finite() || new_price <= 0.0 {
            return Err(StoreError::invalid(format!(
                "discounted price must be positive, got {}",
                new_price
            )));
        }
        let reference = self.reference_price();
        if new_price > reference {
            return Err(StoreError::invalid(format!(
                "discounted price {} exceeds the original price {} of {}",
                new_price, reference, self.id
            )));
        }
        if new_price >= self.price {
            return Err(StoreError::invalid(format!(
                "discounted price {} is not below the current price {} of {}",
                new_price, self.price, self.id
            )));
        }

        let previous = self.price;
        if self.original_price.is_none() {
            self.original_price = Some(previous);
        }
        self.price = new_price;
        Ok(previous)
    }
}

/// Catalog input for creating or editing a product.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductDraft {
    #[serde(default)]
    pub id: Option<ProductId>,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub original_price: Option<f64>,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: UserRole,
    pub pending_dues: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_token: Option<String>,
}

impl User {
    pub fn is_manager(&self) -> bool {
        self.role == UserRole::Manager
    }

    pub fn is_customer(&self) -> bool {
        self.role == UserRole::Customer
    }

    pub fn has_dues(&self) -> bool {
        self.pending_dues > 0.0
    }
}

/// A product snapshot with the quantity bought. Product fields are frozen
/// at the time the line was created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    #[serde(flatten)]
    pub product: Product,
    pub quantity: u32,
}

impl CartItem {
    pub fn line_total(&self) -> f64 {
        self.product.price * f64::from(self.quantity)
    }
}

/// A requested order line, priced from the catalog when the order is placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: UserId,
    pub customer_name: String,
    pub items: Vec<CartItem>,
    pub subtotal: f64,
    pub tax: f64,
    pub discount: f64,
    pub total: f64,
    pub amount_paid: f64,
    pub status: PaymentStatus,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    pub date: DateTime<Utc>,
}

impl Order {
    pub fn outstanding(&self) -> f64 {
        (self.total - self.amount_paid).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub title: String,
    pub message: String,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub read: bool,
}

/// A notification before the log assigns it an id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationDraft {
    pub user_id: UserId,
    pub title: String,
    pub message: String,
    pub order_id: Option<OrderId>,
}

/// A follow-up payment recorded against an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub order_id: OrderId,
    pub customer_id: UserId,
    pub amount: f64,
    pub method: PaymentMethod,
    pub date: DateTime<Utc>,
}
