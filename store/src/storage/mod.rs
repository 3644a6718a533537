// Storage trait and the in-process document store
pub mod in_memory;

pub use in_memory::InMemoryStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::billing::Pricing;
use crate::cart::Cart;
use crate::error::StoreError;
use crate::model::*;

/// Initial contents loaded on start-up and on reset.
#[derive(Debug, Clone, Default)]
pub struct Seed {
    pub users: Vec<User>,
    pub products: Vec<Product>,
    pub advertisement: String,
}

/// Everything needed to commit an order in one step. Lines are expected to be
/// validated and merged already.
#[derive(Debug, Clone)]
pub struct OrderPlan {
    pub customer_id: UserId,
    pub lines: Vec<OrderLine>,
    pub amount_paid: f64,
    pub payment_method: Option<PaymentMethod>,
    pub pricing: Pricing,
    pub date: DateTime<Utc>,
    /// Deduct the ordered lines from the customer's cart in the same step.
    /// The commit fails if the cart no longer holds them.
    pub settles_cart: bool,
}

#[derive(Debug, Clone)]
pub struct CommittedOrder {
    pub order: Order,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Clone)]
pub struct PaymentPlan {
    pub order_id: OrderId,
    pub amount: f64,
    pub method: PaymentMethod,
    pub pricing: Pricing,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CommittedPayment {
    pub order: Order,
    pub payment: Payment,
    pub notification: Notification,
}

/// A single change to a customer's cart, applied under the write lock.
#[derive(Debug, Clone, PartialEq)]
pub enum CartEdit {
    Add { product_id: ProductId, quantity: u32 },
    Adjust { product_id: ProductId, delta: i64 },
    Remove { product_id: ProductId },
    Clear,
}

/// Document store for the grocery state.
///
/// Methods that touch more than one record (`commit_order`, `record_payment`,
/// `apply_discount`, `send_reminders`) apply all of their effects or none.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Drops all state and loads `seed`. Id counters carry on, so ids handed
    /// out before the reset are never reissued.
    async fn reset(&self, seed: Seed);

    async fn list_users(&self) -> Vec<User>;

    async fn get_user(&self, user_id: &str) -> Result<User, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<User, StoreError>;

    async fn list_products(&self) -> Vec<Product>;

    async fn get_product(&self, product_id: &str) -> Result<Product, StoreError>;

    /// Creates a product, or merges into an existing one with the same name
    /// when the draft carries no id.
    async fn add_product(&self, draft: ProductDraft) -> Result<Product, StoreError>;

    async fn update_product(&self, product_id: &str, draft: ProductDraft) -> Result<Product, StoreError>;

    /// Discounts a product and notifies every customer.
    async fn apply_discount(
        &self,
        product_id: &str,
        new_price: f64,
    ) -> Result<(Product, Vec<Notification>), StoreError>;

    async fn commit_order(&self, plan: OrderPlan) -> Result<CommittedOrder, StoreError>;

    async fn record_payment(&self, plan: PaymentPlan) -> Result<CommittedPayment, StoreError>;

    async fn get_order(&self, order_id: &str) -> Result<Order, StoreError>;

    async fn list_orders(&self) -> Vec<Order>;

    async fn list_payments(&self) -> Vec<Payment>;

    async fn append_notifications(&self, drafts: Vec<NotificationDraft>) -> Vec<Notification>;

    /// Notifications for one recipient, newest first.
    async fn notifications_for(&self, user_id: &str) -> Vec<Notification>;

    async fn mark_notification_read(&self, notification_id: &str) -> Result<Notification, StoreError>;

    /// Notifies every user with pending dues. Dues are left untouched.
    async fn send_reminders(&self, custom_message: Option<String>) -> Vec<Notification>;

    async fn get_cart(&self, customer_id: &str) -> Cart;

    /// Applies `edit` to the customer's cart atomically and returns the result.
    async fn edit_cart(&self, customer_id: &str, edit: CartEdit) -> Result<Cart, StoreError>;

    async fn advertisement(&self) -> String;

    async fn set_advertisement(&self, message: String);
}
