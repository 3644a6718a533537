use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::*;
use crate::billing::{OrderTotals, classify_payment, dues_delta, exceeds, is_settled, round_money};
use crate::catalog;
use crate::error::StockShortage;

#[derive(Debug, Default)]
struct Sequences {
    product: u64,
    order: u64,
    notification: u64,
    payment: u64,
}

fn next_sequence(counter: &mut u64) -> u64 {
    *counter += 1;
    *counter
}

#[derive(Debug, Default)]
struct StoreData {
    users: HashMap<UserId, User>,
    products: HashMap<ProductId, Product>,
    orders: Vec<Order>,
    payments: Vec<Payment>,
    notifications: Vec<Notification>,
    carts: HashMap<UserId, Cart>,
    advertisement: String,
    sequences: Sequences,
}

impl StoreData {
    fn from_seed(seed: Seed) -> Self {
        Self {
            users: seed.users.into_iter().map(|user| (user.id.clone(), user)).collect(),
            products: seed.products.into_iter().map(|product| (product.id.clone(), product)).collect(),
            advertisement: seed.advertisement,
            ..Self::default()
        }
    }

    fn user(&self, user_id: &str) -> Result<&User, StoreError> {
        self.users.get(user_id).ok_or_else(|| StoreError::not_found("User", user_id))
    }

    fn product(&self, product_id: &str) -> Result<&Product, StoreError> {
        self.products
            .get(product_id)
            .ok_or_else(|| StoreError::not_found("Product", product_id))
    }

    fn new_product_id(&mut self) -> ProductId {
        // Seeded ids share the prefix, so skip any that are taken
        loop {
            let id = format!("p{}", next_sequence(&mut self.sequences.product));
            if !self.products.contains_key(&id) {
                return id;
            }
        }
    }

    fn new_order_id(&mut self) -> OrderId {
        format!("o{}", next_sequence(&mut self.sequences.order))
    }

    fn push_notification(&mut self, draft: NotificationDraft) -> Notification {
        let notification = Notification {
            id: format!("n{}", next_sequence(&mut self.sequences.notification)),
            user_id: draft.user_id,
            title: draft.title,
            message: draft.message,
            date: Utc::now(),
            order_id: draft.order_id,
            read: false,
        };
        self.notifications.push(notification.clone());
        notification
    }

    fn store_cart(&mut self, cart: Cart) {
        if cart.is_empty() {
            self.carts.remove(&cart.customer_id);
        } else {
            self.carts.insert(cart.customer_id.clone(), cart);
        }
    }

    /// Users sorted by name, so broadcasts happen in a stable order.
    fn users_by_name(&self) -> Vec<&User> {
        let mut users: Vec<&User> = self.users.values().collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        users
    }
}

/// In-process implementation of [`Storage`]. A single `RwLock` serializes all
/// writers, which makes each multi-record method one transaction.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    data: RwLock<StoreData>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(seed: Seed) -> Self {
        Self {
            data: RwLock::new(StoreData::from_seed(seed)),
        }
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn reset(&self, seed: Seed) {
        let mut data = self.data.write().await;
        let sequences = std::mem::take(&mut data.sequences);
        *data = StoreData {
            sequences,
            ..StoreData::from_seed(seed)
        };
        debug!("Storage reset with {} users and {} products", data.users.len(), data.products.len());
    }

    async fn list_users(&self) -> Vec<User> {
        let data = self.data.read().await;
        data.users_by_name().into_iter().cloned().collect()
    }

    async fn get_user(&self, user_id: &str) -> Result<User, StoreError> {
        self.data.read().await.user(user_id).cloned()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let email = email.trim();
        self.data
            .read()
            .await
            .users
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or_else(|| StoreError::not_found("User with email", email))
    }

    async fn list_products(&self) -> Vec<Product> {
        self.data.read().await.products.values().cloned().collect()
    }

    async fn get_product(&self, product_id: &str) -> Result<Product, StoreError> {
        self.data.read().await.product(product_id).cloned()
    }

    async fn add_product(&self, draft: ProductDraft) -> Result<Product, StoreError> {
        let mut data = self.data.write().await;

        let product = match draft.id.clone() {
            Some(id) if data.products.contains_key(&id) => {
                return Err(StoreError::invalid(format!("product {} already exists", id)));
            }
            Some(id) => catalog::create_product(id, draft)?,
            None => {
                let name = draft.name.trim().to_lowercase();
                let existing = data
                    .products
                    .values()
                    .find(|product| product.name.to_lowercase() == name)
                    .cloned();
                match existing {
                    Some(existing) => catalog::merge_restock(&existing, draft)?,
                    None => {
                        let id = data.new_product_id();
                        catalog::create_product(id, draft)?
                    }
                }
            }
        };

        data.products.insert(product.id.clone(), product.clone());
        Ok(product)
    }

    async fn update_product(&self, product_id: &str, draft: ProductDraft) -> Result<Product, StoreError> {
        let mut data = self.data.write().await;
        let product = catalog::edit_product(data.product(product_id)?, draft)?;
        data.products.insert(product.id.clone(), product.clone());
        Ok(product)
    }

    async fn apply_discount(
        &self,
        product_id: &str,
        new_price: f64,
    ) -> Result<(Product, Vec<Notification>), StoreError> {
        let mut data = self.data.write().await;

        let mut product = data.product(product_id)?.clone();
        let previous_price = product.apply_discount(new_price)?;

        let drafts: Vec<NotificationDraft> = data
            .users_by_name()
            .into_iter()
            .filter(|user| user.is_customer())
            .map(|user| NotificationDraft::price_drop(&user.id, &product, previous_price))
            .collect();

        data.products.insert(product.id.clone(), product.clone());
        let notifications = drafts.into_iter().map(|draft| data.push_notification(draft)).collect();
        Ok((product, notifications))
    }

    async fn commit_order(&self, plan: OrderPlan) -> Result<CommittedOrder, StoreError> {
        let mut data = self.data.write().await;

        // Validate and snapshot before touching anything
        let customer = data.user(&plan.customer_id)?.clone();
        let mut items = Vec::with_capacity(plan.lines.len());
        let mut shortages = Vec::new();
        for line in &plan.lines {
            let product = data.product(&line.product_id)?;
            if product.stock < line.quantity {
                shortages.push(StockShortage {
                    product_id: product.id.clone(),
                    requested: line.quantity,
                    available: product.stock,
                });
            }
            items.push(CartItem {
                product: product.clone(),
                quantity: line.quantity,
            });
        }
        if !shortages.is_empty() {
            return Err(StoreError::InsufficientStock(shortages));
        }
        let settled_cart = if plan.settles_cart {
            let mut cart = data.carts.get(&customer.id).cloned().unwrap_or_else(|| Cart::new(&customer.id));
            cart.settle(&plan.lines)?;
            Some(cart)
        } else {
            None
        };

        let totals = OrderTotals::compute(&items, &plan.pricing);
        let amount_paid = round_money(plan.amount_paid);
        let status = classify_payment(totals.total, amount_paid, plan.pricing.epsilon);
        let dues_increase = dues_delta(totals.total, amount_paid, status);

        let order = Order {
            id: data.new_order_id(),
            customer_id: customer.id.clone(),
            customer_name: customer.name.clone(),
            items,
            subtotal: totals.subtotal,
            tax: totals.tax,
            discount: totals.discount,
            total: totals.total,
            amount_paid,
            status,
            payment_method: plan.payment_method,
            date: plan.date,
        };

        for item in &order.items {
            if let Some(product) = data.products.get_mut(&item.product.id) {
                product.stock -= item.quantity;
            }
        }
        if let Some(customer) = data.users.get_mut(&order.customer_id) {
            customer.pending_dues = round_money(customer.pending_dues + dues_increase);
        }
        if let Some(cart) = settled_cart {
            data.store_cart(cart);
        }

        let drafts: Vec<NotificationDraft> = data
            .users_by_name()
            .into_iter()
            .filter(|user| user.is_manager())
            .map(|manager| NotificationDraft::new_order(&manager.id, &order))
            .collect();
        let notifications = drafts.into_iter().map(|draft| data.push_notification(draft)).collect();

        data.orders.push(order.clone());
        Ok(CommittedOrder { order, notifications })
    }

    async fn record_payment(&self, plan: PaymentPlan) -> Result<CommittedPayment, StoreError> {
        let mut data = self.data.write().await;

        let index = data
            .orders
            .iter()
            .position(|order| order.id == plan.order_id)
            .ok_or_else(|| StoreError::not_found("Order", plan.order_id.clone()))?;
        let mut order = data.orders[index].clone();
        let customer_dues = data.user(&order.customer_id)?.pending_dues;

        let amount = round_money(plan.amount);
        let outstanding = round_money(order.outstanding());
        let settled = is_settled(order.total, order.amount_paid, plan.pricing.epsilon);
        if order.status == PaymentStatus::Paid || settled {
            return Err(StoreError::invalid(format!("order {} is already paid", order.id)));
        }
        if exceeds(amount, outstanding, plan.pricing.epsilon) {
            return Err(StoreError::invalid(format!(
                "payment {:.2} exceeds the outstanding {:.2} on order {}",
                amount, outstanding, order.id
            )));
        }

        order.amount_paid = round_money(order.amount_paid + amount);
        order.status = classify_payment(order.total, order.amount_paid, plan.pricing.epsilon);
        if order.payment_method.is_none() {
            order.payment_method = Some(plan.method);
        }

        let payment = Payment {
            id: format!("t{}", next_sequence(&mut data.sequences.payment)),
            order_id: order.id.clone(),
            customer_id: order.customer_id.clone(),
            amount,
            method: plan.method,
            date: plan.date,
        };

        if let Some(customer) = data.users.get_mut(&order.customer_id) {
            customer.pending_dues = round_money((customer_dues - amount).max(0.0));
        }
        data.orders[index] = order.clone();
        data.payments.push(payment.clone());
        let notification = data.push_notification(NotificationDraft::payment_received(&order, amount));

        Ok(CommittedPayment {
            order,
            payment,
            notification,
        })
    }

    async fn get_order(&self, order_id: &str) -> Result<Order, StoreError> {
        self.data
            .read()
            .await
            .orders
            .iter()
            .find(|order| order.id == order_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Order", order_id))
    }

    async fn list_orders(&self) -> Vec<Order> {
        self.data.read().await.orders.clone()
    }

    async fn list_payments(&self) -> Vec<Payment> {
        self.data.read().await.payments.clone()
    }

    async fn append_notifications(&self, drafts: Vec<NotificationDraft>) -> Vec<Notification> {
        let mut data = self.data.write().await;
        drafts.into_iter().map(|draft| data.push_notification(draft)).collect()
    }

    async fn notifications_for(&self, user_id: &str) -> Vec<Notification> {
        self.data
            .read()
            .await
            .notifications
            .iter()
            .rev()
            .filter(|notification| notification.user_id == user_id)
            .cloned()
            .collect()
    }

    async fn mark_notification_read(&self, notification_id: &str) -> Result<Notification, StoreError> {
        let mut data = self.data.write().await;
        let notification = data
            .notifications
            .iter_mut()
            .find(|notification| notification.id == notification_id)
            .ok_or_else(|| StoreError::not_found("Notification", notification_id))?;
        notification.read = true;
        Ok(notification.clone())
    }

    async fn send_reminders(&self, custom_message: Option<String>) -> Vec<Notification> {
        let mut data = self.data.write().await;
        let drafts: Vec<NotificationDraft> = data
            .users_by_name()
            .into_iter()
            .filter(|user| user.has_dues())
            .map(|user| NotificationDraft::dues_reminder(user, custom_message.as_deref()))
            .collect();
        drafts.into_iter().map(|draft| data.push_notification(draft)).collect()
    }

    async fn get_cart(&self, customer_id: &str) -> Cart {
        self.data
            .read()
            .await
            .carts
            .get(customer_id)
            .cloned()
            .unwrap_or_else(|| Cart::new(customer_id))
    }

    async fn edit_cart(&self, customer_id: &str, edit: CartEdit) -> Result<Cart, StoreError> {
        let mut data = self.data.write().await;
        data.user(customer_id)?;

        let mut cart = data.carts.get(customer_id).cloned().unwrap_or_else(|| Cart::new(customer_id));
        match edit {
            CartEdit::Add { product_id, quantity } => {
                let product = data.product(&product_id)?.clone();
                cart.add(product, quantity)?;
            }
            CartEdit::Adjust { product_id, delta } => {
                cart.update_quantity(&product_id, delta)?;
            }
            CartEdit::Remove { product_id } => {
                if !cart.remove(&product_id) {
                    return Err(StoreError::not_found("Cart item", product_id));
                }
            }
            CartEdit::Clear => cart.items.clear(),
        }

        data.store_cart(cart.clone());
        Ok(cart)
    }

    async fn advertisement(&self) -> String {
        self.data.read().await.advertisement.clone()
    }

    async fn set_advertisement(&self, message: String) {
        self.data.write().await.advertisement = message;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, name: &str, role: UserRole, dues: f64) -> User {
        User {
            id: id.to_string(),
            name: name.to_string(),
            email: format!("{}@store.com", id),
            phone: "9999999999".to_string(),
            role,
            pending_dues: dues,
            device_token: None,
        }
    }

    fn product(id: &str, price: f64, stock: u32) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Product {}", id),
            category: "Test".to_string(),
            price,
            original_price: None,
            stock,
            unit: "pc".to_string(),
            description: None,
            image_url: None,
        }
    }

    fn seeded() -> InMemoryStorage {
        InMemoryStorage::with_seed(Seed {
            users: vec![
                user("u1", "Admin Manager", UserRole::Manager, 0.0),
                user("u2", "John Doe", UserRole::Customer, 0.0),
            ],
            products: vec![product("p1", 60.0, 5), product("p3", 120.0, 1)],
            advertisement: "Fresh deals".to_string(),
        })
    }

    fn plan(lines: Vec<(&str, u32)>, amount_paid: f64) -> OrderPlan {
        OrderPlan {
            customer_id: "u2".to_string(),
            lines: lines
                .into_iter()
                .map(|(id, quantity)| OrderLine { product_id: id.to_string(), quantity })
                .collect(),
            amount_paid,
            payment_method: Some(PaymentMethod::Cash),
            pricing: Pricing::default(),
            date: Utc::now(),
            settles_cart: false,
        }
    }

    fn add(product_id: &str, quantity: u32) -> CartEdit {
        CartEdit::Add { product_id: product_id.to_string(), quantity }
    }

    #[tokio::test]
    async fn test_generated_product_ids_skip_seeded_ones() {
        let storage = seeded();

        let product = storage
            .add_product(ProductDraft {
                name: "Green Tea".to_string(),
                price: 150.0,
                stock: 3,
                ..ProductDraft::default()
            })
            .await
            .unwrap();

        assert_eq!(product.id, "p2");
    }

    #[tokio::test]
    async fn test_add_product_with_taken_id_is_rejected() {
        let storage = seeded();
        let result = storage
            .add_product(ProductDraft {
                id: Some("p1".to_string()),
                name: "Duplicate".to_string(),
                price: 10.0,
                ..ProductDraft::default()
            })
            .await;
        assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_shortage_leaves_state_untouched() {
        let storage = seeded();

        let result = storage.commit_order(plan(vec![("p1", 2), ("p3", 2)], 0.0)).await;

        match result {
            Err(StoreError::InsufficientStock(shortages)) => {
                assert_eq!(shortages.len(), 1);
                assert_eq!(shortages[0].product_id, "p3");
            }
            other => panic!("expected insufficient stock, got {:?}", other),
        }
        assert_eq!(storage.get_product("p1").await.unwrap().stock, 5);
        assert_eq!(storage.get_user("u2").await.unwrap().pending_dues, 0.0);
        assert!(storage.list_orders().await.is_empty());
        assert!(storage.notifications_for("u1").await.is_empty());
    }

    #[tokio::test]
    async fn test_order_ids_are_never_reused() {
        let storage = seeded();

        let first = storage.commit_order(plan(vec![("p1", 1)], 60.0)).await.unwrap();
        let second = storage.commit_order(plan(vec![("p1", 1)], 60.0)).await.unwrap();

        assert_ne!(first.order.id, second.order.id);
    }

    #[tokio::test]
    async fn test_notifications_are_newest_first_and_markable() {
        let storage = seeded();
        storage
            .append_notifications(vec![
                NotificationDraft { user_id: "u2".to_string(), title: "A".to_string(), message: "first".to_string(), order_id: None },
                NotificationDraft { user_id: "u2".to_string(), title: "B".to_string(), message: "second".to_string(), order_id: None },
            ])
            .await;

        let notifications = storage.notifications_for("u2").await;
        assert_eq!(notifications[0].message, "second");

        let read = storage.mark_notification_read(&notifications[1].id).await.unwrap();
        assert!(read.read);
        assert!(storage.mark_notification_read("n999").await.is_err());
    }

    #[tokio::test]
    async fn test_empty_cart_is_dropped_and_reset_restores_seed() {
        let storage = seeded();
        storage.edit_cart("u2", add("p1", 1)).await.unwrap();
        storage.set_advertisement("Changed".to_string()).await;

        storage.edit_cart("u2", CartEdit::Clear).await.unwrap();
        assert!(storage.get_cart("u2").await.is_empty());

        storage
            .reset(Seed { advertisement: "Reset".to_string(), ..Seed::default() })
            .await;
        assert_eq!(storage.advertisement().await, "Reset");
        assert!(storage.list_users().await.is_empty());
    }

    #[tokio::test]
    async fn test_cart_edits_check_user_and_product() {
        let storage = seeded();

        assert!(matches!(storage.edit_cart("u404", add("p1", 1)).await, Err(StoreError::NotFound { .. })));
        assert!(matches!(storage.edit_cart("u2", add("p404", 1)).await, Err(StoreError::NotFound { .. })));
        assert!(matches!(
            storage.edit_cart("u2", CartEdit::Remove { product_id: "p1".to_string() }).await,
            Err(StoreError::NotFound { .. })
        ));

        storage.edit_cart("u2", add("p1", 2)).await.unwrap();
        let cart = storage
            .edit_cart("u2", CartEdit::Adjust { product_id: "p1".to_string(), delta: -5 })
            .await
            .unwrap();
        assert_eq!(cart.items[0].quantity, 1);
    }

    #[tokio::test]
    async fn test_cart_checkout_keeps_items_added_after_the_snapshot() {
        let storage = seeded();
        storage.edit_cart("u2", add("p1", 2)).await.unwrap();
        let snapshot = storage.get_cart("u2").await;
        storage.edit_cart("u2", add("p1", 1)).await.unwrap();
        storage.edit_cart("u2", add("p3", 1)).await.unwrap();

        let mut from_cart = plan(vec![], 0.0);
        from_cart.lines = snapshot.lines();
        from_cart.settles_cart = true;
        storage.commit_order(from_cart).await.unwrap();

        let cart = storage.get_cart("u2").await;
        assert_eq!(cart.lines(), vec![
            OrderLine { product_id: "p1".to_string(), quantity: 1 },
            OrderLine { product_id: "p3".to_string(), quantity: 1 },
        ]);
    }

    #[tokio::test]
    async fn test_second_checkout_of_the_same_cart_is_rejected() {
        let storage = seeded();
        storage.edit_cart("u2", add("p1", 2)).await.unwrap();
        let snapshot = storage.get_cart("u2").await;

        let mut from_cart = plan(vec![], 0.0);
        from_cart.lines = snapshot.lines();
        from_cart.settles_cart = true;
        storage.commit_order(from_cart.clone()).await.unwrap();
        let again = storage.commit_order(from_cart).await;

        assert!(matches!(again, Err(StoreError::InvalidArgument(_))));
        assert_eq!(storage.list_orders().await.len(), 1);
        assert_eq!(storage.get_product("p1").await.unwrap().stock, 3);
    }

    #[tokio::test]
    async fn test_one_cent_short_order_is_paid_and_rejects_more_payments() {
        let storage = seeded();
        let committed = storage.commit_order(plan(vec![("p1", 1)], 59.99)).await.unwrap();

        assert_eq!(committed.order.status, PaymentStatus::Paid);
        assert_eq!(storage.get_user("u2").await.unwrap().pending_dues, 0.0);
        let result = storage
            .record_payment(PaymentPlan {
                order_id: committed.order.id.clone(),
                amount: 0.01,
                method: PaymentMethod::Cash,
                pricing: Pricing::default(),
                date: Utc::now(),
            })
            .await;
        assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_reset_does_not_reuse_ids() {
        let storage = seeded();
        let before = storage.commit_order(plan(vec![("p1", 1)], 60.0)).await.unwrap();

        storage
            .reset(Seed {
                users: vec![
                    user("u1", "Admin Manager", UserRole::Manager, 0.0),
                    user("u2", "John Doe", UserRole::Customer, 0.0),
                ],
                products: vec![product("p1", 60.0, 5)],
                advertisement: String::new(),
            })
            .await;
        let after = storage.commit_order(plan(vec![("p1", 1)], 60.0)).await.unwrap();

        assert_ne!(before.order.id, after.order.id);
        assert_ne!(before.notifications[0].id, after.notifications[0].id);
    }
}
