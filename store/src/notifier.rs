use async_trait::async_trait;
use metrics::counter;
use serde_json::json;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::model::{Notification, NotificationDraft, Order, Product, User};
use crate::storage::Storage;

pub const NEW_ORDER_TITLE: &str = "New Order";
pub const PRICE_DROP_TITLE: &str = "Price Drop!";
pub const REMINDER_TITLE: &str = "Payment Reminder";
pub const PAYMENT_RECEIVED_TITLE: &str = "Payment Received";

impl NotificationDraft {
    /// Manager alert for a freshly placed order. The order id is carried as a
    /// structured reference as well as in the text.
    pub fn new_order(manager_id: &str, order: &Order) -> Self {
        Self {
            user_id: manager_id.to_string(),
            title: NEW_ORDER_TITLE.to_string(),
            message: format!(
                "Order #{} placed by {} for Rs. {:.2}",
                order.id, order.customer_name, order.total
            ),
            order_id: Some(order.id.clone()),
        }
    }

    pub fn price_drop(customer_id: &str, product: &Product, previous_price: f64) -> Self {
        Self {
            user_id: customer_id.to_string(),
            title: PRICE_DROP_TITLE.to_string(),
            message: format!(
                "{} is now Rs. {:.2} (was Rs. {:.2}). Grab it while stocks last!",
                product.name, product.price, previous_price
            ),
            order_id: None,
        }
    }

    /// Reminder for a customer with dues. A blank custom message falls back to
    /// the generated one.
    pub fn dues_reminder(user: &User, custom_message: Option<&str>) -> Self {
        let message = match custom_message.map(str::trim).filter(|m| !m.is_empty()) {
            Some(custom) => custom.to_string(),
            None => format!(
                "Dear {}, you have pending dues of Rs. {:.2}. Please clear them at your earliest convenience.",
                user.name, user.pending_dues
            ),
        };
        Self {
            user_id: user.id.clone(),
            title: REMINDER_TITLE.to_string(),
            message,
            order_id: None,
        }
    }

    pub fn payment_received(order: &Order, amount: f64) -> Self {
        Self {
            user_id: order.customer_id.clone(),
            title: PAYMENT_RECEIVED_TITLE.to_string(),
            message: format!(
                "Received Rs. {:.2} for Order #{}. Order status: {}",
                amount, order.id, order.status
            ),
            order_id: Some(order.id.clone()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("push request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("push provider rejected the message with status {0}")]
    Rejected(u16),
}

/// Delivery of a push message to one device.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushProvider: Send + Sync {
    async fn send(&self, token: &str, title: &str, body: &str) -> Result<(), PushError>;
}

fn token_prefix(token: &str) -> &str {
    token.get(..10).unwrap_or(token)
}

/// Used when no provider is configured: logs the message and reports success.
#[derive(Debug, Default, Clone)]
pub struct LoggingPushProvider;

#[async_trait]
impl PushProvider for LoggingPushProvider {
    async fn send(&self, token: &str, title: &str, body: &str) -> Result<(), PushError> {
        info!(
            "[Mock Notification] To: {}... | Title: {} | Body: {}",
            token_prefix(token),
            title,
            body
        );
        Ok(())
    }
}

/// Posts messages to an FCM-style HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpPushProvider {
    client: reqwest::Client,
    endpoint: String,
    server_key: String,
}

impl HttpPushProvider {
    pub fn new(endpoint: String, server_key: String, timeout: Duration) -> Result<Self, PushError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            server_key,
        })
    }
}

#[async_trait]
impl PushProvider for HttpPushProvider {
    async fn send(&self, token: &str, title: &str, body: &str) -> Result<(), PushError> {
        let message = json!({
            "message": {
                "token": token,
                "notification": { "title": title, "body": body },
                "android": { "priority": "high", "notification": { "sound": "default" } },
                "apns": { "payload": { "aps": { "sound": "default" } } }
            }
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.server_key)
            .json(&message)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PushError::Rejected(response.status().as_u16()));
        }
        debug!("Notification sent to {}...", token_prefix(token));
        Ok(())
    }
}

/// Sends one push, bounded by `timeout`. Failures are logged and reported as
/// `false`; they never propagate.
pub async fn send_push(
    provider: Arc<dyn PushProvider>,
    timeout: Duration,
    token: &str,
    title: &str,
    body: &str,
) -> bool {
    match tokio::time::timeout(timeout, provider.send(token, title, body)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            counter!("grocer_push_failures_total").increment(1);
            warn!(error = %e, "Failed to send push notification to {}...", token_prefix(token));
            false
        }
        Err(_) => {
            counter!("grocer_push_failures_total").increment(1);
            warn!("Push notification to {}... timed out after {:?}", token_prefix(token), timeout);
            false
        }
    }
}

/// In-app notification log plus fire-and-forget push forwarding.
#[derive(Clone)]
pub struct Notifier {
    storage: Arc<dyn Storage>,
    push: Arc<dyn PushProvider>,
    timeout: Duration,
}

impl Notifier {
    pub fn new(storage: Arc<dyn Storage>, push: Arc<dyn PushProvider>, timeout: Duration) -> Self {
        Self {
            storage,
            push,
            timeout,
        }
    }

    /// Appends the drafts to the log and forwards them as pushes.
    pub async fn notify(&self, drafts: Vec<NotificationDraft>) -> Vec<Notification> {
        let notifications = self.storage.append_notifications(drafts).await;
        self.forward(&notifications).await;
        notifications
    }

    /// Spawns one push per notification whose recipient has a device token.
    /// The returned handles may be dropped; the pushes keep running.
    pub async fn forward(&self, notifications: &[Notification]) -> Vec<JoinHandle<bool>> {
        if notifications.is_empty() {
            return Vec::new();
        }

        let tokens: HashMap<String, String> = self
            .storage
            .list_users()
            .await
            .into_iter()
            .filter_map(|user| user.device_token.map(|token| (user.id, token)))
            .collect();

        notifications
            .iter()
            .filter_map(|notification| {
                let token = tokens.get(&notification.user_id)?.clone();
                let provider = self.push.clone();
                let timeout = self.timeout;
                let title = notification.title.clone();
                let body = notification.message.clone();
                Some(tokio::spawn(async move {
                    send_push(provider, timeout, &token, &title, &body).await
                }))
            })
            .collect()
    }

    /// Sends a reminder to every user with pending dues; returns how many
    /// were notified.
    pub async fn send_reminders(&self, custom_message: Option<String>) -> usize {
        let notifications = self.storage.send_reminders(custom_message).await;
        info!("Sent dues reminders to {} customers", notifications.len());
        self.forward(&notifications).await;
        notifications.len()
    }

    pub async fn notifications_for(&self, user_id: &str) -> Result<Vec<Notification>, StoreError> {
        self.storage.get_user(user_id).await?;
        Ok(self.storage.notifications_for(user_id).await)
    }

    pub async fn mark_read(&self, notification_id: &str) -> Result<Notification, StoreError> {
        self.storage.mark_notification_read(notification_id).await
    }
}
