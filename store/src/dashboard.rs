use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::billing::round_money;
use crate::error::StoreError;
use crate::insights::InsightProvider;
use crate::model::Notification;
use crate::storage::Storage;

const RECENT_ORDER_NOTIFICATIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySales {
    /// `YYYY-MM-DD` in UTC.
    pub date: String,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_revenue: f64,
    pub pending_dues: f64,
    pub order_count: usize,
    pub sales_by_date: Vec<DailySales>,
    pub recent_order_notifications: Vec<Notification>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesInsight {
    pub text: String,
    /// True when the provider failed and a previous answer was reused.
    pub cached: bool,
}

#[derive(Clone)]
pub struct Dashboard {
    storage: Arc<dyn Storage>,
    insights: Arc<dyn InsightProvider>,
    insight_timeout: Duration,
    last_insight: Arc<Mutex<Option<String>>>,
}

impl Dashboard {
    pub fn new(storage: Arc<dyn Storage>, insights: Arc<dyn InsightProvider>, insight_timeout: Duration) -> Self {
        Self {
            storage,
            insights,
            insight_timeout,
            last_insight: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn stats(&self, manager_id: &str) -> Result<DashboardStats, StoreError> {
        let manager = self.storage.get_user(manager_id).await?;
        if !manager.is_manager() {
            return Err(StoreError::invalid(format!("{} is not a manager", manager_id)));
        }

        let orders = self.storage.list_orders().await;
        let users = self.storage.list_users().await;

        let mut by_date: BTreeMap<String, f64> = BTreeMap::new();
        for order in &orders {
            *by_date.entry(order.date.format("%Y-%m-%d").to_string()).or_default() += order.total;
        }

        let recent_order_notifications = self
            .storage
            .notifications_for(manager_id)
            .await
            .into_iter()
            .filter(|notification| notification.order_id.is_some())
            .take(RECENT_ORDER_NOTIFICATIONS)
            .collect();

        Ok(DashboardStats {
            total_revenue: round_money(orders.iter().map(|order| order.total).sum()),
            pending_dues: round_money(users.iter().map(|user| user.pending_dues).sum()),
            order_count: orders.len(),
            sales_by_date: by_date
                .into_iter()
                .map(|(date, total)| DailySales {
                    date,
                    total: round_money(total),
                })
                .collect(),
            recent_order_notifications,
        })
    }

    /// Best-effort sales commentary. Falls back to the last successful answer,
    /// or empty text.
    pub async fn insight(&self) -> SalesInsight {
        let orders = self.storage.list_orders().await;
        let result = tokio::time::timeout(self.insight_timeout, self.insights.analyze_sales_trends(&orders)).await;

        let mut last = self.last_insight.lock().await;
        match result {
            Ok(Ok(text)) => {
                *last = Some(text.clone());
                SalesInsight { text, cached: false }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Sales insight failed");
                Self::fallback(&last)
            }
            Err(_) => {
                warn!("Sales insight timed out after {:?}", self.insight_timeout);
                Self::fallback(&last)
            }
        }
    }

    fn fallback(last: &Option<String>) -> SalesInsight {
        match last {
            Some(text) => SalesInsight {
                text: text.clone(),
                cached: true,
            },
            None => SalesInsight {
                text: String::new(),
                cached: false,
            },
        }
    }

    /// Suggested copy for a new catalog entry. Empty when the provider fails.
    pub async fn product_description(&self, name: &str, category: &str) -> String {
        match tokio::time::timeout(
            self.insight_timeout,
            self.insights.generate_product_description(name, category),
        )
        .await
        {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(error = %e, name, "Product description failed");
                String::new()
            }
            Err(_) => {
                warn!(name, "Product description timed out after {:?}", self.insight_timeout);
                String::new()
            }
        }
    }

    pub async fn advertisement(&self) -> String {
        self.storage.advertisement().await
    }

    pub async fn set_advertisement(&self, message: String) -> String {
        let message = message.trim().to_string();
        info!("Advertisement updated");
        self.storage.set_advertisement(message.clone()).await;
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insights::{InsightError, MockInsightProvider, NoopInsightProvider};
    use crate::model::{NotificationDraft, User, UserRole};
    use crate::storage::{InMemoryStorage, Seed};

    fn user(id: &str, role: UserRole, dues: f64) -> User {
        User {
            id: id.to_string(),
            name: format!("User {}", id),
            email: format!("{}@store.com", id),
            phone: "9999999999".to_string(),
            role,
            pending_dues: dues,
            device_token: None,
        }
    }

    fn storage() -> Arc<dyn Storage> {
        Arc::new(InMemoryStorage::with_seed(Seed {
            users: vec![
                user("u1", UserRole::Manager, 0.0),
                user("u2", UserRole::Customer, 3500.0),
                user("u6", UserRole::Customer, 120.5),
            ],
            products: vec![],
            advertisement: "Fresh mangoes".to_string(),
        }))
    }

    #[tokio::test]
    async fn test_stats_without_orders() {
        let dashboard = Dashboard::new(storage(), Arc::new(NoopInsightProvider), Duration::from_millis(50));

        let stats = dashboard.stats("u1").await.unwrap();

        assert_eq!(stats.total_revenue, 0.0);
        assert_eq!(stats.pending_dues, 3620.5);
        assert_eq!(stats.order_count, 0);
        assert!(stats.sales_by_date.is_empty());
    }

    #[tokio::test]
    async fn test_stats_only_for_managers() {
        let dashboard = Dashboard::new(storage(), Arc::new(NoopInsightProvider), Duration::from_millis(50));
        assert!(matches!(dashboard.stats("u2").await, Err(StoreError::InvalidArgument(_))));
        assert!(matches!(dashboard.stats("u404").await, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_recent_notifications_keep_order_alerts_only() {
        let storage = storage();
        let mut drafts: Vec<NotificationDraft> = (1..=7)
            .map(|n| NotificationDraft {
                user_id: "u1".to_string(),
                title: "New Order".to_string(),
                message: format!("Order #o{}", n),
                order_id: Some(format!("o{}", n)),
            })
            .collect();
        drafts.push(NotificationDraft {
            user_id: "u1".to_string(),
            title: "Note".to_string(),
            message: "Not an order".to_string(),
            order_id: None,
        });
        storage.append_notifications(drafts).await;
        let dashboard = Dashboard::new(storage, Arc::new(NoopInsightProvider), Duration::from_millis(50));

        let stats = dashboard.stats("u1").await.unwrap();

        assert_eq!(stats.recent_order_notifications.len(), 5);
        assert_eq!(stats.recent_order_notifications[0].order_id.as_deref(), Some("o7"));
    }

    #[tokio::test]
    async fn test_insight_falls_back_to_last_success() {
        let mut provider = MockInsightProvider::new();
        let mut calls = 0;
        provider.expect_analyze_sales_trends().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Ok("Dairy is trending".to_string())
            } else {
                Err(InsightError::EmptyResponse)
            }
        });
        let dashboard = Dashboard::new(storage(), Arc::new(provider), Duration::from_secs(1));

        let first = dashboard.insight().await;
        let second = dashboard.insight().await;

        assert_eq!(first, SalesInsight { text: "Dairy is trending".to_string(), cached: false });
        assert_eq!(second, SalesInsight { text: "Dairy is trending".to_string(), cached: true });
    }

    #[tokio::test]
    async fn test_insight_failure_without_history_is_empty() {
        let mut provider = MockInsightProvider::new();
        provider
            .expect_analyze_sales_trends()
            .returning(|_| Err(InsightError::Rejected(500)));
        let dashboard = Dashboard::new(storage(), Arc::new(provider), Duration::from_secs(1));

        assert_eq!(dashboard.insight().await.text, "");
    }

    #[tokio::test]
    async fn test_slow_description_times_out_to_empty() {
        struct SlowProvider;

        #[async_trait::async_trait]
        impl InsightProvider for SlowProvider {
            async fn analyze_sales_trends(&self, _orders: &[crate::model::Order]) -> Result<String, InsightError> {
                Ok(String::new())
            }

            async fn generate_product_description(&self, _name: &str, _category: &str) -> Result<String, InsightError> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok("too late".to_string())
            }
        }

        let dashboard = Dashboard::new(storage(), Arc::new(SlowProvider), Duration::from_millis(20));

        assert_eq!(dashboard.product_description("Tea", "Drinks").await, "");
    }

    #[tokio::test]
    async fn test_advertisement_roundtrip() {
        let dashboard = Dashboard::new(storage(), Arc::new(NoopInsightProvider), Duration::from_millis(50));
        assert_eq!(dashboard.advertisement().await, "Fresh mangoes");

        dashboard.set_advertisement("  Weekend sale  ".to_string()).await;

        assert_eq!(dashboard.advertisement().await, "Weekend sale");
    }
}
