use chrono::Utc;
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::billing::{Pricing, merge_lines, validate_amount};
use crate::error::StoreError;
use crate::model::{Order, OrderLine, Payment, PaymentMethod};
use crate::notifier::Notifier;
use crate::storage::{OrderPlan, PaymentPlan, Storage};

/// Turns carts and manager bills into orders.
///
/// Validation that needs no state (line merging, amount checks) happens here;
/// everything that reads stock or dues runs inside one storage transaction.
#[derive(Clone)]
pub struct OrderEngine {
    storage: Arc<dyn Storage>,
    notifier: Notifier,
    pricing: Pricing,
}

impl OrderEngine {
    pub fn new(storage: Arc<dyn Storage>, notifier: Notifier, pricing: Pricing) -> Self {
        Self {
            storage,
            notifier,
            pricing,
        }
    }

    pub fn pricing(&self) -> Pricing {
        self.pricing
    }

    pub async fn place_order(
        &self,
        lines: &[OrderLine],
        customer_id: &str,
        amount_paid: f64,
        payment_method: Option<PaymentMethod>,
    ) -> Result<Order, StoreError> {
        self.submit(lines, customer_id, amount_paid, payment_method, false).await
    }

    /// Places an order from the customer's cart. The ordered lines leave the
    /// cart in the same transaction, so items added meanwhile stay behind and
    /// a failed order leaves the cart as it was.
    pub async fn checkout(
        &self,
        customer_id: &str,
        amount_paid: f64,
        payment_method: Option<PaymentMethod>,
    ) -> Result<Order, StoreError> {
        self.storage.get_user(customer_id).await?;
        let cart = self.storage.get_cart(customer_id).await;
        if cart.is_empty() {
            return Err(StoreError::invalid("cart is empty"));
        }

        self.submit(&cart.lines(), customer_id, amount_paid, payment_method, true)
            .await
    }

    async fn submit(
        &self,
        lines: &[OrderLine],
        customer_id: &str,
        amount_paid: f64,
        payment_method: Option<PaymentMethod>,
        settles_cart: bool,
    ) -> Result<Order, StoreError> {
        let started = Instant::now();
        debug!(customer_id, lines = lines.len(), amount_paid, settles_cart, "Placing order");

        let lines = merge_lines(lines)?;
        validate_amount(amount_paid, "amount paid")?;

        let plan = OrderPlan {
            customer_id: customer_id.to_string(),
            lines,
            amount_paid,
            payment_method,
            pricing: self.pricing,
            date: Utc::now(),
            settles_cart,
        };

        let committed = match self.storage.commit_order(plan).await {
            Ok(committed) => committed,
            Err(e) => {
                warn!(customer_id, error = %e, "Order rejected");
                return Err(e);
            }
        };
        let order = committed.order;

        counter!("grocer_orders_placed_total", "status" => order.status.to_string()).increment(1);
        histogram!("grocer_order_place_seconds").record(started.elapsed().as_secs_f64());
        info!(
            order_id = %order.id,
            customer_id,
            total = order.total,
            amount_paid = order.amount_paid,
            status = %order.status,
            "Order placed"
        );

        self.notifier.forward(&committed.notifications).await;
        Ok(order)
    }

    /// Records a follow-up payment against an order and reduces the
    /// customer's dues by the same amount.
    pub async fn record_payment(
        &self,
        order_id: &str,
        amount: f64,
        method: PaymentMethod,
    ) -> Result<Order, StoreError> {
        validate_amount(amount, "payment")?;
        if amount <= 0.0 {
            return Err(StoreError::invalid("payment must be greater than zero"));
        }

        let committed = self
            .storage
            .record_payment(PaymentPlan {
                order_id: order_id.to_string(),
                amount,
                method,
                pricing: self.pricing,
                date: Utc::now(),
            })
            .await?;

        info!(
            order_id,
            payment_id = %committed.payment.id,
            amount = committed.payment.amount,
            status = %committed.order.status,
            "Payment recorded"
        );
        self.notifier.forward(&[committed.notification]).await;
        Ok(committed.order)
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Order, StoreError> {
        self.storage.get_order(order_id).await
    }

    /// All orders, newest first.
    pub async fn list_orders(&self) -> Vec<Order> {
        let mut orders = self.storage.list_orders().await;
        orders.reverse();
        orders
    }

    pub async fn order_history(&self, customer_id: &str) -> Result<Vec<Order>, StoreError> {
        self.storage.get_user(customer_id).await?;
        Ok(self
            .list_orders()
            .await
            .into_iter()
            .filter(|order| order.customer_id == customer_id)
            .collect())
    }

    /// Payment ledger, newest first.
    pub async fn list_payments(&self) -> Vec<Payment> {
        let mut payments = self.storage.list_payments().await;
        payments.reverse();
        payments
    }
}
