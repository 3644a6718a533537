//! Order arithmetic: totals, payment status and dues.
//!
//! Everything here is pure so the storage layer can run it while holding
//! its write lock.

use common::config::{CommonConfig, DEFAULT_CURRENCY_EPSILON};

use crate::error::StoreError;
use crate::model::{CartItem, OrderLine, PaymentStatus};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub tax_rate: f64,
    /// Rounding tolerance used when comparing currency amounts.
    pub epsilon: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            tax_rate: 0.0,
            epsilon: DEFAULT_CURRENCY_EPSILON,
        }
    }
}

impl Pricing {
    pub fn from_config(config: &CommonConfig) -> Self {
        Self {
            tax_rate: config.tax_rate,
            epsilon: config.currency_epsilon,
        }
    }

    pub fn with_tax_rate(tax_rate: f64) -> Self {
        Self {
            tax_rate,
            ..Self::default()
        }
    }
}

/// Rounds to whole cents.
pub fn round_money(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// True when what is left to pay is within `epsilon`. Compared in whole cents
/// so `100.00 - 99.99` counts as one cent.
pub fn is_settled(total: f64, amount_paid: f64, epsilon: f64) -> bool {
    to_cents(total - amount_paid) <= to_cents(epsilon)
}

/// True when `amount` is more than `outstanding` plus `epsilon`, in whole cents.
pub fn exceeds(amount: f64, outstanding: f64, epsilon: f64) -> bool {
    to_cents(amount) > to_cents(outstanding) + to_cents(epsilon)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderTotals {
    pub subtotal: f64,
    pub tax: f64,
    pub discount: f64,
    pub total: f64,
}

impl OrderTotals {
    pub fn compute(items: &[CartItem], pricing: &Pricing) -> Self {
        let subtotal = round_money(items.iter().map(CartItem::line_total).sum());
        let tax = round_money(subtotal * pricing.tax_rate);
        // No coupon logic yet
        let discount = 0.0;
        let total = round_money(subtotal + tax - discount);

        Self {
            subtotal,
            tax,
            discount,
            total,
        }
    }
}

pub fn classify_payment(total: f64, amount_paid: f64, epsilon: f64) -> PaymentStatus {
    if is_settled(total, amount_paid, epsilon) {
        PaymentStatus::Paid
    } else if amount_paid <= 0.0 {
        PaymentStatus::Pending
    } else {
        PaymentStatus::Partial
    }
}

/// How much an order adds to the customer's dues. Paid orders and
/// overpayments add nothing.
pub fn dues_delta(total: f64, amount_paid: f64, status: PaymentStatus) -> f64 {
    match status {
        PaymentStatus::Paid => 0.0,
        PaymentStatus::Partial | PaymentStatus::Pending => round_money((total - amount_paid).max(0.0)),
    }
}

pub fn validate_amount(amount: f64, what: &str) -> Result<(), StoreError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(StoreError::invalid(format!("{} must be a non-negative amount, got {}", what, amount)));
    }
    Ok(())
}

/// Validates requested lines and merges repeated products so each product is
/// decremented once. First-seen order is kept.
pub fn merge_lines(lines: &[OrderLine]) -> Result<Vec<OrderLine>, StoreError> {
    if lines.is_empty() {
        return Err(StoreError::invalid("an order needs at least one item"));
    }

    let mut merged: Vec<OrderLine> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity == 0 {
            return Err(StoreError::invalid(format!(
                "quantity for {} must be positive",
                line.product_id
            )));
        }
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.checked_add(line.quantity).ok_or_else(|| {
                    StoreError::invalid(format!("quantity for {} is too large", line.product_id))
                })?;
            }
            None => merged.push(line.clone()),
        }
    }
    Ok(merged)
}
