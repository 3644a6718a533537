use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::billing::round_money;
use crate::error::StoreError;
use crate::model::{CartItem, OrderLine, Product, UserId};
use crate::storage::{CartEdit, Storage};

/// A customer's cart. Each product appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub customer_id: UserId,
    pub items: Vec<CartItem>,
}

impl Cart {
    pub fn new(customer_id: impl Into<UserId>) -> Self {
        Self {
            customer_id: customer_id.into(),
            items: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Adds `quantity` of a product, incrementing an existing line instead of
    /// duplicating it.
    pub fn add(&mut self, product: Product, quantity: u32) -> Result<(), StoreError> {
        if quantity == 0 {
            return Err(StoreError::invalid("quantity must be positive"));
        }
        match self.items.iter_mut().find(|item| item.product.id == product.id) {
            Some(item) => {
                item.quantity = item.quantity.saturating_add(quantity);
                item.product = product;
            }
            None => self.items.push(CartItem { product, quantity }),
        }
        Ok(())
    }

    /// Moves a line's quantity by `delta`, never below one.
    pub fn update_quantity(&mut self, product_id: &str, delta: i64) -> Result<&CartItem, StoreError> {
        let item = self
            .items
            .iter_mut()
            .find(|item| item.product.id == product_id)
            .ok_or_else(|| StoreError::not_found("Cart item", product_id))?;

        let updated = (i64::from(item.quantity) + delta).clamp(1, i64::from(u32::MAX));
        item.quantity = u32::try_from(updated).unwrap_or(u32::MAX);
        Ok(item)
    }

    pub fn remove(&mut self, product_id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.product.id != product_id);
        self.items.len() != before
    }

    /// Takes ordered lines out of the cart, dropping lines that reach zero.
    /// Nothing changes unless every line is fully covered.
    pub fn settle(&mut self, lines: &[OrderLine]) -> Result<(), StoreError> {
        for line in lines {
            let held = self
                .items
                .iter()
                .find(|item| item.product.id == line.product_id)
                .map_or(0, |item| item.quantity);
            if held < line.quantity {
                return Err(StoreError::invalid(format!(
                    "cart of {} no longer holds {} x {}",
                    self.customer_id, line.quantity, line.product_id
                )));
            }
        }
        for line in lines {
            if let Some(item) = self.items.iter_mut().find(|item| item.product.id == line.product_id) {
                item.quantity -= line.quantity;
            }
        }
        self.items.retain(|item| item.quantity > 0);
        Ok(())
    }

    pub fn subtotal(&self) -> f64 {
        round_money(self.items.iter().map(CartItem::line_total).sum())
    }

    pub fn lines(&self) -> Vec<OrderLine> {
        self.items
            .iter()
            .map(|item| OrderLine {
                product_id: item.product.id.clone(),
                quantity: item.quantity,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    #[serde(flatten)]
    pub cart: Cart,
    pub subtotal: f64,
}

impl From<Cart> for CartView {
    fn from(cart: Cart) -> Self {
        let subtotal = cart.subtotal();
        Self { cart, subtotal }
    }
}

#[derive(Clone)]
pub struct CartService {
    storage: Arc<dyn Storage>,
}

impl CartService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn cart(&self, customer_id: &str) -> Result<Cart, StoreError> {
        self.storage.get_user(customer_id).await?;
        Ok(self.storage.get_cart(customer_id).await)
    }

    pub async fn add(&self, customer_id: &str, product_id: &str, quantity: u32) -> Result<Cart, StoreError> {
        debug!(customer_id, product_id, quantity, "Adding to cart");
        let edit = CartEdit::Add {
            product_id: product_id.to_string(),
            quantity,
        };
        self.storage.edit_cart(customer_id, edit).await
    }

    pub async fn update_quantity(&self, customer_id: &str, product_id: &str, delta: i64) -> Result<Cart, StoreError> {
        let edit = CartEdit::Adjust {
            product_id: product_id.to_string(),
            delta,
        };
        self.storage.edit_cart(customer_id, edit).await
    }

    pub async fn remove(&self, customer_id: &str, product_id: &str) -> Result<Cart, StoreError> {
        let edit = CartEdit::Remove {
            product_id: product_id.to_string(),
        };
        self.storage.edit_cart(customer_id, edit).await
    }

    pub async fn clear(&self, customer_id: &str) -> Result<(), StoreError> {
        self.storage.edit_cart(customer_id, CartEdit::Clear).await?;
        info!(customer_id, "Cleared cart");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, price: f64) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Product {}", id),
            category: "Test".to_string(),
            price,
            original_price: None,
            stock: 10,
            unit: "pc".to_string(),
            description: None,
            image_url: None,
        }
    }

    #[test]
    fn test_adding_same_product_increments_quantity() {
        let mut cart = Cart::new("u2");

        cart.add(product("p1", 60.0), 1).unwrap();
        cart.add(product("p1", 60.0), 2).unwrap();
        cart.add(product("p3", 120.0), 1).unwrap();

        assert_eq!(cart.items.len(), 2);
        assert_eq!(cart.items[0].quantity, 3);
        assert_eq!(cart.subtotal(), 300.0);
    }

    #[test]
    fn test_update_quantity_never_drops_below_one() {
        let mut cart = Cart::new("u2");
        cart.add(product("p1", 60.0), 2).unwrap();

        let item = cart.update_quantity("p1", -5).unwrap();
        assert_eq!(item.quantity, 1);

        let item = cart.update_quantity("p1", 4).unwrap();
        assert_eq!(item.quantity, 5);
    }

    #[test]
    fn test_update_unknown_line_is_not_found() {
        let mut cart = Cart::new("u2");
        assert!(matches!(
            cart.update_quantity("p9", 1),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_remove_and_lines() {
        let mut cart = Cart::new("u2");
        cart.add(product("p1", 60.0), 2).unwrap();
        cart.add(product("p4", 850.0), 1).unwrap();

        assert!(cart.remove("p1"));
        assert!(!cart.remove("p1"));
        assert_eq!(
            cart.lines(),
            vec![OrderLine { product_id: "p4".to_string(), quantity: 1 }]
        );
    }

    #[test]
    fn test_zero_quantity_is_rejected() {
        let mut cart = Cart::new("u2");
        assert!(cart.add(product("p1", 60.0), 0).is_err());
        assert!(cart.is_empty());
    }

    #[test]
    fn test_settle_takes_out_only_ordered_quantities() {
        let mut cart = Cart::new("u2");
        cart.add(product("p1", 60.0), 3).unwrap();
        cart.add(product("p3", 120.0), 1).unwrap();

        cart.settle(&[OrderLine { product_id: "p1".to_string(), quantity: 2 }, OrderLine { product_id: "p3".to_string(), quantity: 1 }])
            .unwrap();

        assert_eq!(cart.lines(), vec![OrderLine { product_id: "p1".to_string(), quantity: 1 }]);
    }

    #[test]
    fn test_settle_fails_without_changes_when_cart_is_short() {
        let mut cart = Cart::new("u2");
        cart.add(product("p1", 60.0), 1).unwrap();
        let before = cart.clone();

        let result = cart.settle(&[OrderLine { product_id: "p1".to_string(), quantity: 2 }]);

        assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
        assert_eq!(cart, before);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_increment_one_line() {
        use crate::model::{User, UserRole};
        use crate::storage::{InMemoryStorage, Seed};

        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::with_seed(Seed {
            users: vec![User {
                id: "u2".to_string(),
                name: "John Doe".to_string(),
                email: "john@example.com".to_string(),
                phone: "1234567890".to_string(),
                role: UserRole::Customer,
                pending_dues: 0.0,
                device_token: None,
            }],
            products: vec![product("p1", 60.0)],
            advertisement: String::new(),
        }));
        let carts = CartService::new(storage);

        let mut handles = Vec::new();
        for _ in 0..100 {
            let carts = carts.clone();
            handles.push(tokio::spawn(async move { carts.add("u2", "p1", 1).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let cart = carts.cart("u2").await.unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 100);
    }
}
