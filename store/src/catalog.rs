use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::model::{Product, ProductDraft};
use crate::notifier::Notifier;
use crate::storage::Storage;

pub const DEFAULT_CATEGORY: &str = "General";
pub const DEFAULT_UNIT: &str = "pc";
pub const ALL_CATEGORIES: &str = "All";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        let category_matches = match self.category.as_deref() {
            None | Some(ALL_CATEGORIES) | Some("") => true,
            Some(category) => product.category == category,
        };
        let search_matches = match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(term) => product.name.to_lowercase().contains(&term.to_lowercase()),
        };
        category_matches && search_matches
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Builds a new product from a draft under the given id.
pub fn create_product(id: String, draft: ProductDraft) -> Result<Product, StoreError> {
    let product = Product {
        id,
        name: draft.name.trim().to_string(),
        category: non_blank(draft.category).unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        price: draft.price,
        original_price: draft.original_price,
        stock: draft.stock,
        unit: non_blank(draft.unit).unwrap_or_else(|| DEFAULT_UNIT.to_string()),
        description: non_blank(draft.description),
        image_url: non_blank(draft.image_url),
    };
    product.validate()?;
    Ok(product)
}

/// Restocks an existing product from a draft: stock is added, prices and
/// category replaced, blank optional fields keep their current values.
pub fn merge_restock(existing: &Product, draft: ProductDraft) -> Result<Product, StoreError> {
    let stock = existing
        .stock
        .checked_add(draft.stock)
        .ok_or_else(|| StoreError::invalid(format!("stock for {} overflows", existing.id)))?;
    let product = Product {
        id: existing.id.clone(),
        name: existing.name.clone(),
        category: non_blank(draft.category).unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        price: draft.price,
        original_price: draft.original_price,
        stock,
        unit: non_blank(draft.unit).unwrap_or_else(|| existing.unit.clone()),
        description: non_blank(draft.description).or_else(|| existing.description.clone()),
        image_url: non_blank(draft.image_url).or_else(|| existing.image_url.clone()),
    };
    product.validate()?;
    Ok(product)
}

/// Replaces the editable fields of a product. Stock is set, not added.
pub fn edit_product(existing: &Product, draft: ProductDraft) -> Result<Product, StoreError> {
    create_product(existing.id.clone(), draft)
}

/// Manager-side catalog: listing, editing and discounts.
#[derive(Clone)]
pub struct Catalog {
    storage: Arc<dyn Storage>,
    notifier: Notifier,
}

impl Catalog {
    pub fn new(storage: Arc<dyn Storage>, notifier: Notifier) -> Self {
        Self { storage, notifier }
    }

    /// Products matching the filter, sorted by name.
    pub async fn list_products(&self, filter: &ProductFilter) -> Vec<Product> {
        let mut products: Vec<Product> = self
            .storage
            .list_products()
            .await
            .into_iter()
            .filter(|product| filter.matches(product))
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        products
    }

    pub async fn categories(&self) -> Vec<String> {
        self.storage
            .list_products()
            .await
            .into_iter()
            .map(|product| product.category)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub async fn get_product(&self, product_id: &str) -> Result<Product, StoreError> {
        self.storage.get_product(product_id).await
    }

    pub async fn add_product(&self, draft: ProductDraft) -> Result<Product, StoreError> {
        debug!(name = %draft.name, "Adding product");
        let product = self.storage.add_product(draft).await?;
        info!(product_id = %product.id, stock = product.stock, "Saved product {}", product.name);
        Ok(product)
    }

    pub async fn update_product(&self, product_id: &str, draft: ProductDraft) -> Result<Product, StoreError> {
        let product = self.storage.update_product(product_id, draft).await?;
        info!(product_id = %product.id, "Updated product {}", product.name);
        Ok(product)
    }

    /// Sets a discounted price and tells every customer about it.
    pub async fn apply_discount(&self, product_id: &str, new_price: f64) -> Result<Product, StoreError> {
        let (product, notifications) = self.storage.apply_discount(product_id, new_price).await?;
        info!(
            product_id,
            price = product.price,
            original_price = ?product.original_price,
            "Applied discount, notified {} customers",
            notifications.len()
        );
        self.notifier.forward(&notifications).await;
        Ok(product)
    }
}
