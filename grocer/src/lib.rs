pub mod seed;

use std::sync::Arc;

use common::config::Config;
use store::storage::{InMemoryStorage, Seed, Storage};

/// Builds the application storage, seeded according to `config.common`.
pub fn build_storage(config: &Config) -> Arc<dyn Storage> {
    let seed = if config.common.seed_demo_data {
        seed::demo_seed(config.common.generated_customers, config.common.generated_products)
    } else {
        Seed::default()
    };
    tracing::info!(
        users = seed.users.len(),
        products = seed.products.len(),
        "Initialized in-memory storage"
    );
    Arc::new(InMemoryStorage::with_seed(seed))
}
