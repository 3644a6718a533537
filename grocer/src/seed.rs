//! Demo data for a fresh store: staff, a handful of regular customers, the
//! core catalog, and optional generated filler for load testing.

use store::billing::round_money;
use store::model::{Product, User, UserRole};
use store::storage::Seed;

pub const DEFAULT_ADVERTISEMENT: &str = "Fresh arrivals every morning! Get 10% off on all dairy products this week.";

const GENERATED_CATEGORIES: [&str; 17] = [
    "Fruits",
    "Vegetables",
    "Dairy & Milk",
    "Bakery",
    "Eggs & Meat",
    "Grains & Rice",
    "Spices & Masalas",
    "Oil & Ghee",
    "Snacks & Chips",
    "Beverages",
    "Instant Food",
    "Household",
    "Personal Care",
    "Baby Care",
    "Pet Food",
    "Frozen Food",
    "Health & Wellness",
];

fn user(id: &str, name: &str, email: &str, phone: &str, role: UserRole, pending_dues: f64) -> User {
    User {
        id: id.to_string(),
        name: name.to_string(),
        email: email.to_string(),
        phone: phone.to_string(),
        role,
        pending_dues,
        device_token: None,
    }
}

pub fn demo_users() -> Vec<User> {
    use UserRole::{Customer, Manager};
    vec![
        user("u1", "Admin Manager", "admin@store.com", "9999999999", Manager, 0.0),
        user("u4", "Sarah Connor", "sarah@store.com", "9999999998", Manager, 0.0),
        user("u5", "Mike Ross", "mike@store.com", "9999999997", Manager, 0.0),
        user("u2", "John Doe", "john@example.com", "1234567890", Customer, 3500.0),
        user("u3", "Jane Smith", "jane@example.com", "9876543210", Customer, 0.0),
        user("u6", "Alice Johnson", "alice@example.com", "9876543211", Customer, 120.5),
        user("u7", "Bob Williams", "bob@example.com", "9876543212", Customer, 0.0),
        user("u8", "Charlie Brown", "charlie@example.com", "9876543213", Customer, 500.0),
        user("u9", "Diana Prince", "diana@example.com", "9876543214", Customer, 0.0),
    ]
}

#[allow(clippy::too_many_arguments)]
fn product(id: &str, name: &str, category: &str, price: f64, stock: u32, unit: &str, description: &str, image: u32) -> Product {
    Product {
        id: id.to_string(),
        name: name.to_string(),
        category: category.to_string(),
        price,
        original_price: None,
        stock,
        unit: unit.to_string(),
        description: Some(description.to_string()),
        image_url: Some(format!("https://picsum.photos/200/200?random={}", image)),
    }
}

pub fn demo_products() -> Vec<Product> {
    vec![
        product("p1", "Organic Bananas", "Fruits", 60.0, 150, "kg", "Fresh, organic bananas sourced directly from local farmers.", 1),
        product("p2", "Whole Milk", "Dairy", 75.0, 40, "liter", "Creamy and nutritious whole milk, rich in calcium.", 2),
        product("p3", "Sourdough Bread", "Bakery", 120.0, 25, "loaf", "Artisanal sourdough bread with a perfect crust.", 3),
        product("p4", "Basmati Rice", "Grains", 850.0, 50, "bag", "Premium aged Basmati rice, perfect for biryanis.", 4),
        product("p5", "Cheddar Cheese", "Dairy", 450.0, 30, "block", "Sharp cheddar cheese aged for 12 months.", 5),
    ]
}

/// Filler customers. Every seventh one owes money. Values are derived from
/// the index so runs are reproducible.
pub fn generated_customers(count: usize) -> Vec<User> {
    (0..count)
        .map(|index| {
            let suffix = index + 1000;
            let pending_dues = if index % 7 == 0 {
                round_money(50.0 + ((index * 137) % 800) as f64 + 0.25)
            } else {
                0.0
            };
            User {
                id: format!("gen_u{}", suffix),
                name: format!("Customer {}", index + 1),
                email: format!("customer{}@demo.store", suffix),
                phone: (7_000_000_000u64 + index as u64).to_string(),
                role: UserRole::Customer,
                pending_dues,
                device_token: None,
            }
        })
        .collect()
}

fn unit_for(category: &str) -> &'static str {
    match category {
        "Fruits" | "Vegetables" | "Grains & Rice" => "kg",
        "Dairy & Milk" | "Beverages" | "Oil & Ghee" => "liter",
        "Snacks & Chips" | "Spices & Masalas" | "Frozen Food" => "pack",
        _ => "pc",
    }
}

pub fn generated_products(count: usize) -> Vec<Product> {
    (0..count)
        .map(|index| {
            let category = GENERATED_CATEGORIES[index % GENERATED_CATEGORIES.len()];
            let suffix = index + 1000;
            let short_name = category.split(' ').next().unwrap_or(category);
            Product {
                id: format!("gen_p{}", suffix),
                name: format!("{} Item {}", short_name, suffix),
                category: category.to_string(),
                price: (10 + (index * 53) % 1990) as f64,
                original_price: None,
                stock: ((index * 31) % 201) as u32,
                unit: unit_for(category).to_string(),
                description: Some(format!("High quality {} item number {}.", category.to_lowercase(), suffix)),
                image_url: Some(format!("https://picsum.photos/200/200?random={}", suffix)),
            }
        })
        .collect()
}

pub fn demo_seed(extra_customers: usize, extra_products: usize) -> Seed {
    let mut users = demo_users();
    users.extend(generated_customers(extra_customers));
    let mut products = demo_products();
    products.extend(generated_products(extra_products));

    Seed {
        users,
        products,
        advertisement: DEFAULT_ADVERTISEMENT.to_string(),
    }
}
