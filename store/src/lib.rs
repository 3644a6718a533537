pub mod api;
pub mod billing;
pub mod cart;
pub mod catalog;
pub mod dashboard;
pub mod engine;
pub mod error;
pub mod executable_utils;
pub mod insights;
pub mod model;
pub mod notifier;
pub mod rate_limit;
pub mod storage;

pub use error::StoreError;
