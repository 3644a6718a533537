use std::error::Error;

use store::executable_utils::{initialize_executable, initialize_tracing, run_backend};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    println!("Starting backend...");
    let config = initialize_executable()?;
    initialize_tracing(&config.backend.log_level);
    let storage = grocer::build_storage(&config);
    run_backend(config, storage).await
}
