pub mod app_config;
pub mod database;
pub mod directory_repo;
pub mod error;
pub mod order_repo;

pub use database::DbClient;
pub use directory_repo::PgDirectoryRepository;
pub use order_repo::PgOrderRepository;

use payorder_core::OrderResult;
use payorder_order::OrderService;
use std::sync::Arc;

/// Wire the Postgres repositories behind an `OrderService`.
pub fn order_service(db: &DbClient, config: &app_config::Config) -> OrderResult<OrderService> {
    let secrets = config.signature.slot_secrets()?;
    let orders = Arc::new(PgOrderRepository::new(db.pool.clone()));
    let directory = Arc::new(PgDirectoryRepository::new(
        db.pool.clone(),
        config.search.lookup_limit,
    ));
    Ok(OrderService::new(orders, directory.clone(), directory, secrets))
}
