pub mod db;
pub mod error;
pub mod gateway;
pub mod model;

pub use db::{RedbGateway, StoreConfig};
pub use error::StoreError;
pub use gateway::StoreGateway;
pub use model::Secret;
