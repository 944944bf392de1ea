pub mod error;
pub mod handlers;
pub mod reveal;
pub mod server;
pub mod store;

#[cfg(test)]
mod testing;

use std::sync::Arc;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn store::StoreGateway>,
    /// Honor `X-Forwarded-For` / `X-Real-IP` when deriving the requester address.
    pub trust_proxy_headers: bool,
}

pub use error::ShareError;
pub use reveal::{reveal, validate_id, Revealed};
pub use server::{resolve_data_dir, router, run, ServerConfig};
pub use store::{RedbGateway, Secret, StoreConfig, StoreError, StoreGateway};
