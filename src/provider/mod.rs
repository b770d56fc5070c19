//! Provider trait: the capability every upstream mail API adapter exposes
//!
//! A provider is a value with three behaviours — a stable name, a send, and
//! a health check — dispatched by the [`crate::registry::Registry`] purely
//! by name, never by concrete type. New providers are added by implementing
//! this trait and calling `registry.register`.

pub mod http;

use async_trait::async_trait;

use crate::errors::AppResult;
use crate::model::NeutralMessage;

/// Adapter to a transactional email HTTPS API.
///
/// Implementations must be `Send + Sync`: the registry holds them behind an
/// `Arc<dyn Provider>` shared across every session's connection task.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable, non-empty identifier used as the registry key.
    fn name(&self) -> &str;

    /// Send a neutral message through this provider. Failures carry raw,
    /// unclassified upstream text; [`crate::dispatch`] classifies it.
    async fn send(&self, msg: &NeutralMessage) -> AppResult<()>;

    /// Cheap liveness check against the upstream API.
    async fn health(&self) -> AppResult<()>;
}
