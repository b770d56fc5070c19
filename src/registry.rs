//! Provider registry
//!
//! A name-indexed collection of providers with a distinguished default,
//! guarded by a readers-writer lock. Grounded on the Go original's
//! `registry.go`: registration overwrites silently (logged, not rejected),
//! the first successful registration becomes the default, and a lookup
//! failure during send never leaves a dangling/null provider name — see
//! [`SendOutcome`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::errors::{AppError, AppResult};
use crate::model::NeutralMessage;
use crate::provider::Provider;

struct Inner {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_name: String,
}

/// The result of a dispatched send: which provider it resolved to (empty if
/// resolution itself failed) and the outcome of the send.
pub struct SendOutcome {
    pub provider_name: String,
    pub result: AppResult<()>,
}

/// Concurrent-safe mapping of provider name to [`Provider`].
///
/// Cheap to clone: the lock and map live behind an `Arc` internally, mirroring
/// the `Arc<Mutex<_>>`-shared-state pattern the teacher uses for its cursor
/// store, but with a reader-writer lock since reads (lookups, sends) vastly
/// outnumber writes (registration at startup).
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RwLock<Inner>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                providers: HashMap::new(),
                default_name: String::new(),
            })),
        }
    }

    /// Register a provider. Rejects an empty name. If no default is set
    /// yet, this provider becomes it. Re-registering an existing name
    /// overwrites the previous entry (logged at `warn`, not rejected).
    pub fn register(&self, provider: Arc<dyn Provider>) -> AppResult<()> {
        let name = provider.name().to_owned();
        if name.is_empty() {
            return Err(AppError::Internal("provider name must not be empty".to_owned()));
        }

        let mut inner = self.inner.write().expect("registry lock poisoned");
        if inner.providers.contains_key(&name) {
            tracing::warn!(provider = %name, "overwriting previously registered provider");
        }
        inner.providers.insert(name.clone(), provider);
        if inner.default_name.is_empty() {
            inner.default_name = name;
        }
        Ok(())
    }

    /// Set the default provider. Rejects a name that isn't registered.
    pub fn set_default(&self, name: &str) -> AppResult<()> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if !inner.providers.contains_key(name) {
            return Err(AppError::UnknownProvider(name.to_owned()));
        }
        inner.default_name = name.to_owned();
        Ok(())
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> AppResult<Arc<dyn Provider>> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner
            .providers
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::UnknownProvider(name.to_owned()))
    }

    /// Look up the default provider.
    pub fn get_default(&self) -> AppResult<Arc<dyn Provider>> {
        let inner = self.inner.read().expect("registry lock poisoned");
        if inner.default_name.is_empty() {
            return Err(AppError::NoDefaultProvider);
        }
        inner
            .providers
            .get(&inner.default_name)
            .cloned()
            .ok_or_else(|| AppError::UnknownProvider(inner.default_name.clone()))
    }

    /// Names of every registered provider, in unspecified order.
    pub fn list(&self) -> Vec<String> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.providers.keys().cloned().collect()
    }

    /// Resolve `name` (or the default, if empty) and send through it.
    ///
    /// The lock is held only long enough to clone the resolved provider's
    /// `Arc` handle; it is released before the send's `.await`, so a send in
    /// flight never blocks registration or other lookups.
    pub async fn send(&self, msg: &NeutralMessage, name: &str) -> SendOutcome {
        let resolved = if name.is_empty() {
            self.get_default()
        } else {
            self.get(name)
        };

        let provider = match resolved {
            Ok(p) => p,
            Err(err) => {
                return SendOutcome {
                    provider_name: String::new(),
                    result: Err(err),
                };
            }
        };

        let provider_name = provider.name().to_owned();
        let result = provider.send(msg).await;
        SendOutcome { provider_name, result }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubProvider {
        name: &'static str,
        sends: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn send(&self, _msg: &NeutralMessage) -> AppResult<()> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(AppError::Upstream("rate limit exceeded".to_owned()))
            } else {
                Ok(())
            }
        }

        async fn health(&self) -> AppResult<()> {
            Ok(())
        }
    }

    fn stub(name: &'static str, fail: bool) -> Arc<dyn Provider> {
        Arc::new(StubProvider { name, sends: AtomicUsize::new(0), fail })
    }

    #[test]
    fn first_registration_becomes_default() {
        let registry = Registry::new();
        registry.register(stub("brevo", false)).unwrap();
        assert_eq!(registry.get_default().unwrap().name(), "brevo");
    }

    #[test]
    fn set_default_rejects_unknown_name() {
        let registry = Registry::new();
        registry.register(stub("brevo", false)).unwrap();
        assert!(registry.set_default("sendgrid").is_err());
    }

    #[test]
    fn empty_name_registration_is_rejected() {
        struct Empty;
        #[async_trait]
        impl Provider for Empty {
            fn name(&self) -> &str {
                ""
            }
            async fn send(&self, _msg: &NeutralMessage) -> AppResult<()> {
                Ok(())
            }
            async fn health(&self) -> AppResult<()> {
                Ok(())
            }
        }
        let registry = Registry::new();
        assert!(registry.register(Arc::new(Empty)).is_err());
    }

    #[tokio::test]
    async fn send_with_empty_name_resolves_default() {
        let registry = Registry::new();
        registry.register(stub("brevo", false)).unwrap();
        let outcome = registry.send(&NeutralMessage::default(), "").await;
        assert_eq!(outcome.provider_name, "brevo");
        assert!(outcome.result.is_ok());
    }

    #[tokio::test]
    async fn send_with_unknown_name_yields_empty_provider_name() {
        let registry = Registry::new();
        registry.register(stub("brevo", false)).unwrap();
        let outcome = registry.send(&NeutralMessage::default(), "sendgrid").await;
        assert_eq!(outcome.provider_name, "");
        assert!(outcome.result.is_err());
    }
}
