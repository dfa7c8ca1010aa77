//! Secret backend registry
//!
//! Maps backend type names (as selected by the user, e.g. `azurekeyvault`)
//! to backend instances so the CLI can pick one at runtime.

use crate::{Annotations, Backend, BackendError, SecretMap};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry for secret backends
///
/// ```ignore
/// use kvinject_backends::BackendRegistry;
///
/// let mut registry = BackendRegistry::new();
/// registry.register(Arc::new(AzureKeyVault::with_default_client(credential)));
///
/// let backend = registry.get("azurekeyvault")?;
/// let secrets = backend.get_secrets("my-vault", None, &Annotations::new()).await?;
/// ```
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<&'static str, Arc<dyn Backend>>,
}

impl BackendRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    /// Register a backend
    ///
    /// The backend's `backend_name()` is used as the key. If a backend with the
    /// same name already exists, it is replaced.
    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        let name = backend.backend_name();
        if self.backends.insert(name, backend).is_some() {
            tracing::debug!(backend = name, "Replaced registered secret backend");
        }
    }

    /// Get a backend by name
    ///
    /// # Errors
    ///
    /// Returns `BackendError::UnsupportedBackend` if nothing is registered
    /// under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Backend>, BackendError> {
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| BackendError::UnsupportedBackend {
                backend: name.to_string(),
            })
    }

    /// Check if a backend is registered under the given name
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    /// Get all registered backend names, sorted
    #[must_use]
    pub fn backends(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.backends.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Fetch all secrets under `path` from the named backend
    ///
    /// # Errors
    ///
    /// Returns `BackendError::UnsupportedBackend` for unknown names, otherwise
    /// whatever the backend returns.
    pub async fn get_secrets(
        &self,
        backend: &str,
        path: &str,
        version: Option<&str>,
        annotations: &Annotations,
    ) -> Result<SecretMap, BackendError> {
        self.get(backend)?
            .get_secrets(path, version, annotations)
            .await
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.backends())
            .finish()
    }
}
