//! The library system object: owns simulation settings and hands out scenes.
//!
//! Ownership flows strictly system -> scene. A scene keeps a non-owning
//! back-reference to the system's shared state for settings queries; the
//! reference never extends the system's lifetime, and a scene that outlives
//! its system fails those queries instead of dangling.

use std::sync::Arc;

use crate::fdtd::FdtdConfig;
use crate::scene::Scene;

/// Shared state a scene may query from its owning system.
#[derive(Debug)]
pub(crate) struct SystemInner {
    pub(crate) config: FdtdConfig,
}

/// Top-level library object. Create one per host application, then create
/// scenes from it.
pub struct System {
    inner: Arc<SystemInner>,
}

impl System {
    /// Create a system with explicit simulation settings.
    pub fn new(config: FdtdConfig) -> Self {
        Self {
            inner: Arc::new(SystemInner { config }),
        }
    }

    /// The simulation settings shared with every scene.
    pub fn config(&self) -> &FdtdConfig {
        &self.inner.config
    }

    /// Create a scene owned by this system.
    pub fn create_scene(&self) -> Scene {
        Scene::new(Arc::downgrade(&self.inner))
    }
}

impl Default for System {
    fn default() -> Self {
        Self::new(FdtdConfig::default())
    }
}
