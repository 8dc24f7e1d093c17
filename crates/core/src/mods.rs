//! Mod loading
//!
//! A mod is a manifest of shadow classes plus the interceptors it registers
//! once loaded. Loading verifies every declared class against the platform
//! descriptor first; only a verified mod receives a [`ModHandle`], and the
//! handle is the only way to request hooks.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use shadowhook_sdk::{ClassDecl, PlatformKey};

use crate::hooks::{Directive, HookTable, HostFunction, InstallationError, InterceptorKey, Invocation};
use crate::layout::{verify, LayoutManifest, LayoutMismatchError};
use crate::shadow::ShadowClass;

/// Unique, stable name of a mod
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModId(String);

impl ModId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ModId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// What a mod declares about itself before loading
#[derive(Debug, Clone)]
pub struct ModManifest {
    pub id: ModId,
    pub name: String,
    pub version: String,
    pub classes: Vec<ClassDecl>,
}

impl ModManifest {
    pub fn new(id: impl Into<ModId>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            classes: Vec::new(),
        }
    }

    /// Declare a shadow class, builder style
    pub fn with_class<C: ShadowClass>(self) -> Self {
        self.with_decl(C::declaration())
    }

    /// Declare a class layout that has no shadow struct
    pub fn with_decl(mut self, decl: ClassDecl) -> Self {
        self.classes.push(decl);
        self
    }

    /// Declared layouts for offline checking against `platform`
    pub fn layout_manifest(&self, platform: &PlatformKey) -> LayoutManifest {
        LayoutManifest::new(self.id.as_str(), platform, &self.classes)
    }
}

/// Proof that a mod passed layout verification and is still loaded
///
/// Handles are issued by [`ModLoader::load`] only. A handle from an earlier
/// load of the same mod is rejected after an unload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModHandle {
    id: ModId,
    generation: u64,
}

impl ModHandle {
    pub fn id(&self) -> &ModId {
        &self.id
    }
}

/// Mod loading errors
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Mod '{0}' is already loaded")]
    AlreadyLoaded(ModId),

    #[error("Mod '{id}' failed layout verification: {source}")]
    Layout {
        id: ModId,
        #[source]
        source: LayoutMismatchError,
    },

    #[error("Hook request of mod '{id}' failed: {source}")]
    Install {
        id: ModId,
        #[source]
        source: InstallationError,
    },

    #[error("Mod '{0}' is not loaded")]
    NotLoaded(ModId),
}

struct LoadedMod {
    manifest: ModManifest,
    generation: u64,
}

/// Loads mods and brokers their hook requests
pub struct ModLoader {
    table: Arc<HookTable>,
    loaded: RwLock<HashMap<ModId, LoadedMod>>,
    generation: AtomicU64,
}

impl ModLoader {
    pub fn new(table: Arc<HookTable>) -> Self {
        Self {
            table,
            loaded: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(1),
        }
    }

    pub fn table(&self) -> &Arc<HookTable> {
        &self.table
    }

    /// Verify a mod's classes and admit it
    ///
    /// Every mismatch is logged; any mismatch aborts the load and nothing of
    /// the mod takes effect.
    pub fn load(&self, manifest: ModManifest) -> Result<ModHandle, LoadError> {
        let mut loaded = self.loaded.write();
        let id = manifest.id.clone();

        if loaded.contains_key(&id) {
            return Err(LoadError::AlreadyLoaded(id));
        }

        let report = verify(self.table.descriptor(), &manifest.classes);
        for mismatch in report.mismatches() {
            tracing::error!("Mod '{}': {}", id, mismatch);
        }
        report.into_result().map_err(|source| {
            tracing::error!("Mod '{}' not loaded: {}", id, source);
            LoadError::Layout {
                id: id.clone(),
                source,
            }
        })?;

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            "Loaded mod '{}' ({} v{}), {} class(es) verified on {}",
            id,
            manifest.name,
            manifest.version,
            manifest.classes.len(),
            self.table.platform()
        );

        loaded.insert(id.clone(), LoadedMod { manifest, generation });
        Ok(ModHandle { id, generation })
    }

    fn check(loaded: &HashMap<ModId, LoadedMod>, handle: &ModHandle) -> Result<(), LoadError> {
        match loaded.get(&handle.id) {
            Some(m) if m.generation == handle.generation => Ok(()),
            _ => Err(LoadError::NotLoaded(handle.id.clone())),
        }
    }

    /// Register an interceptor on `F` for a loaded mod
    ///
    /// A failed request is logged and leaves the mod loaded; its other hooks
    /// are unaffected.
    pub fn hook<F, C>(&self, handle: &ModHandle, priority: i32, callback: C) -> Result<InterceptorKey, LoadError>
    where
        F: HostFunction,
        C: Fn(&mut Invocation<'_, F>) -> Directive<F::Output> + Send + Sync + 'static,
    {
        // Held so an unload cannot interleave with the registration
        let loaded = self.loaded.read();
        Self::check(&loaded, handle)?;

        self.table
            .hook::<F, C>(handle.id.clone(), priority, callback)
            .map_err(|source| {
                tracing::error!(
                    "Mod '{}' could not hook {}: {}",
                    handle.id,
                    F::identity(),
                    source
                );
                LoadError::Install {
                    id: handle.id.clone(),
                    source,
                }
            })
    }

    /// Remove one interceptor of a loaded mod
    ///
    /// Only interceptors the mod registered itself can be removed.
    pub fn unhook(&self, handle: &ModHandle, key: InterceptorKey) -> Result<(), LoadError> {
        let loaded = self.loaded.read();
        Self::check(&loaded, handle)?;

        self.table.unhook_owned(key, &handle.id).map_err(|source| LoadError::Install {
            id: handle.id.clone(),
            source,
        })
    }

    /// Remove every interceptor of a mod and forget it
    ///
    /// Returns the number of interceptors removed.
    pub fn unload(&self, handle: &ModHandle) -> Result<usize, LoadError> {
        let mut loaded = self.loaded.write();
        Self::check(&loaded, handle)?;
        loaded.remove(&handle.id);

        let removed = self.table.remove_owner(&handle.id);
        tracing::info!("Unloaded mod '{}'", handle.id);
        Ok(removed)
    }

    /// Unload every mod
    pub fn unload_all(&self) {
        let mut loaded = self.loaded.write();
        for (id, _) in loaded.drain() {
            self.table.remove_owner(&id);
            tracing::info!("Unloaded mod '{}'", id);
        }
    }

    pub fn is_loaded(&self, id: &ModId) -> bool {
        self.loaded.read().contains_key(id)
    }

    /// Ids of the loaded mods, sorted
    pub fn loaded_mods(&self) -> Vec<ModId> {
        let mut ids: Vec<_> = self.loaded.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn manifest(&self, id: &ModId) -> Option<ModManifest> {
        self.loaded.read().get(id).map(|m| m.manifest.clone())
    }
}
