//! Framework lifecycle
//!
//! One [`Framework`] owns the hook table and the mod loader for the life of
//! the host process: created at init from the core config, torn down at
//! shutdown by unloading every mod and restoring every hook. The framework
//! is itself loaded as a mod so that it can save its state before the host
//! saves.

use std::path::Path;
use std::sync::Arc;

use shadowhook_engine::{HostError, HostImage};
use shadowhook_sdk::PlatformKey;

use crate::config::{ConfigError, FrameworkConfig};
use crate::descriptor::{DescriptorCatalog, DescriptorError, PlatformDescriptor};
use crate::hooks::{HookTable, InterceptorKey};
use crate::mods::{LoadError, ModHandle, ModLoader, ModManifest};
use crate::persistence::{persist_before, LoaderState, Persistence, TrySaveGame};

/// Mod id the framework registers its own interceptors under
pub const CORE_MOD_ID: &str = "shadowhook";

/// Errors raised while bringing the framework up
#[derive(Debug, thiserror::Error)]
pub enum FrameworkError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("host_build is not set in the core config")]
    MissingHostBuild,

    #[error("The compilation target is not a supported host platform")]
    UnsupportedTarget,
}

pub struct Framework {
    config: FrameworkConfig,
    loader: Arc<ModLoader>,
    core: ModHandle,
    save_hook: Option<InterceptorKey>,
}

impl Framework {
    /// Assemble the framework around an already selected descriptor
    ///
    /// `persistence` is run before every host save. A descriptor without
    /// the save entry point only disables that; the framework still starts.
    pub fn new(
        config: FrameworkConfig,
        descriptor: Arc<PlatformDescriptor>,
        image: HostImage,
        persistence: Arc<dyn Persistence>,
    ) -> Result<Self, FrameworkError> {
        Self::assemble(config, descriptor, image, |_| persistence)
    }

    fn assemble(
        config: FrameworkConfig,
        descriptor: Arc<PlatformDescriptor>,
        image: HostImage,
        persistence: impl FnOnce(&Arc<ModLoader>) -> Arc<dyn Persistence>,
    ) -> Result<Self, FrameworkError> {
        let table = Arc::new(HookTable::new(descriptor, image));
        let loader = Arc::new(ModLoader::new(table));

        let core = loader.load(ModManifest::new(CORE_MOD_ID, "shadowhook", env!("CARGO_PKG_VERSION")))?;

        let save_hook = match persist_before::<TrySaveGame>(&loader, &core, persistence(&loader)) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!("State will not be saved with the host: {}", e);
                None
            }
        };

        Ok(Self {
            config,
            loader,
            core,
            save_hook,
        })
    }

    /// Select the descriptor for this target and `config.host_build`
    ///
    /// Descriptors are read from `config.descriptors_dir` and loaded-mod
    /// state is written to `config.state_file`, both resolved against
    /// `base`.
    pub fn from_config(config: FrameworkConfig, base: &Path, image: HostImage) -> Result<Self, FrameworkError> {
        if config.host_build.is_empty() {
            return Err(FrameworkError::MissingHostBuild);
        }

        let platform =
            PlatformKey::current(config.host_build.as_str()).ok_or(FrameworkError::UnsupportedTarget)?;
        let catalog = DescriptorCatalog::load_dir(config.descriptors_path(base))?;
        let descriptor = catalog.require(&platform)?;

        tracing::info!(
            "Framework starting on {} against '{}' ({} descriptor(s) available)",
            platform,
            image.name(),
            catalog.len()
        );

        let state_path = config.state_path(base);
        Self::assemble(config, descriptor, image, |loader| {
            Arc::new(LoaderState::new(Arc::downgrade(loader), state_path))
        })
    }

    pub fn config(&self) -> &FrameworkConfig {
        &self.config
    }

    pub fn platform(&self) -> &PlatformKey {
        self.loader.table().platform()
    }

    pub fn table(&self) -> &Arc<HookTable> {
        self.loader.table()
    }

    pub fn loader(&self) -> &Arc<ModLoader> {
        &self.loader
    }

    /// Handle of the framework's own mod entry
    pub fn core(&self) -> &ModHandle {
        &self.core
    }

    /// Whether state is saved before each host save
    pub fn saves_with_host(&self) -> bool {
        self.save_hook.is_some()
    }

    /// Unload every mod and restore every hook
    pub fn shutdown(&self) {
        self.loader.unload_all();
        self.loader.table().shutdown();
        tracing::info!("Framework shut down");
    }
}
