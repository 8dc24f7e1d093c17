//! Saving framework state alongside the host's own save

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};

use shadowhook_sdk::HostObject;

use crate::hooks::{Directive, HostFunction, InterceptorKey};
use crate::mods::{LoadError, ModHandle, ModLoader};

crate::host_function! {
    /// The host's save entry point, run on autosave and on exit
    pub TrySaveGame("AppDelegate", "trySaveGame", "bool")
        = fn(this: *mut HostObject, app_exit: bool);
}

/// Why a save did not happen
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct FailureReason(pub String);

impl From<&str> for FailureReason {
    fn from(reason: &str) -> Self {
        Self(reason.to_string())
    }
}

/// Something that can write its state out on demand
pub trait Persistence: Send + Sync {
    fn persist_now(&self) -> Result<(), FailureReason>;
}

/// One loaded mod as written to the state file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModRecord {
    pub id: String,
    pub name: String,
    pub version: String,
}

/// Contents of the state file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderSnapshot {
    pub mods: Vec<ModRecord>,
}

impl LoaderSnapshot {
    pub fn capture(loader: &ModLoader) -> Self {
        let mods = loader
            .loaded_mods()
            .into_iter()
            .filter_map(|id| loader.manifest(&id))
            .map(|manifest| ModRecord {
                id: manifest.id.to_string(),
                name: manifest.name,
                version: manifest.version,
            })
            .collect();
        Self { mods }
    }

    pub fn load(path: &Path) -> Result<Self, FailureReason> {
        let content = std::fs::read_to_string(path).map_err(|e| FailureReason(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&content).map_err(|e| FailureReason(format!("{}: {}", path.display(), e)))
    }
}

/// Writes which mods are loaded to a JSON file
///
/// Holds the loader weakly; once the framework is gone there is nothing left
/// to save.
pub struct LoaderState {
    loader: Weak<ModLoader>,
    path: PathBuf,
}

impl LoaderState {
    pub fn new(loader: Weak<ModLoader>, path: impl Into<PathBuf>) -> Self {
        Self {
            loader,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persistence for LoaderState {
    fn persist_now(&self) -> Result<(), FailureReason> {
        let loader = self.loader.upgrade().ok_or_else(|| FailureReason::from("Framework is shut down"))?;
        let snapshot = LoaderSnapshot::capture(&loader);

        let json = serde_json::to_string_pretty(&snapshot).map_err(|e| FailureReason(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FailureReason(format!("{}: {}", parent.display(), e)))?;
        }
        std::fs::write(&self.path, json).map_err(|e| FailureReason(format!("{}: {}", self.path.display(), e)))?;

        tracing::debug!("Wrote state of {} mod(s) to {:?}", snapshot.mods.len(), self.path);
        Ok(())
    }
}

/// Save framework state every time the host runs its save entry point `F`
///
/// The host's save always runs afterwards, whether or not ours succeeded.
pub fn persist_before<F: HostFunction>(
    loader: &ModLoader,
    handle: &ModHandle,
    persistence: Arc<dyn Persistence>,
) -> Result<InterceptorKey, LoadError> {
    loader.hook::<F, _>(handle, 0, move |_| {
        tracing::info!("Saving...");
        if let Err(reason) = persistence.persist_now() {
            tracing::error!("Save failed: {}", reason);
        }
        tracing::info!("Saved");
        Directive::Continue
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::c_void;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use shadowhook_engine::HostImage;
    use shadowhook_sdk::PlatformKey;

    use crate::descriptor::PlatformDescriptor;
    use crate::hooks::HookTable;
    use crate::mods::ModManifest;

    crate::host_function! {
        SaveOk("AppDelegate", "trySaveGame", "bool") = fn(this: *mut c_void, app_exit: bool);
        SaveFailing("AppDelegate", "trySaveGame", "bool") = fn(this: *mut c_void, app_exit: bool);
    }

    static HOST_SAVES: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn try_save_game(_this: *mut c_void, _app_exit: bool) {
        HOST_SAVES.fetch_add(1, Ordering::SeqCst);
    }

    /// Records the order of saves against the host's counter
    struct Recorder {
        fail: bool,
        host_saves_seen: Mutex<Vec<usize>>,
    }

    impl Persistence for Recorder {
        fn persist_now(&self) -> Result<(), FailureReason> {
            self.host_saves_seen.lock().push(HOST_SAVES.load(Ordering::SeqCst));
            if self.fail {
                Err("disk full".into())
            } else {
                Ok(())
            }
        }
    }

    fn loader(vtable: &[usize; 1]) -> ModLoader {
        let json = format!(
            r#"{{
                "platform": "{}",
                "classes": {{ "AppDelegate": {{ "size": 8, "vtable": 0 }} }},
                "functions": {{ "AppDelegate::trySaveGame(bool)": {{ "vtable": 0 }} }}
            }}"#,
            PlatformKey::current("test").unwrap()
        );
        let descriptor = PlatformDescriptor::load_from_str(&json).unwrap();
        let image = HostImage::new(
            "vtable",
            vtable.as_ptr() as *const u8,
            std::mem::size_of::<usize>(),
        )
        .unwrap();
        ModLoader::new(Arc::new(HookTable::new(Arc::new(descriptor), image)))
    }

    fn host_save(vtable: &[usize; 1]) {
        let slot = unsafe { (*(vtable.as_ptr() as *const AtomicUsize)).load(Ordering::SeqCst) };
        let f: extern "C" fn(*mut c_void, bool) = unsafe { std::mem::transmute(slot) };
        f(std::ptr::null_mut(), false);
    }

    #[test]
    fn test_saves_before_host() {
        let vtable = Box::new([try_save_game as usize]);
        let loader = loader(&vtable);
        let handle = loader.load(ModManifest::new("core", "Core", "1")).unwrap();

        let recorder = Arc::new(Recorder {
            fail: false,
            host_saves_seen: Mutex::new(Vec::new()),
        });
        persist_before::<SaveOk>(&loader, &handle, recorder.clone()).unwrap();

        let before = HOST_SAVES.load(Ordering::SeqCst);
        host_save(&vtable);

        let seen = recorder.host_saves_seen.lock().clone();
        assert_eq!(seen.len(), 1);
        assert!(seen[0] >= before);
        assert!(HOST_SAVES.load(Ordering::SeqCst) > seen[0]);
    }

    #[test]
    fn test_host_saves_when_ours_fails() {
        let vtable = Box::new([try_save_game as usize]);
        let loader = loader(&vtable);
        let handle = loader.load(ModManifest::new("core", "Core", "1")).unwrap();

        let recorder = Arc::new(Recorder {
            fail: true,
            host_saves_seen: Mutex::new(Vec::new()),
        });
        persist_before::<SaveFailing>(&loader, &handle, recorder.clone()).unwrap();

        let before = HOST_SAVES.load(Ordering::SeqCst);
        host_save(&vtable);

        assert_eq!(recorder.host_saves_seen.lock().len(), 1);
        assert!(HOST_SAVES.load(Ordering::SeqCst) > before);
    }

    #[test]
    fn test_loader_state_lists_loaded_mods() {
        let vtable = Box::new([try_save_game as usize]);
        let loader = Arc::new(loader(&vtable));
        loader.load(ModManifest::new("beta", "Beta", "2.0")).unwrap();
        loader.load(ModManifest::new("alpha", "Alpha", "1.0")).unwrap();

        let dir = std::env::temp_dir().join(format!("shadowhook-state-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let state = LoaderState::new(Arc::downgrade(&loader), dir.join("data").join("state.json"));

        state.persist_now().unwrap();
        let snapshot = LoaderSnapshot::load(state.path()).unwrap();
        let ids: Vec<_> = snapshot.mods.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "beta"]);
        assert_eq!(snapshot.mods[1].version, "2.0");

        drop(loader);
        assert!(state.persist_now().is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
