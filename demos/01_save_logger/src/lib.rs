//! # Save Logger Demo
//!
//! Counts the host's saves and keeps a small save journal next to them.
//!
//! ## Features Demonstrated
//! - `#[derive(ShadowClass)]` - Declaring host classes with verified offsets
//! - `ModManifest` - Listing the classes a mod relies on
//! - `TrySaveGame` - Intercepting the host's save entry point
//! - `persist_before` - Saving mod state before the host saves
//! - `ModConfig` - TOML configuration loading
//!
//! ## Configuration File
//!
//! Creates a TOML config at:
//! `<base>/configs/mods/save_logger/save_logger.toml`
//!
//! ```toml
//! journal = "save_journal.txt"
//! skip_on_exit = false
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use shadowhook_core::sdk::{HostVTable, PlatformKey};
use shadowhook_core::{
    persist_before, Directive, FailureReason, HostFunction, LayoutManifest, LoadError, ModConfig,
    ModHandle, ModLoader, ModManifest, Persistence, ShadowClass, TrySaveGame,
};

pub const MOD_ID: &str = "save_logger";

// =============================================================================
// Host classes
// =============================================================================

#[derive(ShadowClass)]
#[shadow(class = "cocos2d::CCObject")]
#[repr(C)]
pub struct CCObject {
    _vtable: *const HostVTable,
    #[shadow(field = "m_uID", readonly)]
    pub id: u32,
    #[shadow(field = "m_nTag")]
    pub tag: i32,
    _pad: [u8; 0x10],
}

#[derive(ShadowClass)]
#[shadow(class = "GameManager")]
#[repr(C)]
pub struct GameManager {
    #[shadow(base)]
    pub base: CCObject,
    #[shadow(field = "m_playerName")]
    pub player_name: [u8; 24],
    #[shadow(field = "m_clickCount")]
    pub click_count: i32,
    _pad: [u8; 4],
}


// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveLoggerConfig {
    /// Journal file, relative to the working directory unless absolute
    pub journal: PathBuf,

    /// Skip the journal entry when the host saves on exit
    pub skip_on_exit: bool,
}

impl Default for SaveLoggerConfig {
    fn default() -> Self {
        Self {
            journal: PathBuf::from("save_journal.txt"),
            skip_on_exit: false,
        }
    }
}

impl ModConfig for SaveLoggerConfig {
    const MOD_ID: &'static str = MOD_ID;
}

// =============================================================================
// Journal
// =============================================================================

/// Appends one line per save to the journal file
pub struct SaveJournal {
    path: PathBuf,
    saves: AtomicU32,
}

impl SaveJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            saves: AtomicU32::new(0),
        }
    }

    pub fn saves(&self) -> u32 {
        self.saves.load(Ordering::Relaxed)
    }
}

impl Persistence for SaveJournal {
    fn persist_now(&self) -> Result<(), FailureReason> {
        let count = self.saves.fetch_add(1, Ordering::Relaxed) + 1;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| FailureReason(format!("{}: {}", self.path.display(), e)))?;
        writeln!(file, "save #{}", count).map_err(|e| FailureReason(e.to_string()))
    }
}

// =============================================================================
// Registration
// =============================================================================

/// Classes this mod reads and writes
pub fn manifest() -> ModManifest {
    ModManifest::new(MOD_ID, "Save Logger", env!("CARGO_PKG_VERSION"))
        .with_class::<CCObject>()
        .with_class::<GameManager>()
}

/// Declared layouts for the offline `layout-check` tool
pub fn layout_manifest(platform: &PlatformKey) -> LayoutManifest {
    manifest().layout_manifest(platform)
}

/// Load the mod and hook the host's save
pub fn register(loader: &ModLoader) -> Result<ModHandle, LoadError> {
    let config = SaveLoggerConfig::load().unwrap_or_else(|e| {
        tracing::warn!("Using default config: {}", e);
        SaveLoggerConfig::default()
    });

    let handle = loader.load(manifest())?;
    let journal = Arc::new(SaveJournal::new(config.journal.clone()));

    if config.skip_on_exit {
        // Runs first and bypasses the journal on exit saves
        loader.hook::<TrySaveGame, _>(&handle, 100, |inv| {
            let (_, app_exit) = *inv.args();
            if app_exit {
                tracing::info!("Exit save, journal skipped");
                Directive::SkipToOriginal
            } else {
                Directive::Continue
            }
        })?;
    }

    persist_before::<TrySaveGame>(loader, &handle, journal)?;

    tracing::info!("{} registered on {}", TrySaveGame::identity(), loader.table().platform());
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn test_manifest_declares_classes() {
        let manifest = manifest();
        assert_eq!(manifest.id.as_str(), MOD_ID);

        let names: Vec<_> = manifest.classes.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["cocos2d::CCObject", "GameManager"]);
    }

    #[test]
    fn test_game_manager_declaration() {
        let decl = GameManager::declaration();
        assert_eq!(decl.layout.size, size_of::<GameManager>());
        assert_eq!(decl.layout.base.as_deref(), Some("cocos2d::CCObject"));

        let clicks = decl.field("m_clickCount").unwrap();
        assert_eq!(clicks.offset, offset_of!(GameManager, click_count));
        assert_eq!(clicks.size, 4);
    }

    #[test]
    fn test_layout_manifest_json() {
        let platform: PlatformKey = "android-arm@2.206".parse().unwrap();
        let json = layout_manifest(&platform).to_json().unwrap();

        let parsed = LayoutManifest::from_json(&json).unwrap();
        assert_eq!(parsed.mod_id, MOD_ID);
        assert_eq!(parsed.platform().unwrap(), platform);
        assert_eq!(parsed.classes.len(), 2);
    }

    #[test]
    fn test_journal_appends() {
        let path = std::env::temp_dir().join(format!("save_logger-{}.txt", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let journal = SaveJournal::new(&path);
        journal.persist_now().unwrap();
        journal.persist_now().unwrap();

        assert_eq!(journal.saves(), 2);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "save #1\nsave #2\n");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_journal_reports_failure() {
        let journal = SaveJournal::new("/nonexistent-dir/journal.txt");
        assert!(journal.persist_now().is_err());
    }
}
