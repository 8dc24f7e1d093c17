//! Config path resolution
//!
//! Handles resolving paths for configuration files based on the framework
//! library's location.

use std::path::PathBuf;

use super::{ConfigError, ConfigResult};

/// Environment variable overriding the base directory
pub const HOME_ENV: &str = "SHADOWHOOK_HOME";

/// Returns the shadowhook base directory.
///
/// `SHADOWHOOK_HOME` wins when set. Otherwise the framework library is
/// expected at:
/// `<base>/bin/libshadowhook.so`
///
/// and this navigates up 2 levels to reach `<base>/`.
pub fn shadowhook_base_dir() -> ConfigResult<PathBuf> {
    if let Some(home) = std::env::var_os(HOME_ENV) {
        return Ok(PathBuf::from(home));
    }

    let library = library_path()?;

    // Navigate: libshadowhook.so -> bin -> base
    library
        .parent() // bin/
        .and_then(|p| p.parent()) // base/
        .map(PathBuf::from)
        .ok_or(ConfigError::NoConfigDirectory)
}

/// Path of the object this code was linked into
#[cfg(unix)]
fn library_path() -> ConfigResult<PathBuf> {
    use std::ffi::CStr;
    use std::os::unix::ffi::OsStrExt;

    let mut info: libc::Dl_info = unsafe { std::mem::zeroed() };
    let anchor = library_path as fn() -> ConfigResult<PathBuf> as *const libc::c_void;

    let found = unsafe { libc::dladdr(anchor, &mut info) } != 0;
    if !found || info.dli_fname.is_null() {
        return std::env::current_exe().map_err(ConfigError::IoError);
    }

    let name = unsafe { CStr::from_ptr(info.dli_fname) };
    Ok(PathBuf::from(std::ffi::OsStr::from_bytes(name.to_bytes())))
}

#[cfg(not(unix))]
fn library_path() -> ConfigResult<PathBuf> {
    std::env::current_exe().map_err(ConfigError::IoError)
}

/// Returns the base configs directory.
///
/// Path: `<base>/configs/`
pub fn configs_dir() -> ConfigResult<PathBuf> {
    Ok(shadowhook_base_dir()?.join("configs"))
}

/// Returns the path for a mod's config file.
///
/// Path: `<base>/configs/mods/{mod_id}/{mod_id}.toml`
pub fn mod_config_path(mod_id: &str) -> ConfigResult<PathBuf> {
    Ok(mod_config_path_in(&configs_dir()?, mod_id))
}

fn mod_config_path_in(configs: &std::path::Path, mod_id: &str) -> PathBuf {
    configs
        .join("mods")
        .join(mod_id)
        .join(format!("{}.toml", mod_id))
}

/// Returns the core framework config path.
///
/// Path: `<base>/configs/core.toml`
pub fn core_config_path() -> ConfigResult<PathBuf> {
    Ok(configs_dir()?.join("core.toml"))
}
