//! C-compatible exports called by the host-side bootstrap

use std::ffi::{c_char, c_void};

use parking_lot::RwLock;
use tracing::instrument;
use tracing_subscriber::EnvFilter;

use shadowhook_core::config::{shadowhook_base_dir, FrameworkConfig};
use shadowhook_core::{Framework, FrameworkError};
use shadowhook_engine::HostImage;

// Loader metadata - static strings with null terminators for C compatibility
static NAME: &[u8] = b"shadowhook\0";
static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();

/// Environment variable holding the log filter
const LOG_ENV: &str = "SHADOWHOOK_LOG";

static FRAMEWORK: RwLock<Option<Framework>> = RwLock::new(None);

/// Run `f` against the running framework
///
/// Returns `None` before `shadowhook_init` succeeded or after shutdown.
pub fn with_framework<R>(f: impl FnOnce(&Framework) -> R) -> Option<R> {
    FRAMEWORK.read().as_ref().map(f)
}

pub fn is_running() -> bool {
    FRAMEWORK.read().is_some()
}

fn init_logging(debug: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn start(image_base: *const c_void, image_size: usize) -> Result<Framework, FrameworkError> {
    let base = shadowhook_base_dir()?;
    let config = FrameworkConfig::load()?;
    init_logging(config.debug);

    tracing::info!("shadowhook loading from {:?}...", base);

    let image = if image_base.is_null() {
        HostImage::locate("")?
    } else {
        HostImage::new("host", image_base as *const u8, image_size)?
    };

    Framework::from_config(config, &base, image)
}

/// Called once by the bootstrap after loading this library
///
/// A null `image_base` makes the loader locate the main executable itself.
///
/// # Safety
/// - `image_base`, when not null, must be the load base of the host binary
///   with `image_size` mapped bytes
/// - `error` must be a valid pointer to a buffer of at least `maxlen` bytes, or null
#[no_mangle]
#[instrument(skip_all)]
pub unsafe extern "C" fn shadowhook_init(
    image_base: *const c_void,
    image_size: usize,
    error: *mut c_char,
    maxlen: usize,
) -> bool {
    let mut framework = FRAMEWORK.write();
    if framework.is_some() {
        write_error(error, maxlen, "shadowhook is already running");
        return false;
    }

    match std::panic::catch_unwind(|| start(image_base, image_size)) {
        Ok(Ok(started)) => {
            tracing::info!("shadowhook loaded successfully on {}", started.platform());
            *framework = Some(started);
            true
        }
        Ok(Err(e)) => {
            tracing::error!("Failed to start shadowhook: {}", e);
            write_error(error, maxlen, &e.to_string());
            false
        }
        Err(_) => {
            write_error(error, maxlen, "Panic during startup");
            false
        }
    }
}

/// Called by the bootstrap before the host exits or unloads this library
///
/// # Safety
/// - `error` must be a valid pointer to a buffer of at least `maxlen` bytes, or null
#[no_mangle]
#[instrument(skip_all)]
pub unsafe extern "C" fn shadowhook_shutdown(error: *mut c_char, maxlen: usize) -> bool {
    tracing::info!("shadowhook unloading...");

    let result = std::panic::catch_unwind(|| {
        if let Some(framework) = FRAMEWORK.write().take() {
            framework.shutdown();
        }
    });

    match result {
        Ok(()) => true,
        Err(_) => {
            write_error(error, maxlen, "Panic during shutdown");
            false
        }
    }
}

// Metadata exports - these return static strings for the bootstrap to display

#[no_mangle]
pub extern "C" fn shadowhook_get_name() -> *const c_char {
    NAME.as_ptr() as *const c_char
}

#[no_mangle]
pub extern "C" fn shadowhook_get_version() -> *const c_char {
    VERSION.as_ptr() as *const c_char
}

/// Helper to write error message to C buffer
///
/// # Safety
/// - `error` must be a valid pointer to a buffer of at least `maxlen` bytes, or null
unsafe fn write_error(error: *mut c_char, maxlen: usize, msg: &str) {
    if !error.is_null() && maxlen > 0 {
        let bytes = msg.as_bytes();
        let len = bytes.len().min(maxlen - 1);
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), error as *mut u8, len);
        *error.add(len) = 0;
    }
}
