//! Per-function hook state

use std::any::Any;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use shadowhook_sdk::FunctionIdentity;

use super::dispatch::Interceptor;
use super::error::InstallationError;
use super::function::HostFunction;
use super::slot::DispatchSlot;
use super::InterceptorKey;
use crate::mods::ModId;

/// Installed hook for one host function
///
/// Owned by the [`HookTable`](super::HookTable); the binding and in-flight
/// dispatches hold extra references, so an entry outlives its removal from
/// the table until the last call through it returns.
pub struct HookEntry<F: HostFunction> {
    identity: FunctionIdentity,
    slot: Mutex<DispatchSlot>,
    original: usize,
    chain: RwLock<Arc<[Interceptor<F>]>>,
    installed: AtomicBool,
}

impl<F: HostFunction> HookEntry<F> {
    pub(crate) fn new(identity: FunctionIdentity, slot: DispatchSlot) -> Self {
        let original = slot.original() as usize;
        Self {
            identity,
            slot: Mutex::new(slot),
            original,
            chain: RwLock::new(Arc::from(Vec::new())),
            installed: AtomicBool::new(false),
        }
    }

    pub fn identity(&self) -> &FunctionIdentity {
        &self.identity
    }

    /// Entry point that runs the host's own implementation
    pub fn original(&self) -> *const () {
        self.original as *const ()
    }

    /// Whether the host's dispatch slot currently points at the detour
    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    /// Snapshot of the interceptor chain, in dispatch order
    ///
    /// The snapshot never changes; later registrations and removals publish
    /// a new chain instead.
    pub fn chain(&self) -> Arc<[Interceptor<F>]> {
        self.chain.read().clone()
    }

    pub fn interceptor_count(&self) -> usize {
        self.chain.read().len()
    }

    /// Point the host's dispatch slot at the detour thunk
    pub(crate) fn redirect(&self) -> Result<(), InstallationError> {
        let mut slot = self.slot.lock();
        unsafe { slot.redirect(F::detour())? };
        self.installed.store(true, Ordering::Release);
        Ok(())
    }

    /// Publish a chain with one more interceptor
    pub(crate) fn add_interceptor(&self, interceptor: Interceptor<F>) {
        let mut chain = self.chain.write();
        let mut next: Vec<_> = chain.iter().cloned().collect();
        next.push(interceptor);
        // Higher priority first, registration order among equals
        next.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then(a.sequence().cmp(&b.sequence()))
        });
        *chain = Arc::from(next);
    }

    /// Publish a chain without the interceptors matching `remove`
    fn retain_chain(&self, mut remove: impl FnMut(&Interceptor<F>) -> bool) -> Vec<InterceptorKey> {
        let mut chain = self.chain.write();
        if !chain.iter().any(&mut remove) {
            return Vec::new();
        }

        let (removed, kept): (Vec<_>, Vec<_>) = chain.iter().cloned().partition(|i| remove(i));
        *chain = Arc::from(kept);
        removed.iter().map(Interceptor::key).collect()
    }
}

/// Type-erased view of a [`HookEntry`] for the table's identity map
pub(crate) trait ErasedEntry: Send + Sync {
    fn identity(&self) -> &FunctionIdentity;

    fn is_installed(&self) -> bool;

    fn interceptor_count(&self) -> usize;

    fn remove_interceptor(&self, key: InterceptorKey) -> bool;

    fn remove_owner(&self, owner: &ModId) -> Vec<InterceptorKey>;

    fn clear_interceptors(&self) -> Vec<InterceptorKey>;

    /// Restore the host's dispatch slot and withdraw the binding
    fn restore(&self) -> Result<(), InstallationError>;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<F: HostFunction> ErasedEntry for HookEntry<F> {
    fn identity(&self) -> &FunctionIdentity {
        &self.identity
    }

    fn is_installed(&self) -> bool {
        HookEntry::is_installed(self)
    }

    fn interceptor_count(&self) -> usize {
        HookEntry::interceptor_count(self)
    }

    fn remove_interceptor(&self, key: InterceptorKey) -> bool {
        !self.retain_chain(|i| i.key() == key).is_empty()
    }

    fn remove_owner(&self, owner: &ModId) -> Vec<InterceptorKey> {
        self.retain_chain(|i| i.owner() == owner)
    }

    fn clear_interceptors(&self) -> Vec<InterceptorKey> {
        self.retain_chain(|_| true)
    }

    fn restore(&self) -> Result<(), InstallationError> {
        let mut slot = self.slot.lock();
        if self.installed.load(Ordering::Acquire) {
            unsafe { slot.restore()? };
            self.installed.store(false, Ordering::Release);
        }
        F::binding().withdraw();
        Ok(())
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Link between a function's detour thunk and its installed entry
///
/// One static binding exists per declared host function. The original
/// entry point is kept after the entry is withdrawn, so a call that entered
/// the thunk just before uninstall still reaches the host implementation.
pub struct Binding<F: HostFunction> {
    entry: RwLock<Option<Arc<HookEntry<F>>>>,
    original: AtomicPtr<()>,
}

impl<F: HostFunction> Binding<F> {
    pub const fn new() -> Self {
        Self {
            entry: RwLock::new(None),
            original: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Current entry, if the function is installed
    pub fn entry(&self) -> Option<Arc<HookEntry<F>>> {
        self.entry.read().clone()
    }

    /// Last known original entry point (null if never installed)
    pub fn original(&self) -> *const () {
        self.original.load(Ordering::Acquire) as *const ()
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.entry.read().is_some()
    }

    pub(crate) fn publish(&self, entry: Arc<HookEntry<F>>) {
        self.original
            .store(entry.original() as *mut (), Ordering::Release);
        *self.entry.write() = Some(entry);
    }

    pub(crate) fn withdraw(&self) {
        self.entry.write().take();
    }
}

impl<F: HostFunction> Default for Binding<F> {
    fn default() -> Self {
        Self::new()
    }
}
