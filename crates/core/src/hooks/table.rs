//! Owned registry of installed hooks

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use slotmap::SlotMap;

use shadowhook_engine::HostImage;
use shadowhook_sdk::{FunctionIdentity, PlatformKey};

use super::dispatch::{Directive, Interceptor, Invocation};
use super::entry::{ErasedEntry, HookEntry};
use super::error::InstallationError;
use super::function::HostFunction;
use super::slot::resolve_slot;
use super::InterceptorKey;
use crate::descriptor::PlatformDescriptor;
use crate::mods::ModId;

/// Per-identity cell; its mutex serializes install and uninstall
type EntryCell = Arc<Mutex<Option<Arc<dyn ErasedEntry>>>>;

struct InterceptorRecord {
    identity: FunctionIdentity,
    owner: ModId,
}

/// Registry mapping function identities to installed hooks
///
/// Created once at framework init for one platform descriptor and host
/// image. Dropping the table uninstalls everything it installed.
pub struct HookTable {
    descriptor: Arc<PlatformDescriptor>,
    image: HostImage,
    entries: DashMap<FunctionIdentity, EntryCell>,
    interceptors: RwLock<SlotMap<InterceptorKey, InterceptorRecord>>,
    sequence: AtomicU64,
}

impl HookTable {
    pub fn new(descriptor: Arc<PlatformDescriptor>, image: HostImage) -> Self {
        Self {
            descriptor,
            image,
            entries: DashMap::new(),
            interceptors: RwLock::new(SlotMap::with_key()),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn platform(&self) -> &PlatformKey {
        self.descriptor.platform()
    }

    pub fn descriptor(&self) -> &Arc<PlatformDescriptor> {
        &self.descriptor
    }

    pub fn image(&self) -> &HostImage {
        &self.image
    }

    fn cell(&self, identity: &FunctionIdentity) -> EntryCell {
        Arc::clone(self.entries.entry(identity.clone()).or_default().value())
    }

    fn existing_cell(&self, identity: &FunctionIdentity) -> Option<EntryCell> {
        self.entries.get(identity).map(|cell| Arc::clone(cell.value()))
    }

    /// Route calls of `F` through the dispatcher
    ///
    /// Idempotent: a second call returns the entry already installed
    /// without touching the host again.
    pub fn install<F: HostFunction>(&self) -> Result<Arc<HookEntry<F>>, InstallationError> {
        let identity = F::identity();
        let cell = self.cell(&identity);
        let mut current = cell.lock();
        self.install_locked::<F>(identity, &mut current)
    }

    fn install_locked<F: HostFunction>(
        &self,
        identity: FunctionIdentity,
        current: &mut Option<Arc<dyn ErasedEntry>>,
    ) -> Result<Arc<HookEntry<F>>, InstallationError> {
        if let Some(existing) = current.as_ref() {
            return Arc::clone(existing)
                .into_any()
                .downcast::<HookEntry<F>>()
                .map_err(|_| InstallationError::SignatureConflict { identity });
        }

        if F::binding().is_bound() {
            return Err(InstallationError::BoundElsewhere { identity });
        }

        let slot = resolve_slot(&self.descriptor, &self.image, &identity)?;
        if slot.original().is_null() {
            return Err(InstallationError::NullOriginal { identity });
        }
        let address = slot.address();

        let entry = Arc::new(HookEntry::<F>::new(identity, slot));
        F::binding().publish(Arc::clone(&entry));

        if let Err(e) = entry.redirect() {
            F::binding().withdraw();
            return Err(e);
        }

        tracing::info!(
            "Installed hook on {} at {:#x} (original {:#x})",
            entry.identity(),
            address,
            entry.original() as usize
        );

        *current = Some(Arc::clone(&entry) as Arc<dyn ErasedEntry>);
        Ok(entry)
    }

    /// Restore the original dispatch of `identity`
    ///
    /// Only an entry without interceptors is uninstalled; returns whether
    /// the host was restored.
    pub fn uninstall(&self, identity: &FunctionIdentity) -> Result<bool, InstallationError> {
        let Some(cell) = self.existing_cell(identity) else {
            return Ok(false);
        };

        let mut current = cell.lock();
        let empty = current.as_ref().is_some_and(|e| e.interceptor_count() == 0);
        if !empty {
            return Ok(false);
        }
        self.uninstall_locked(&mut current)
    }

    fn uninstall_locked(
        &self,
        current: &mut Option<Arc<dyn ErasedEntry>>,
    ) -> Result<bool, InstallationError> {
        let Some(entry) = current.take() else {
            return Ok(false);
        };

        if let Err(e) = entry.restore() {
            tracing::error!("Failed to restore {}: {}", entry.identity(), e);
            *current = Some(entry);
            return Err(e);
        }

        let orphaned = entry.clear_interceptors();
        if !orphaned.is_empty() {
            let mut interceptors = self.interceptors.write();
            for key in orphaned {
                interceptors.remove(key);
            }
        }

        tracing::info!("Uninstalled hook on {}", entry.identity());
        Ok(true)
    }

    /// Attach an interceptor to `F`, installing the hook on first use
    pub(crate) fn hook<F, C>(
        &self,
        owner: ModId,
        priority: i32,
        callback: C,
    ) -> Result<InterceptorKey, InstallationError>
    where
        F: HostFunction,
        C: Fn(&mut Invocation<'_, F>) -> Directive<F::Output> + Send + Sync + 'static,
    {
        let identity = F::identity();
        let cell = self.cell(&identity);
        let mut current = cell.lock();

        let entry = self.install_locked::<F>(identity.clone(), &mut current)?;

        let key = self.interceptors.write().insert(InterceptorRecord {
            identity,
            owner: owner.clone(),
        });
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            "Mod '{}' intercepts {} at priority {}",
            owner,
            entry.identity(),
            priority
        );

        entry.add_interceptor(Interceptor::new(key, owner, priority, sequence, Arc::new(callback)));
        Ok(key)
    }

    /// Detach one interceptor
    ///
    /// Removing the last interceptor of a function uninstalls its hook.
    pub fn unhook(&self, key: InterceptorKey) -> Result<(), InstallationError> {
        self.detach(key, None)
    }

    /// Detach one interceptor registered by `owner`
    ///
    /// A key registered by another mod is reported as unknown and left in
    /// place.
    pub fn unhook_owned(&self, key: InterceptorKey, owner: &ModId) -> Result<(), InstallationError> {
        self.detach(key, Some(owner))
    }

    fn detach(&self, key: InterceptorKey, owner: Option<&ModId>) -> Result<(), InstallationError> {
        let owned_by = |record: &InterceptorRecord| owner.map_or(true, |owner| &record.owner == owner);

        let identity = self
            .interceptors
            .read()
            .get(key)
            .filter(|record| owned_by(record))
            .map(|record| record.identity.clone())
            .ok_or(InstallationError::UnknownInterceptor)?;

        let cell = self
            .existing_cell(&identity)
            .ok_or(InstallationError::UnknownInterceptor)?;
        let mut current = cell.lock();

        {
            let mut interceptors = self.interceptors.write();
            if !interceptors.get(key).is_some_and(|record| owned_by(record)) {
                return Err(InstallationError::UnknownInterceptor);
            }
            interceptors.remove(key);
        }

        if let Some(entry) = current.as_ref() {
            entry.remove_interceptor(key);
            if entry.interceptor_count() == 0 {
                self.uninstall_locked(&mut current)?;
            }
        }

        Ok(())
    }

    /// Detach every interceptor registered by `owner`
    ///
    /// Returns the number removed. Failures to restore a host slot are
    /// logged and leave that hook installed as a pass-through.
    pub fn remove_owner(&self, owner: &ModId) -> usize {
        let cells: Vec<EntryCell> = self.entries.iter().map(|cell| Arc::clone(cell.value())).collect();
        let mut removed = 0;

        for cell in cells {
            let mut current = cell.lock();
            let Some(entry) = current.as_ref() else {
                continue;
            };

            let keys = entry.remove_owner(owner);
            if keys.is_empty() {
                continue;
            }

            removed += keys.len();
            {
                let mut interceptors = self.interceptors.write();
                for key in keys {
                    interceptors.remove(key);
                }
            }

            if entry.interceptor_count() == 0 {
                // Logged inside
                let _ = self.uninstall_locked(&mut current);
            }
        }

        if removed > 0 {
            tracing::info!("Removed {} interceptor(s) of mod '{}'", removed, owner);
        }
        removed
    }

    /// Installed entry of `F` in this table
    pub fn entry<F: HostFunction>(&self) -> Option<Arc<HookEntry<F>>> {
        let cell = self.existing_cell(&F::identity())?;
        let entry = Arc::clone(cell.lock().as_ref()?);
        entry.into_any().downcast::<HookEntry<F>>().ok()
    }

    fn with_entry<R>(
        &self,
        identity: &FunctionIdentity,
        f: impl FnOnce(&dyn ErasedEntry) -> R,
    ) -> Option<R> {
        let cell = self.existing_cell(identity)?;
        let current = cell.lock();
        current.as_deref().map(f)
    }

    pub fn is_installed(&self, identity: &FunctionIdentity) -> bool {
        self.with_entry(identity, |e| e.is_installed()).unwrap_or(false)
    }

    pub fn interceptor_count(&self, identity: &FunctionIdentity) -> usize {
        self.with_entry(identity, |e| e.interceptor_count()).unwrap_or(0)
    }

    /// Number of functions currently routed through the dispatcher
    pub fn installed_count(&self) -> usize {
        let cells: Vec<EntryCell> = self.entries.iter().map(|cell| Arc::clone(cell.value())).collect();
        cells
            .iter()
            .filter(|cell| cell.lock().as_ref().is_some_and(|e| e.is_installed()))
            .count()
    }

    /// Uninstall every hook, whatever its interceptors
    pub fn shutdown(&self) {
        let cells: Vec<EntryCell> = self.entries.iter().map(|cell| Arc::clone(cell.value())).collect();
        let mut restored = 0;

        for cell in cells {
            let mut current = cell.lock();
            if let Ok(true) = self.uninstall_locked(&mut current) {
                restored += 1;
            }
        }

        self.interceptors.write().clear();

        if restored > 0 {
            tracing::info!("Hook table shut down, {} hook(s) restored", restored);
        }
    }
}

impl Drop for HookTable {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::c_void;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SLOTS: usize = 8;

    /// A fake host: one vtable of native functions, described at RVA 0
    struct Fixture {
        table: HookTable,
        vtable: Box<[usize; SLOTS]>,
    }

    impl Fixture {
        fn new(functions: &[(&str, usize)], slots: &[usize]) -> Self {
            let mut vtable = Box::new([0usize; SLOTS]);
            vtable[..slots.len()].copy_from_slice(slots);

            let functions = functions
                .iter()
                .map(|(identity, index)| format!(r#""{}": {{ "vtable": {} }}"#, identity, index))
                .collect::<Vec<_>>()
                .join(",");

            let json = format!(
                r#"{{
                    "platform": "{}",
                    "classes": {{
                        "Widget": {{ "size": 16, "vtable": 0 }},
                        "Plain": {{ "size": 8 }}
                    }},
                    "functions": {{ {} }}
                }}"#,
                PlatformKey::current("test").unwrap(),
                functions
            );

            let descriptor = PlatformDescriptor::load_from_str(&json).unwrap();
            let image = HostImage::new(
                "vtable",
                vtable.as_ptr() as *const u8,
                SLOTS * std::mem::size_of::<usize>(),
            )
            .unwrap();

            Self {
                table: HookTable::new(Arc::new(descriptor), image),
                vtable,
            }
        }

        fn slot(&self, index: usize) -> usize {
            unsafe { (*(self.vtable.as_ptr().add(index) as *const AtomicUsize)).load(Ordering::SeqCst) }
        }

        /// Call through the vtable, as the host would
        fn call(&self, index: usize, value: i32) -> i32 {
            let f: extern "C" fn(*mut c_void, i32) -> i32 =
                unsafe { std::mem::transmute(self.slot(index)) };
            f(std::ptr::null_mut(), value)
        }
    }

    fn mod_id(name: &str) -> ModId {
        ModId::from(name)
    }

    extern "C" fn double(_this: *mut c_void, value: i32) -> i32 {
        value * 2
    }

    extern "C" fn identity(_this: *mut c_void, value: i32) -> i32 {
        value
    }

    crate::host_function! {
        InstallTwice("Widget", "grow", "int") = fn(this: *mut c_void, value: i32) -> i32;
        Ordered("Widget", "order", "int") = fn(this: *mut c_void, value: i32) -> i32;
        Directed("Widget", "direct", "int") = fn(this: *mut c_void, value: i32) -> i32;
        Rewritten("Widget", "rewrite", "int") = fn(this: *mut c_void, value: i32) -> i32;
        Restored("Widget", "restore", "int") = fn(this: *mut c_void, value: i32) -> i32;
        Owned("Widget", "own", "int") = fn(this: *mut c_void, value: i32) -> i32;
        Panicky("Widget", "panic", "int") = fn(this: *mut c_void, value: i32) -> i32;
        Contended("Widget", "contend", "int") = fn(this: *mut c_void, value: i32) -> i32;
        ConflictA("Widget", "conflict", "int") = fn(this: *mut c_void, value: i32) -> i32;
        ConflictB("Widget", "conflict", "int") = fn(this: *mut c_void, value: i64) -> i64;
        Unknown("Widget", "missing", "") = fn(this: *mut c_void) -> i32;
        NoVtable("Plain", "run", "int") = fn(this: *mut c_void, value: i32) -> i32;
        CalledThrough("Widget", "through", "int") = fn(this: *mut c_void, value: i32) -> i32;
        CalledNext("Widget", "next", "int") = fn(this: *mut c_void, value: i32) -> i32;
        Frozen("Widget", "frozen", "int") = fn(this: *mut c_void, value: i32) -> i32;
    }

    #[test]
    fn test_install_is_idempotent() {
        let fx = Fixture::new(&[("Widget::grow(int)", 0)], &[double as usize]);

        let first = fx.table.install::<InstallTwice>().unwrap();
        let second = fx.table.install::<InstallTwice>().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fx.slot(0), InstallTwice::detour() as usize);
        assert_eq!(first.original() as usize, double as usize);
        assert_eq!(fx.table.installed_count(), 1);

        // No interceptors: a plain pass-through
        assert_eq!(fx.call(0, 21), 42);
    }

    #[test]
    fn test_dispatch_order_by_priority_then_registration() {
        let fx = Fixture::new(&[("Widget::order(int)", 0)], &[identity as usize]);
        let seen = Arc::new(Mutex::new(Vec::new()));

        for (name, priority) in [("d", 1), ("b", 5), ("a", 10), ("c", 5)] {
            let seen = Arc::clone(&seen);
            fx.table
                .hook::<Ordered, _>(mod_id(name), priority, move |_| {
                    seen.lock().push(name);
                    Directive::Continue
                })
                .unwrap();
        }

        assert_eq!(fx.call(0, 7), 7);
        assert_eq!(*seen.lock(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_skip_and_return_directives() {
        static ORIGINAL_CALLS: AtomicUsize = AtomicUsize::new(0);
        extern "C" fn counted(_this: *mut c_void, value: i32) -> i32 {
            ORIGINAL_CALLS.fetch_add(1, Ordering::SeqCst);
            value
        }

        let fx = Fixture::new(&[("Widget::direct(int)", 2)], &[0, 0, counted as usize]);
        let later = Arc::new(AtomicUsize::new(0));

        fx.table
            .hook::<Directed, _>(mod_id("gate"), 10, |inv| match inv.args().1 {
                0 => Directive::SkipToOriginal,
                1 => Directive::Return(-1),
                _ => Directive::Continue,
            })
            .unwrap();
        let counter = Arc::clone(&later);
        fx.table
            .hook::<Directed, _>(mod_id("late"), 0, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Directive::Continue
            })
            .unwrap();

        assert_eq!(fx.call(2, 0), 0);
        assert_eq!(later.load(Ordering::SeqCst), 0);
        assert_eq!(ORIGINAL_CALLS.load(Ordering::SeqCst), 1);

        assert_eq!(fx.call(2, 1), -1);
        assert_eq!(later.load(Ordering::SeqCst), 0);
        assert_eq!(ORIGINAL_CALLS.load(Ordering::SeqCst), 1);

        assert_eq!(fx.call(2, 5), 5);
        assert_eq!(later.load(Ordering::SeqCst), 1);
        assert_eq!(ORIGINAL_CALLS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_argument_rewrite_and_call_next() {
        let fx = Fixture::new(&[("Widget::rewrite(int)", 0)], &[double as usize]);

        // Runs first: wraps the rest of the chain
        fx.table
            .hook::<Rewritten, _>(mod_id("outer"), 10, |inv| {
                let result = inv.call_next();
                Directive::Return(result + 1)
            })
            .unwrap();
        fx.table
            .hook::<Rewritten, _>(mod_id("inner"), 0, |inv| {
                inv.args_mut().1 += 100;
                Directive::Continue
            })
            .unwrap();

        // (3 + 100) * 2 + 1
        assert_eq!(fx.call(0, 3), 207);
    }

    #[test]
    fn test_removing_last_interceptor_restores_slot() {
        let fx = Fixture::new(&[("Widget::restore(int)", 1)], &[0, double as usize]);
        let id = Restored::identity();

        let first = fx
            .table
            .hook::<Restored, _>(mod_id("a"), 0, |_| Directive::Return(0))
            .unwrap();
        let second = fx
            .table
            .hook::<Restored, _>(mod_id("b"), 0, |_| Directive::Continue)
            .unwrap();
        assert_eq!(fx.call(1, 4), 0);

        // Not empty yet: uninstall refuses
        assert!(!fx.table.uninstall(&id).unwrap());

        fx.table.unhook(first).unwrap();
        assert!(fx.table.is_installed(&id));
        assert_eq!(fx.call(1, 4), 8);

        fx.table.unhook(second).unwrap();
        assert!(!fx.table.is_installed(&id));
        assert_eq!(fx.slot(1), double as usize);
        assert_eq!(fx.call(1, 4), 8);
        assert!(fx.table.entry::<Restored>().is_none());

        assert!(matches!(
            fx.table.unhook(second),
            Err(InstallationError::UnknownInterceptor)
        ));
    }

    #[test]
    fn test_remove_owner() {
        let fx = Fixture::new(&[("Widget::own(int)", 0)], &[identity as usize]);
        let id = Owned::identity();

        fx.table
            .hook::<Owned, _>(mod_id("keep"), 0, |inv| {
                inv.args_mut().1 += 1;
                Directive::Continue
            })
            .unwrap();
        for _ in 0..2 {
            fx.table
                .hook::<Owned, _>(mod_id("drop"), 0, |inv| {
                    inv.args_mut().1 += 10;
                    Directive::Continue
                })
                .unwrap();
        }
        assert_eq!(fx.call(0, 0), 21);

        assert_eq!(fx.table.remove_owner(&mod_id("drop")), 2);
        assert_eq!(fx.table.interceptor_count(&id), 1);
        assert_eq!(fx.call(0, 0), 1);

        assert_eq!(fx.table.remove_owner(&mod_id("keep")), 1);
        assert!(!fx.table.is_installed(&id));
        assert_eq!(fx.slot(0), identity as usize);
    }

    #[test]
    fn test_panicking_interceptor_falls_through() {
        static ORIGINAL_CALLS: AtomicUsize = AtomicUsize::new(0);
        extern "C" fn counted(_this: *mut c_void, value: i32) -> i32 {
            ORIGINAL_CALLS.fetch_add(1, Ordering::SeqCst);
            value
        }

        let fx = Fixture::new(&[("Widget::panic(int)", 0)], &[counted as usize]);
        let later = Arc::new(AtomicUsize::new(0));

        fx.table
            .hook::<Panicky, _>(mod_id("broken"), 10, |inv| {
                inv.args_mut().1 = 999;
                panic!("interceptor failure");
            })
            .unwrap();
        let counter = Arc::clone(&later);
        fx.table
            .hook::<Panicky, _>(mod_id("after"), 0, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Directive::Continue
            })
            .unwrap();

        // Arguments as they were before the failing interceptor
        assert_eq!(fx.call(0, 5), 5);
        assert_eq!(ORIGINAL_CALLS.load(Ordering::SeqCst), 1);
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_original_runs_once_after_call_through() {
        static ORIGINAL_CALLS: AtomicUsize = AtomicUsize::new(0);
        extern "C" fn counted(_this: *mut c_void, value: i32) -> i32 {
            ORIGINAL_CALLS.fetch_add(1, Ordering::SeqCst);
            value * 3
        }

        let fx = Fixture::new(
            &[("Widget::through(int)", 0), ("Widget::next(int)", 1)],
            &[counted as usize, counted as usize],
        );

        fx.table
            .hook::<CalledThrough, _>(mod_id("broken"), 0, |inv| {
                let _ = inv.call_original();
                panic!("failed after calling through");
            })
            .unwrap();

        // The host already ran; its result stands
        assert_eq!(fx.call(0, 2), 6);
        assert_eq!(ORIGINAL_CALLS.load(Ordering::SeqCst), 1);

        let inner = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&inner);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&seen);
        fx.table
            .hook::<CalledNext, _>(mod_id("outer"), 10, move |inv| {
                let before = inv.has_called_through();
                let first = inv.call_next();
                // Repeated calls reuse the result instead of calling again
                let second = inv.call_original();
                record.lock().push((before, first, second));
                Directive::Continue
            })
            .unwrap();
        fx.table
            .hook::<CalledNext, _>(mod_id("inner"), 0, move |inv| {
                counter.fetch_add(1, Ordering::SeqCst);
                inv.args_mut().1 += 1;
                Directive::Continue
            })
            .unwrap();

        assert_eq!(fx.call(1, 2), 9);
        assert_eq!(*seen.lock(), vec![(false, 9, 9)]);
        assert_eq!(inner.load(Ordering::SeqCst), 1);
        assert_eq!(ORIGINAL_CALLS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_dispatch_during_removal() {
        let fx = Fixture::new(&[("Widget::contend(int)", 0)], &[identity as usize]);

        fx.table
            .hook::<Contended, _>(mod_id("one"), 10, |inv| {
                inv.args_mut().1 += 1;
                Directive::Continue
            })
            .unwrap();
        let removed = fx
            .table
            .hook::<Contended, _>(mod_id("ten"), 0, |inv| {
                inv.args_mut().1 += 10;
                Directive::Continue
            })
            .unwrap();

        std::thread::scope(|s| {
            for _ in 0..2 {
                s.spawn(|| {
                    for _ in 0..10_000 {
                        let result = fx.call(0, 0);
                        // Full chain or the chain after removal, never a mix
                        assert!(result == 11 || result == 1, "observed {}", result);
                    }
                });
            }

            s.spawn(|| {
                std::thread::yield_now();
                fx.table.unhook(removed).unwrap();
            });
        });

        assert_eq!(fx.call(0, 0), 1);
    }

    #[test]
    fn test_signature_conflict() {
        let fx = Fixture::new(&[("Widget::conflict(int)", 0)], &[double as usize]);

        fx.table.install::<ConflictA>().unwrap();
        assert!(matches!(
            fx.table.install::<ConflictB>(),
            Err(InstallationError::SignatureConflict { .. })
        ));
        assert_eq!(fx.slot(0), ConflictA::detour() as usize);
    }

    #[test]
    fn test_rejected_install_has_no_side_effects() {
        let fx = Fixture::new(&[("Plain::run(int)", 0)], &[double as usize]);

        assert!(matches!(
            fx.table.install::<Unknown>(),
            Err(InstallationError::UnknownFunction { .. })
        ));
        assert!(matches!(
            fx.table.hook::<NoVtable, _>(mod_id("m"), 0, |_| Directive::Continue),
            Err(InstallationError::MissingVtable { .. })
        ));

        assert_eq!(fx.table.installed_count(), 0);
        assert_eq!(fx.slot(0), double as usize);
        assert!(!Unknown::binding().is_bound());
        assert!(!NoVtable::binding().is_bound());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_redirect_leaves_nothing_installed() {
        use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};
        use std::num::NonZeroUsize;

        // A vtable in a shared mapping of a read-only file can never be
        // made writable
        let path = std::env::temp_dir().join(format!("shadowhook-frozen-{}", std::process::id()));
        let bytes = (double as usize).to_ne_bytes();
        std::fs::write(&path, bytes).unwrap();
        let file = std::fs::File::open(&path).unwrap();

        let len = NonZeroUsize::new(bytes.len()).unwrap();
        let mapped = unsafe { mmap(None, len, ProtFlags::PROT_READ, MapFlags::MAP_SHARED, &file, 0) }.unwrap();
        let base = mapped.as_ptr() as *const u8;

        let json = format!(
            r#"{{
                "platform": "{}",
                "classes": {{ "Widget": {{ "size": 16, "vtable": 0 }} }},
                "functions": {{ "Widget::frozen(int)": {{ "vtable": 0 }} }}
            }}"#,
            PlatformKey::current("test").unwrap()
        );
        let descriptor = PlatformDescriptor::load_from_str(&json).unwrap();
        let table = HookTable::new(Arc::new(descriptor), HostImage::new("frozen", base, bytes.len()).unwrap());

        assert!(matches!(
            table.hook::<Frozen, _>(mod_id("m"), 0, |_| Directive::Continue),
            Err(InstallationError::Protection { .. })
        ));
        assert!(!Frozen::binding().is_bound());
        assert_eq!(table.installed_count(), 0);
        assert_eq!(table.interceptor_count(&Frozen::identity()), 0);
        assert!(table.entry::<Frozen>().is_none());
        assert_eq!(unsafe { (base as *const usize).read() }, double as usize);

        drop(table);
        unsafe { munmap(mapped, bytes.len()).unwrap() };
        let _ = std::fs::remove_file(&path);
    }

    #[cfg(all(target_arch = "x86_64", unix))]
    #[test]
    fn test_inline_detour_on_direct_entry_point() {
        crate::host_function! {
            AddOne("Adder", "add", "int") = fn(value: i32) -> i32;
        }

        // push rbp; mov rbp, rsp; lea eax, [rdi+1]; 7 x nop; pop rbp; ret
        const CODE: [u8; 16] = [
            0x55, 0x48, 0x89, 0xE5, 0x8D, 0x47, 0x01, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90,
            0x5D, 0xC3,
        ];

        let page = region::page::size();
        let mut code = region::alloc(page, region::Protection::READ_WRITE_EXECUTE).unwrap();
        let base = code.as_mut_ptr::<u8>();
        unsafe { std::ptr::copy_nonoverlapping(CODE.as_ptr(), base, CODE.len()) };

        let json = format!(
            r#"{{ "platform": "{}", "functions": {{ "Adder::add(int)": {{ "address": 0 }} }} }}"#,
            PlatformKey::current("test").unwrap()
        );
        let descriptor = PlatformDescriptor::load_from_str(&json).unwrap();
        let image = HostImage::new("code", base, page).unwrap();
        let table = HookTable::new(Arc::new(descriptor), image);

        let add: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(base) };
        assert_eq!(add(1), 2);

        let key = table
            .hook::<AddOne, _>(mod_id("m"), 0, |inv| Directive::Return(inv.call_original() * 10))
            .unwrap();
        assert_eq!(add(1), 20);

        table.unhook(key).unwrap();
        assert_eq!(add(1), 2);
        assert_eq!(unsafe { std::slice::from_raw_parts(base, CODE.len()) }, &CODE);
    }
}
