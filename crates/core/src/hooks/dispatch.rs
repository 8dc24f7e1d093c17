//! Call dispatch through the interceptor chain

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::function::HostFunction;
use super::InterceptorKey;
use crate::mods::ModId;

/// What an interceptor wants to happen after it returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive<R> {
    /// Run the next interceptor, or the original if none remain
    Continue,

    /// Skip the remaining interceptors and run the original
    SkipToOriginal,

    /// Return this value to the host; nothing else runs
    Return(R),
}

/// Interceptor callback type
pub type InterceptorFn<F> =
    dyn Fn(&mut Invocation<'_, F>) -> Directive<<F as HostFunction>::Output> + Send + Sync;

/// One mod-supplied unit of logic attached to a host function
pub struct Interceptor<F: HostFunction> {
    key: InterceptorKey,
    owner: ModId,
    priority: i32,
    sequence: u64,
    callback: Arc<InterceptorFn<F>>,
}

impl<F: HostFunction> Interceptor<F> {
    pub(crate) fn new(
        key: InterceptorKey,
        owner: ModId,
        priority: i32,
        sequence: u64,
        callback: Arc<InterceptorFn<F>>,
    ) -> Self {
        Self {
            key,
            owner,
            priority,
            sequence,
            callback,
        }
    }

    pub fn key(&self) -> InterceptorKey {
        self.key
    }

    pub fn owner(&self) -> &ModId {
        &self.owner
    }

    /// Higher runs first
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Registration order, used to break priority ties
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl<F: HostFunction> Clone for Interceptor<F> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            owner: self.owner.clone(),
            priority: self.priority,
            sequence: self.sequence,
            callback: Arc::clone(&self.callback),
        }
    }
}

impl<F: HostFunction> fmt::Debug for Interceptor<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("key", &self.key)
            .field("owner", &self.owner)
            .field("priority", &self.priority)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

/// One intercepted call, as seen by an interceptor
///
/// Argument changes made through [`args_mut`](Self::args_mut) are seen by
/// later interceptors and by the original.
pub struct Invocation<'a, F: HostFunction> {
    args: F::Args,
    chain: &'a [Interceptor<F>],
    next: usize,
    original: *const (),
    output: Option<F::Output>,
}

impl<'a, F: HostFunction> Invocation<'a, F> {
    pub fn args(&self) -> &F::Args {
        &self.args
    }

    pub fn args_mut(&mut self) -> &mut F::Args {
        &mut self.args
    }

    /// Call the host implementation directly with the current arguments
    ///
    /// Remaining interceptors are skipped for the rest of this call. The
    /// host runs at most once per call: later calls return the first
    /// result, and so does any directive other than [`Directive::Return`].
    pub fn call_original(&mut self) -> F::Output {
        self.next = self.chain.len();
        if let Some(output) = &self.output {
            return output.clone();
        }

        let output = unsafe { F::call(self.original, self.args.clone()) };
        self.output = Some(output.clone());
        output
    }

    /// Run the rest of the chain and then the original, returning the result
    ///
    /// Runs synchronously on the calling thread. Like
    /// [`call_original`](Self::call_original), the remaining interceptors are
    /// consumed and the result is kept for the rest of the call.
    pub fn call_next(&mut self) -> F::Output {
        if let Some(output) = &self.output {
            return output.clone();
        }

        let start = self.next;
        self.next = self.chain.len();
        let output = run_chain::<F>(self.chain, start, self.args.clone(), self.original);
        self.output = Some(output.clone());
        output
    }

    /// Whether the rest of the call already ran
    pub fn has_called_through(&self) -> bool {
        self.output.is_some()
    }
}

/// Entry point of every detour thunk
///
/// With no installed entry (or an empty chain) this is a plain
/// pass-through to the original.
pub fn dispatch<F: HostFunction>(args: F::Args) -> F::Output {
    let binding = F::binding();

    match binding.entry() {
        Some(entry) => {
            let chain = entry.chain();
            run_chain::<F>(&chain, 0, args, entry.original())
        }
        None => {
            let original = binding.original();
            debug_assert!(!original.is_null(), "dispatch before install");
            unsafe { F::call(original, args) }
        }
    }
}

/// Run `chain[start..]` and, unless short-circuited, the original
pub(crate) fn run_chain<F: HostFunction>(
    chain: &[Interceptor<F>],
    start: usize,
    args: F::Args,
    original: *const (),
) -> F::Output {
    let mut invocation = Invocation {
        args,
        chain,
        next: start,
        original,
        output: None,
    };

    while invocation.next < chain.len() {
        let interceptor = &chain[invocation.next];
        invocation.next += 1;

        let before = invocation.args.clone();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            (interceptor.callback)(&mut invocation)
        }));

        match result {
            Ok(Directive::Continue) => {}
            Ok(Directive::SkipToOriginal) => break,
            Ok(Directive::Return(value)) => return value,
            Err(payload) => {
                tracing::error!(
                    "Interceptor of mod '{}' on {} panicked: {}; falling through to original",
                    interceptor.owner,
                    F::identity(),
                    panic_message(payload.as_ref())
                );
                invocation.args = before;
                break;
            }
        }
    }

    match invocation.output {
        Some(output) => output,
        None => unsafe { F::call(invocation.original, invocation.args) },
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
