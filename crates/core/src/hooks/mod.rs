//! Hook system
//!
//! Host functions are declared with [`host_function!`](crate::host_function)
//! and intercepted through an owned [`HookTable`]. Two kinds of dispatch
//! slot are supported:
//! - VTable hooks (virtual function pointer replacement)
//! - Inline hooks (prologue detour with a relocated trampoline, x86_64)
//!
//! Every redirected call enters [`dispatch`], which runs the function's
//! interceptor chain and then, unless short-circuited, the original.

mod dispatch;
mod entry;
mod error;
mod function;
mod inline;
mod slot;
mod table;
mod trampoline;
mod vtable;

use slotmap::new_key_type;

new_key_type! {
    /// Key for one registered interceptor
    pub struct InterceptorKey;
}

pub use dispatch::{dispatch, Directive, Interceptor, InterceptorFn, Invocation};
pub use entry::{Binding, HookEntry};
pub use error::InstallationError;
pub use function::HostFunction;
pub use table::HookTable;
