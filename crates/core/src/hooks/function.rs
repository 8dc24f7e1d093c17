//! Host function declarations

use shadowhook_sdk::FunctionIdentity;

use super::entry::Binding;

/// A host member function that can be intercepted
///
/// Implemented by the unit types that [`host_function!`](crate::host_function)
/// declares. The implementation ties together the function's identity, its
/// native signature, the detour thunk the host is redirected to, and the
/// per-function [`Binding`] the thunk consults on every call.
pub trait HostFunction: Sized + 'static {
    /// Host class name, e.g. `AppDelegate`
    const CLASS: &'static str;

    /// Method name, e.g. `trySaveGame`
    const METHOD: &'static str;

    /// Parameter list as it appears in descriptors, e.g. `bool`
    const SIGNATURE: &'static str;

    /// Native arguments as a tuple, the instance pointer first
    type Args: Clone;

    /// Native return type
    type Output: Clone;

    fn identity() -> FunctionIdentity {
        FunctionIdentity::new(Self::CLASS, Self::METHOD, Self::SIGNATURE)
    }

    /// Address of the native thunk that enters the dispatcher
    fn detour() -> *const ();

    /// Call a native entry point with this function's signature
    ///
    /// # Safety
    /// `target` must be an entry point with exactly this signature.
    unsafe fn call(target: *const (), args: Self::Args) -> Self::Output;

    /// Process-wide binding between the thunk and the installed entry
    fn binding() -> &'static Binding<Self>;
}

/// Declare interceptable host functions
///
/// Each declaration produces a unit type implementing [`HostFunction`].
/// The instance pointer is spelled out as the first parameter; every
/// declared function uses the C calling convention.
///
/// # Example
/// ```ignore
/// host_function! {
///     /// AppDelegate::trySaveGame
///     pub TrySaveGame("AppDelegate", "trySaveGame", "bool")
///         = fn(this: *mut AppDelegate, app_exit: bool) -> bool;
///
///     pub MenuLayerInit("MenuLayer", "init", "") = fn(this: *mut MenuLayer) -> bool;
/// }
/// ```
#[macro_export]
macro_rules! host_function {
    (
        $(
            $(#[$meta:meta])*
            $vis:vis $name:ident($class:literal, $method:literal, $sig:literal)
                = fn($($arg:ident: $ty:ty),* $(,)?) $(-> $ret:ty)?;
        )+
    ) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy)]
            $vis struct $name;

            $crate::__paste::paste! {
                #[allow(non_snake_case)]
                extern "C" fn [<__shadowhook_thunk_ $name>]($($arg: $ty),*) $(-> $ret)? {
                    $crate::hooks::dispatch::<$name>(($($arg,)*))
                }
            }

            impl $crate::hooks::HostFunction for $name {
                const CLASS: &'static str = $class;
                const METHOD: &'static str = $method;
                const SIGNATURE: &'static str = $sig;

                type Args = ($($ty,)*);
                type Output = $crate::__host_output!($($ret)?);

                fn detour() -> *const () {
                    $crate::__paste::paste! { [<__shadowhook_thunk_ $name>] as *const () }
                }

                unsafe fn call(target: *const (), args: Self::Args) -> Self::Output {
                    let target: extern "C" fn($($ty),*) $(-> $ret)? =
                        ::core::mem::transmute(target);
                    let ($($arg,)*) = args;
                    target($($arg),*)
                }

                fn binding() -> &'static $crate::hooks::Binding<Self> {
                    static BINDING: $crate::hooks::Binding<$name> = $crate::hooks::Binding::new();
                    &BINDING
                }
            }
        )+
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __host_output {
    () => { () };
    ($ret:ty) => { $ret };
}
