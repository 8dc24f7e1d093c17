//! FFI layer

pub mod exports;
