//! shadowhook Engine - Host Image Discovery
//!
//! This crate handles locating the mapped host binary and resolving RVAs
//! against it.
//!
//! # Architecture
//!
//! The host image is found once during loader startup via
//! [`HostImage::locate`] (or supplied directly by the embedding loader) and
//! handed to the framework, which owns it for the rest of the session.
//!
//! # Thread Safety
//!
//! [`HostImage`] is a plain value; the mapping it describes stays valid for
//! the process lifetime.

pub mod error;
pub mod image;

pub use error::HostError;
pub use image::HostImage;
