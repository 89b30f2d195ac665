//! # Credvault Storage
//!
//! Storage abstraction for Credvault.
//!
//! The credential store only needs an opaque byte-oriented key/value space;
//! backends implement [`StorageBackend`]. [`MemoryBackend`] ships here for
//! dev mode and tests, durable backends live in their own crates.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod error;
pub mod memory;

pub use backend::StorageBackend;
pub use error::StorageError;
pub use memory::MemoryBackend;
