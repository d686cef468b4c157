//! Packet id to packet type mapping, built once at startup.
//!
//! The registration list is explicit: every packet type the client accepts
//! from the server is named when the registry is built. After `build()` the
//! registry is read-only and safe to share with the receive context.

pub mod config;
pub mod error;
pub mod registry;

pub use config::RegistryConfig;
pub use error::{RegistryError, Result};
pub use registry::{DecodeFn, IdConflict, PacketDescriptor, PacketRegistry, RegistryBuilder};
