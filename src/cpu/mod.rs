//! CPU compute backend

mod host;

pub use host::HostBackend;
