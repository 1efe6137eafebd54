//! IP address planning module.
//!
//! Every host gets a stable primary address and every link its own /24, so
//! the addresses of a variant depend only on its shape.

pub mod allocator;

// Re-export commonly used types
pub use allocator::{AddressPlan, MAX_HOSTS};
