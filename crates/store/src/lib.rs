//! Data access for the storefront jobs.
//!
//! `CommerceStore` is the seam to the hosted relational backend. The
//! in-memory implementation serves development, tests and demo mode;
//! `FaultyStore` wraps it to inject store failures.

#![warn(clippy::unwrap_used)]

pub mod faulty;
pub mod memory;
pub mod traits;

pub use faulty::{FaultyStore, StoreOp};
pub use memory::MemoryStore;
pub use traits::CommerceStore;
