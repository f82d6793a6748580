//! HTTP handling for the binary.
//!
//! Request handling is owned by whoever starts the manager; this module
//! only provides the default router the binary serves.

pub mod server;

pub use server::build_router;
