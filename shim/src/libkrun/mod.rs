//! libkrun-backed VM launch on Linux.
//!
//! The configuration context wrapper needs libkrun at link time and is only
//! built with the `libkrun` feature. The network backend is plain process
//! and socket plumbing and is always available.

mod network;

#[cfg(feature = "libkrun")]
mod krun;

#[cfg(feature = "libkrun")]
pub use krun::{KrunContext, KrunHypervisor};
pub use network::{NetworkBackendHandle, acquire, connect_to_passt, spawn_passt};
