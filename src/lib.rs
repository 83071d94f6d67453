//! Workspace umbrella crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (`core-sync`, `core-runtime`, `bridge-desktop`). Host
//! applications can depend on `audiobook-core` and enable the documented
//! features without needing to wire each crate individually.

#[cfg(feature = "sync")]
pub use bridge_traits;
#[cfg(feature = "sync")]
pub use core_runtime;
#[cfg(feature = "sync")]
pub use core_sync;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop;
