//! Runtime core: controllers, the manager and their lifecycle.
//!
//! Public API from this module: [`Controller`], [`Manager`] (with [`ManagerBuilder`]),
//! their configuration ([`ControllerOptions`], [`ManagerConfig`]), [`LifecycleState`] and
//! [`TaskRegistry`].
//!
//! Internal modules:
//! - [`worker`]: one reconcile loop over the controller's queue;
//! - [`shutdown`]: cross-platform shutdown signal handling;
//! - [`lifecycle`]: monotonic controller state machine.

mod builder;
mod config;
mod controller;
mod lifecycle;
mod manager;
mod registry;
mod shutdown;
mod worker;

pub use builder::ManagerBuilder;
pub use config::{ControllerOptions, ManagerConfig};
pub use controller::Controller;
pub use lifecycle::LifecycleState;
pub use manager::Manager;
pub use registry::TaskRegistry;
