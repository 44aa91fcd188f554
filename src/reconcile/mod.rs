//! # Reconciliation contract.
//!
//! This module provides the user-facing reconcile types:
//! - [`Reconciler`] - trait for async, cooperatively cancelable reconcile logic
//! - [`ReconcilerFn`] - closure-backed reconciler
//! - [`Inject`], [`Dependencies`] - optional dependency injection at construction
//! - [`Request`] - reconcile key (namespace + name)
//! - [`Action`] - requeue decision after a successful reconcile

mod action;
mod reconciler;
mod request;

pub(crate) use action::Requeue;
pub use action::Action;
pub use reconciler::{Dependencies, Inject, Reconciler, ReconcilerFn};
pub use request::Request;
