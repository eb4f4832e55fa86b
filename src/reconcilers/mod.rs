//! Reconcilers
//!
//! This module contains the business logic of the controller:
//! - Deciding what a pass does from the observed records
//! - Driving the import collaborators
//! - Writing the resulting credential and cluster state

pub mod auto_import;
pub mod locks;

pub use auto_import::{AutoImportReconciler, ReconcileOutcome};
pub use locks::IdentityLocks;
