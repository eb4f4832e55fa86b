//! Auto-import controller
//!
//! Imports managed clusters into the fleet control plane using the
//! credentials in each cluster's `auto-import-secret`, with a bounded retry
//! budget and the outcome reported as an `ImportSucceeded` condition.

pub mod budget;
pub mod conditions;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod import;
pub mod metrics;
pub mod model;
pub mod reconcilers;
pub mod recorder;
pub mod store;

pub use error::{Error, ErrorKind, ErrorList, Result};
