//! Catalog Reconcile - category tree and article code reconciliation
//!
//! Keeps a local category tree in line with an external taxonomy feed and
//! audits product article codes against the categories they belong to.
//! Every change is first shown as a dry-run plan and only applied in a
//! single transaction once the operator accepts it.

// Module declarations
pub mod domain;
pub mod application;
pub mod infrastructure;

#[doc(hidden)]
pub mod test_utils;
