//! Application layer module
//!
//! This module contains the reconciliation use cases, the operator
//! resolution sessions and the data transfer objects built on the domain.

pub mod dto;
pub mod reconciliation_service;
pub mod resolution_session;

pub use dto::{SkuPlanCountsDto, SkuPlanReportDto, SyncPlanCountsDto, SyncPlanReportDto};
pub use reconciliation_service::ReconciliationService;
pub use resolution_session::{SkuResolutionSession, SyncResolutionSession, WarningAction};
