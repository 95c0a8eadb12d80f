//! Reconciliation error types
//!
//! Every operation that crosses the plan/execute boundary returns one of
//! these typed errors, never an ambiguous partial state.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use ts_rs::TS;

/// Which kind of plan an execution error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub enum PlanKind {
    Sync,
    Sku,
    CategoryDeletion,
}

impl fmt::Display for PlanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync => write!(f, "sync plan"),
            Self::Sku => write!(f, "SKU plan"),
            Self::CategoryDeletion => write!(f, "category deletion"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationError {
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Stale or unresolved {plan_kind}: {reason}")]
    StaleResolution { plan_kind: PlanKind, reason: String },

    #[error("Transaction failed while executing {plan_kind}: {reason}")]
    TransactionFailure { plan_kind: PlanKind, reason: String },

    #[error("Taxonomy feed unavailable: {reason}")]
    FeedUnavailable { reason: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl ReconciliationError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn stale(plan_kind: PlanKind, reason: impl Into<String>) -> Self {
        Self::StaleResolution {
            plan_kind,
            reason: reason.into(),
        }
    }

    pub fn transaction_failure(plan_kind: PlanKind, reason: impl fmt::Display) -> Self {
        Self::TransactionFailure {
            plan_kind,
            reason: reason.to_string(),
        }
    }

    pub fn feed_unavailable(reason: impl fmt::Display) -> Self {
        Self::FeedUnavailable {
            reason: reason.to_string(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether the caller may retry after rebuilding the plan.
    ///
    /// Validation errors need operator input and never succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Validation { .. } => false,
            Self::NotFound { .. } => false,
            Self::StaleResolution { .. } => true,
            Self::TransactionFailure { .. } => true,
            Self::FeedUnavailable { .. } => true,
            Self::Storage { .. } => true,
        }
    }

    /// Rewrap a store failure that happened inside an execution transaction
    pub fn into_transaction_failure(self, plan_kind: PlanKind) -> Self {
        match self {
            Self::Storage { message } => Self::TransactionFailure {
                plan_kind,
                reason: message,
            },
            other => other,
        }
    }
}

pub type ReconciliationResult<T> = Result<T, ReconciliationError>;
