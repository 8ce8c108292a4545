//! Error taxonomy for planning and execution operations.
//!
//! Nothing here is fatal to the process: every error is scoped to a single
//! planning or execution call.

use thiserror::Error;

use crate::catalog::ClientId;
use crate::route::{RouteId, RouteStatus};

/// Failure reported by a routing provider. Passed through to callers as-is.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("routing request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("routing provider returned {code}: {message}")]
    Rejected { code: String, message: String },
    #[error("routing provider returned no route")]
    NoRoute,
    #[error("{count} waypoints exceed the provider limit of {max}")]
    TooManyWaypoints { count: usize, max: usize },
}

/// Failure of the key-value store behind the planning repository.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to encode or decode stored value for {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Why a client record was excluded or degraded during catalog load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputIssue {
    BlankId,
    DuplicateId,
    MissingCoordinates,
    InvalidCoordinates,
    ZeroVisitDuration,
}

impl std::fmt::Display for InputIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            InputIssue::BlankId => "blank identifier",
            InputIssue::DuplicateId => "duplicate identifier",
            InputIssue::MissingCoordinates => "missing coordinates",
            InputIssue::InvalidCoordinates => "coordinates out of range",
            InputIssue::ZeroVisitDuration => "visit duration of zero minutes",
        };
        f.write_str(text)
    }
}

/// A malformed or incomplete client record. Recovered locally: the record is
/// either dropped or kept without a location.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("client record #{index} ({}): {issue}", .id.as_deref().unwrap_or("<no id>"))]
pub struct InputDataError {
    pub index: usize,
    pub id: Option<String>,
    pub issue: InputIssue,
}

#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("{} client(s) could not fit within the available day capacity", .unassigned.len())]
    Capacity { unassigned: Vec<ClientId> },
    #[error("cannot {action} route {route} while it is {status}")]
    State {
        route: RouteId,
        action: &'static str,
        status: RouteStatus,
    },
    #[error("route {active} is already active")]
    AnotherRouteActive { active: RouteId },
    #[error("route {route} is in progress; finish or complete it before re-optimizing")]
    PlanInProgress { route: RouteId },
    #[error("client catalog was replaced while the plan was being built")]
    CatalogReplaced,
    #[error("unknown route {0}")]
    UnknownRoute(RouteId),
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, PlanningError>;

impl PlanningError {
    pub fn invalid_settings(message: impl Into<String>) -> Self {
        Self::InvalidSettings(message.into())
    }

    /// True for errors that leave the plan untouched and can simply be retried
    /// or ignored by the caller.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::State { .. }
                | Self::AnotherRouteActive { .. }
                | Self::PlanInProgress { .. }
                | Self::CatalogReplaced
                | Self::UnknownRoute(_)
        )
    }
}
