//! Consumer services built on the generic repository contract.
//!
//! # Responsibility
//! - Express site use-cases as repository calls.
//! - Stay agnostic of whether the repository is cached.

pub mod content_service;
pub mod settings_service;

use crate::model::entity::EntityId;
use crate::repo::repository::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service-level error for consumer use-cases.
#[derive(Debug)]
pub enum ServiceError {
    /// Repository bound to another kind than the service expects.
    WrongKind {
        expected: &'static str,
        actual: &'static str,
    },
    /// Target entity does not exist (or is not visible).
    NotFound { kind: &'static str, id: EntityId },
    /// Persistence-layer failure.
    Repo(RepoError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WrongKind { expected, actual } => {
                write!(f, "service expects `{expected}` repository, got `{actual}`")
            }
            Self::NotFound { kind, id } => write!(f, "{kind} entity not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { kind, id } => Self::NotFound { kind, id },
            other => Self::Repo(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
