//! Identity-provider facing types.
//!
//! The workflow never authenticates anyone. The surrounding application
//! resolves a session to a [`UserRef`] and passes it in; the core only
//! authorizes by role and concurrency capacity.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::UserId;

/// Role attached to a user by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Annotator,
    Verifier,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Annotator => "annotator",
            Self::Verifier => "verifier",
            Self::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "annotator" => Ok(Self::Annotator),
            "verifier" => Ok(Self::Verifier),
            "admin" => Ok(Self::Admin),
            _ => Err(CoreError::Validation(format!(
                "Invalid role '{s}'. Must be one of: annotator, verifier, admin"
            ))),
        }
    }
}

/// An opaque user reference supplied by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: UserId,
    pub role: Role,
    /// Maximum number of active assignments this user may hold at once.
    pub max_concurrent_batches: u32,
}

impl UserRef {
    pub fn new(id: UserId, role: Role, max_concurrent_batches: u32) -> Self {
        Self {
            id,
            role,
            max_concurrent_batches,
        }
    }

    /// Annotation work requires the annotator or admin role.
    pub fn can_annotate(&self) -> bool {
        matches!(self.role, Role::Annotator | Role::Admin)
    }

    /// Verification decisions require the verifier or admin role.
    pub fn can_verify(&self) -> bool {
        matches!(self.role, Role::Verifier | Role::Admin)
    }

    /// Creating assignments requires the admin role.
    pub fn can_assign(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}

/// Reject callers whose role does not permit the operation.
pub fn require(check: bool, action: &str, user: &UserRef) -> Result<(), CoreError> {
    if check {
        Ok(())
    } else {
        Err(CoreError::Forbidden(format!(
            "role '{}' may not {action}",
            user.role.as_str()
        )))
    }
}
