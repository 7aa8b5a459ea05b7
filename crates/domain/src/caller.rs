//! Request context passed explicitly into every use case.

use common::UserId;

use crate::error::DomainError;

/// The authenticated principal behind a request.
///
/// Resolved by the authentication collaborator; `is_admin` is the outcome
/// of its capability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub is_admin: bool,
}

impl Caller {
    /// A regular customer.
    pub fn customer(user_id: UserId) -> Self {
        Self {
            user_id,
            is_admin: false,
        }
    }

    /// An administrator.
    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            is_admin: true,
        }
    }

    /// Fails with `Forbidden` unless the caller is an administrator.
    pub fn require_admin(&self) -> Result<(), DomainError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(DomainError::Forbidden {
                user_id: self.user_id,
            })
        }
    }

    /// Returns true if the caller may read data belonging to `owner`.
    pub fn can_view(&self, owner: UserId) -> bool {
        self.is_admin || self.user_id == owner
    }
}
