//! Cluster-wide lock session fencing token
//!
//! The token identifies which member currently holds write-lock authority.
//! A transaction carries the id of the token it took its locks under; once
//! a newer token has been agreed, transactions under the old id are stale
//! and must not commit.
//!
//! The token is owned by its own replicated state machine, applied by the
//! same ordering layer as transactions. The transaction state machine only
//! reads it through `LockTokenProvider`.

use std::sync::{PoisonError, RwLock};

use thiserror::Error;

/// Lock session id of a transaction that holds no cluster locks.
/// Such transactions pass fencing regardless of the current token.
pub const NO_LOCK_SESSION_ID: i32 = -1;

/// Read access to the currently agreed lock token.
pub trait LockTokenProvider: Send + Sync {
    /// Id of the current lock token
    fn current_token_id(&self) -> i32;
}

/// A lock token as agreed by the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    /// Token id; `NO_LOCK_SESSION_ID` before any token was granted
    pub id: i32,
    /// Member holding the token
    pub owner: Option<String>,
}

impl LockToken {
    /// The token in force before any request was accepted
    pub fn invalid() -> Self {
        Self {
            id: NO_LOCK_SESSION_ID,
            owner: None,
        }
    }

    /// A token request for the given member
    pub fn new(id: i32, owner: impl Into<String>) -> Self {
        Self {
            id,
            owner: Some(owner.into()),
        }
    }

    /// The only id a new request may carry to replace this token
    pub fn next_candidate_id(&self) -> i32 {
        self.id + 1
    }
}

/// Lock token state errors
#[derive(Debug, Error)]
pub enum LockTokenError {
    #[error("lock token state lock poisoned")]
    Poisoned,
}

#[derive(Debug)]
struct TokenState {
    token: LockToken,
    applied_index: i64,
}

/// Replicated lock token state.
///
/// Requests are applied in log order. A request wins only if it asks for
/// exactly the next candidate id, so two members racing for the token
/// cannot both succeed.
#[derive(Debug)]
pub struct ReplicatedLockTokenState {
    state: RwLock<TokenState>,
}

impl ReplicatedLockTokenState {
    /// Fresh state with no token granted
    pub fn new() -> Self {
        Self::with_token(LockToken::invalid(), -1)
    }

    /// State recovered at a given token and log index
    pub fn with_token(token: LockToken, applied_index: i64) -> Self {
        Self {
            state: RwLock::new(TokenState {
                token,
                applied_index,
            }),
        }
    }

    /// Apply a replicated token request.
    ///
    /// Returns whether the request was granted. Redelivered indices are
    /// ignored and report `false`.
    pub fn apply_token_request(
        &self,
        request: LockToken,
        command_index: i64,
    ) -> Result<bool, LockTokenError> {
        let mut state = self.state.write().map_err(|_| LockTokenError::Poisoned)?;
        if command_index <= state.applied_index {
            return Ok(false);
        }
        state.applied_index = command_index;

        if request.id == state.token.next_candidate_id() {
            state.token = request;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// The current token
    pub fn current_token(&self) -> LockToken {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .token
            .clone()
    }

    /// Last log index applied to this state
    pub fn applied_index(&self) -> i64 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .applied_index
    }
}

impl Default for ReplicatedLockTokenState {
    fn default() -> Self {
        Self::new()
    }
}

impl LockTokenProvider for ReplicatedLockTokenState {
    fn current_token_id(&self) -> i32 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .token
            .id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_token_is_no_session() {
        let state = ReplicatedLockTokenState::new();
        assert_eq!(state.current_token_id(), NO_LOCK_SESSION_ID);
        assert_eq!(state.current_token(), LockToken::invalid());
    }

    #[test]
    fn test_next_candidate_is_accepted() {
        let state = ReplicatedLockTokenState::new();
        assert!(state.apply_token_request(LockToken::new(0, "core-1"), 1).unwrap());
        assert_eq!(state.current_token_id(), 0);
        assert!(state.apply_token_request(LockToken::new(1, "core-2"), 2).unwrap());
        assert_eq!(state.current_token().owner.as_deref(), Some("core-2"));
    }

    #[test]
    fn test_stale_candidate_is_rejected() {
        let state = ReplicatedLockTokenState::new();
        assert!(state.apply_token_request(LockToken::new(0, "core-1"), 1).unwrap());
        // Both requested id 1 concurrently; only the first in log order wins.
        assert!(state.apply_token_request(LockToken::new(1, "core-2"), 2).unwrap());
        assert!(!state.apply_token_request(LockToken::new(1, "core-3"), 3).unwrap());
        assert_eq!(state.current_token().owner.as_deref(), Some("core-2"));
        assert_eq!(state.applied_index(), 3);
    }

    #[test]
    fn test_redelivered_index_is_ignored() {
        let state = ReplicatedLockTokenState::new();
        assert!(state.apply_token_request(LockToken::new(0, "core-1"), 5).unwrap());
        assert!(!state.apply_token_request(LockToken::new(1, "core-2"), 5).unwrap());
        assert_eq!(state.current_token_id(), 0);
    }
}
