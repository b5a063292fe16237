//! Auth/connection/subscription preconditions.
//!
//! Token acquisition and billing live outside this crate. The controller only
//! consumes a snapshot of their results at submission time.

use serde::{Deserialize, Serialize};

use super::database::LedgerStore;
use super::errors::{RejectedReason, SessionError};
use crate::stream::client::CallerIdentity;

/// Subscription statuses that allow queries.
pub const ACTIVE_SUBSCRIPTION_STATUSES: &[&str] = &["active", "trialing"];

/// Snapshot written by the external auth collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthState {
    pub authenticated: bool,
    pub external_connected: bool,
    pub needs_reauth: bool,
    pub subscription_status: Option<String>,
    pub user_id: Option<String>,
    pub tenant_id: Option<String>,
    pub nation_slug: Option<String>,
}

impl AuthState {
    pub fn identity(&self) -> CallerIdentity {
        CallerIdentity {
            user_id: self.user_id.clone(),
            tenant_id: self.tenant_id.clone(),
            nation_slug: self.nation_slug.clone(),
        }
    }
}

/// Check the snapshot in order: signed in, connected, subscribed.
pub fn check_preconditions(state: &AuthState) -> Result<(), RejectedReason> {
    if !state.authenticated {
        return Err(RejectedReason::Unauthenticated);
    }
    if !state.external_connected {
        return Err(RejectedReason::ExternalSystemNotConnected);
    }
    if state.needs_reauth {
        return Err(RejectedReason::ExternalSystemNeedsReauth);
    }
    let status = state.subscription_status.as_deref().unwrap_or("none");
    if !ACTIVE_SUBSCRIPTION_STATUSES.contains(&status) {
        return Err(RejectedReason::SubscriptionInactive {
            status: status.to_string(),
        });
    }
    Ok(())
}

// ─── Providers ───────────────────────────────────────────────────────────────

/// Source of the auth snapshot.
pub trait AuthProvider: Send {
    /// Current snapshot. A store that was never written yields the default
    /// (unauthenticated) state.
    fn auth_snapshot(&self) -> Result<AuthState, SessionError>;

    /// Replace the snapshot.
    fn store_snapshot(&mut self, state: AuthState) -> Result<(), SessionError>;
}

/// Snapshot persisted in the overlay database.
pub struct StoredAuthProvider {
    store: LedgerStore,
}

impl StoredAuthProvider {
    pub fn open(path: &str) -> Result<Self, SessionError> {
        Ok(Self {
            store: LedgerStore::open(path)?,
        })
    }
}

impl AuthProvider for StoredAuthProvider {
    fn auth_snapshot(&self) -> Result<AuthState, SessionError> {
        Ok(self.store.load_auth()?.unwrap_or_default())
    }

    fn store_snapshot(&mut self, state: AuthState) -> Result<(), SessionError> {
        self.store.save_auth(&state)
    }
}

/// In-memory snapshot.
#[derive(Debug, Default)]
pub struct StaticAuthProvider {
    state: AuthState,
}

impl StaticAuthProvider {
    pub fn new(state: AuthState) -> Self {
        Self { state }
    }

    /// Signed in, connected and on an active subscription.
    pub fn ready() -> Self {
        Self::new(AuthState {
            authenticated: true,
            external_connected: true,
            needs_reauth: false,
            subscription_status: Some("active".into()),
            user_id: Some("user-1".into()),
            tenant_id: Some("tenant-1".into()),
            nation_slug: Some("demo".into()),
        })
    }
}

impl AuthProvider for StaticAuthProvider {
    fn auth_snapshot(&self) -> Result<AuthState, SessionError> {
        Ok(self.state.clone())
    }

    fn store_snapshot(&mut self, state: AuthState) -> Result<(), SessionError> {
        self.state = state;
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ready() -> AuthState {
        StaticAuthProvider::ready().auth_snapshot().unwrap()
    }

    #[test]
    fn test_ready_state_passes() {
        assert_eq!(check_preconditions(&ready()), Ok(()));
        let trialing = AuthState {
            subscription_status: Some("trialing".into()),
            ..ready()
        };
        assert_eq!(check_preconditions(&trialing), Ok(()));
    }

    #[test]
    fn test_first_failure_wins() {
        let state = AuthState {
            authenticated: false,
            external_connected: false,
            ..ready()
        };
        assert_eq!(
            check_preconditions(&state),
            Err(RejectedReason::Unauthenticated)
        );

        let state = AuthState {
            external_connected: false,
            needs_reauth: true,
            ..ready()
        };
        assert_eq!(
            check_preconditions(&state),
            Err(RejectedReason::ExternalSystemNotConnected)
        );
    }

    #[test]
    fn test_reauth_and_subscription() {
        let state = AuthState {
            needs_reauth: true,
            ..ready()
        };
        assert_eq!(
            check_preconditions(&state),
            Err(RejectedReason::ExternalSystemNeedsReauth)
        );

        let state = AuthState {
            subscription_status: Some("past_due".into()),
            ..ready()
        };
        assert_eq!(
            check_preconditions(&state),
            Err(RejectedReason::SubscriptionInactive {
                status: "past_due".into()
            })
        );

        let state = AuthState {
            subscription_status: None,
            ..ready()
        };
        assert!(matches!(
            check_preconditions(&state),
            Err(RejectedReason::SubscriptionInactive { .. })
        ));
    }

    #[test]
    fn test_stored_provider_defaults_to_unauthenticated() {
        let mut provider = StoredAuthProvider::open(":memory:").unwrap();
        assert!(!provider.auth_snapshot().unwrap().authenticated);

        provider.store_snapshot(ready()).unwrap();
        assert_eq!(provider.auth_snapshot().unwrap(), ready());
    }

    #[test]
    fn test_auth_state_accepts_partial_json() {
        let state: AuthState =
            serde_json::from_str(r#"{"authenticated": true, "subscriptionStatus": "active"}"#)
                .unwrap();
        assert!(state.authenticated);
        assert!(!state.external_connected);
        assert_eq!(state.subscription_status.as_deref(), Some("active"));
    }
}
