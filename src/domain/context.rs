//! Security Context
//!
//! Principal metadata derived once per request from identity-layer claims.
//! Read-only for the core; persisted only through the audit sink.

use serde::{Deserialize, Serialize};

/// Context for a request, used for authorization and auditing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityContext {
    /// Authenticated principal. Empty means unauthenticated.
    pub user_id: String,

    /// Account the session is scoped to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,

    /// Granted permissions
    #[serde(default)]
    pub permissions: Vec<String>,

    /// Session identifier from the identity provider
    pub session_id: String,

    /// Client IP address
    pub ip_address: String,

    /// Client user agent
    pub user_agent: String,
}

impl SecurityContext {
    /// Create a context for `user_id`
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    /// Create an unauthenticated context
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_permissions(mut self, permissions: Vec<String>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_client(mut self, ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        self.ip_address = ip_address.into();
        self.user_agent = user_agent.into();
        self
    }

    /// Whether a principal is present
    pub fn is_authenticated(&self) -> bool {
        !self.user_id.trim().is_empty()
    }

    /// Check if this context carries a specific permission
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission || p == "admin")
    }
}
