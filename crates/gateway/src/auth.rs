use std::sync::atomic::{AtomicBool, Ordering};

/// Supplies the bearer credential attached to every gateway request.
///
/// The session runtime never sees the token. Gateways call
/// `credentials_rejected` when the server answers 401/403 so the owner can
/// start its refresh flow.
pub trait AuthContext: Send + Sync {
    fn bearer_token(&self) -> Option<String>;

    fn credentials_rejected(&self) {}
}

/// Fixed token, typically read from the environment.
#[derive(Debug, Default)]
pub struct StaticToken {
    token: Option<String>,
    rejected: AtomicBool,
}

impl StaticToken {
    #[must_use]
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.trim().is_empty()),
            rejected: AtomicBool::new(false),
        }
    }

    /// True once the server has refused this token.
    #[must_use]
    pub fn was_rejected(&self) -> bool {
        self.rejected.load(Ordering::Acquire)
    }
}

impl AuthContext for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        self.token.clone()
    }

    fn credentials_rejected(&self) {
        self.rejected.store(true, Ordering::Release);
        tracing::warn!("server rejected the configured credentials");
    }
}
