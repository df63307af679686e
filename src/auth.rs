use tokio::sync::watch;
use tracing::info;

/// Current authenticated-identity state.
///
/// `Unknown` only exists at startup, before the first identity check
/// completes; after that the state is always either signed in or out.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    Unknown,
    SignedOut,
    SignedIn(String),
}

impl AuthState {
    pub fn uid(&self) -> Option<&str> {
        match self {
            AuthState::SignedIn(uid) => Some(uid),
            _ => None,
        }
    }

    /// True once the first identity check has completed.
    pub fn is_known(&self) -> bool {
        !matches!(self, AuthState::Unknown)
    }
}

/// Publishes identity transitions to the subscription manager.
///
/// The gate itself performs no authentication; it mirrors what the external
/// auth service reports. Observers react to every transition, closing stale
/// subscriptions before opening new ones.
pub struct IdentityGate {
    tx: watch::Sender<AuthState>,
}

impl IdentityGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AuthState::Unknown);
        IdentityGate { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> AuthState {
        self.tx.borrow().clone()
    }

    pub fn initial_check_complete(&self) -> bool {
        self.tx.borrow().is_known()
    }

    pub fn sign_in(&self, uid: impl Into<String>) {
        let uid = uid.into();
        info!(target: "farmsync", event = "auth_signed_in", uid = %uid);
        self.tx.send_replace(AuthState::SignedIn(uid));
    }

    pub fn sign_out(&self) {
        info!(target: "farmsync", event = "auth_signed_out");
        self.tx.send_replace(AuthState::SignedOut);
    }

    /// Report a completed startup check that found no session.
    pub fn confirm_signed_out(&self) {
        if !self.initial_check_complete() {
            info!(target: "farmsync", event = "auth_initial_check_signed_out");
            self.tx.send_replace(AuthState::SignedOut);
        }
    }
}

impl Default for IdentityGate {
    fn default() -> Self {
        Self::new()
    }
}
