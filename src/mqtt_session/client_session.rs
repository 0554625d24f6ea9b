// SPDX-License-Identifier: MPL-2.0

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Session flags that survive reconnects.
///
/// Besides the two flags this owns the token that every QoS 2 receive task
/// parked on PUBREL waits on. Discarding the session cancels that token, which
/// ends those tasks and drops the client handles they hold.
#[derive(Debug)]
pub struct SessionState {
    session_present: AtomicBool,
    subscriptions_present: AtomicBool,
    root: CancellationToken,
    parked: Mutex<CancellationToken>,
}

impl SessionState {
    pub fn new(root: CancellationToken) -> Self {
        let parked = root.child_token();
        Self {
            session_present: AtomicBool::new(false),
            subscriptions_present: AtomicBool::new(false),
            root,
            parked: Mutex::new(parked),
        }
    }

    pub fn session_present(&self) -> bool {
        self.session_present.load(Ordering::Acquire)
    }

    pub fn set_session_present(&self, present: bool) {
        self.session_present.store(present, Ordering::Release);
    }

    pub fn subscriptions_present(&self) -> bool {
        self.subscriptions_present.load(Ordering::Acquire)
    }

    pub fn set_subscriptions_present(&self, present: bool) {
        self.subscriptions_present.store(present, Ordering::Release);
    }

    /// Token for tasks that live as long as the current session.
    pub fn parked_token(&self) -> CancellationToken {
        self.parked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Discards session scoped waiters after a CONNACK without a session.
    pub fn update_session_state(&self) {
        let mut parked = self.parked.lock().unwrap_or_else(|e| e.into_inner());
        parked.cancel();
        *parked = self.root.child_token();
        self.subscriptions_present.store(false, Ordering::Release);
        debug!("session discarded, parked receivers released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let state = SessionState::new(CancellationToken::new());
        assert!(!state.session_present());
        state.set_session_present(true);
        state.set_subscriptions_present(true);
        assert!(state.session_present());
        assert!(state.subscriptions_present());
    }

    #[test]
    fn test_update_session_state_replaces_parked_token() {
        let state = SessionState::new(CancellationToken::new());
        let old = state.parked_token();
        state.set_subscriptions_present(true);

        state.update_session_state();

        assert!(old.is_cancelled());
        assert!(!state.parked_token().is_cancelled());
        assert!(!state.subscriptions_present());
    }

    #[test]
    fn test_root_cancel_reaches_parked() {
        let root = CancellationToken::new();
        let state = SessionState::new(root.clone());
        let parked = state.parked_token();
        root.cancel();
        assert!(parked.is_cancelled());
    }
}
