//! Lifecycle state and page client bookkeeping.

use std::collections::HashMap;
use std::sync::Mutex;

use safenest_core::Error;
use serde::Serialize;

use super::lock;

/// Coordinator lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Constructed, install not yet attempted.
    Parsed,
    Installing,
    /// Static partition populated, waiting to activate.
    Installed,
    Activating,
    /// Stale partitions evicted; fetches are intercepted.
    Activated,
    /// Install failed; may retry install or resume persisted partitions.
    Redundant,
}

impl WorkerState {
    /// Check if this state allows fetch interception
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, WorkerState::Activated)
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Parsed => write!(f, "parsed"),
            WorkerState::Installing => write!(f, "installing"),
            WorkerState::Installed => write!(f, "installed"),
            WorkerState::Activating => write!(f, "activating"),
            WorkerState::Activated => write!(f, "activated"),
            WorkerState::Redundant => write!(f, "redundant"),
        }
    }
}

#[derive(Debug)]
struct LifecycleInner {
    state: WorkerState,
    skip_waiting: bool,
}

#[derive(Debug)]
pub(crate) struct Lifecycle {
    inner: Mutex<LifecycleInner>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self { inner: Mutex::new(LifecycleInner { state: WorkerState::Parsed, skip_waiting: false }) }
    }

    pub(crate) fn state(&self) -> WorkerState {
        lock(&self.inner).state
    }

    /// Move from `from` to `to`, failing if the current state isn't `from`.
    pub(crate) fn transition(&self, from: WorkerState, to: WorkerState) -> Result<(), Error> {
        let mut inner = lock(&self.inner);
        if inner.state != from {
            return Err(Error::InvalidState(format!("cannot move to {to} from {}, expected {from}", inner.state)));
        }
        tracing::debug!("lifecycle {} -> {}", inner.state, to);
        inner.state = to;
        Ok(())
    }

    /// Like `transition`, accepting any of several source states.
    pub(crate) fn transition_from(&self, from: &[WorkerState], to: WorkerState) -> Result<(), Error> {
        let mut inner = lock(&self.inner);
        if !from.contains(&inner.state) {
            return Err(Error::InvalidState(format!("cannot move to {to} from {}", inner.state)));
        }
        tracing::debug!("lifecycle {} -> {}", inner.state, to);
        inner.state = to;
        Ok(())
    }

    pub(crate) fn set(&self, to: WorkerState) {
        let mut inner = lock(&self.inner);
        tracing::debug!("lifecycle {} -> {}", inner.state, to);
        inner.state = to;
    }

    pub(crate) fn skip_waiting(&self) {
        lock(&self.inner).skip_waiting = true;
    }

    /// Installed and allowed to skip the waiting period.
    pub(crate) fn ready_to_activate(&self) -> bool {
        let inner = lock(&self.inner);
        inner.state == WorkerState::Installed && inner.skip_waiting
    }
}

/// Open page clients and whether this coordinator controls them.
#[derive(Debug, Default)]
pub(crate) struct Clients {
    inner: Mutex<HashMap<String, bool>>,
}

impl Clients {
    /// Record a client; a client once controlled stays controlled.
    pub(crate) fn register(&self, id: &str, controlled: bool) {
        let mut clients = lock(&self.inner);
        let entry = clients.entry(id.to_string()).or_insert(false);
        *entry |= controlled;
    }

    /// Take control of every known client. Returns how many were newly claimed.
    pub(crate) fn claim(&self) -> usize {
        let mut clients = lock(&self.inner);
        let mut claimed = 0;
        for controlled in clients.values_mut().filter(|controlled| !**controlled) {
            *controlled = true;
            claimed += 1;
        }
        claimed
    }

    pub(crate) fn controlled(&self) -> usize {
        lock(&self.inner).values().filter(|controlled| **controlled).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_activated_intercepts() {
        assert!(WorkerState::Activated.can_intercept_fetch());
        assert!(!WorkerState::Installed.can_intercept_fetch());
        assert!(!WorkerState::Redundant.can_intercept_fetch());
    }

    #[test]
    fn test_transition_checks_source_state() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.transition(WorkerState::Installed, WorkerState::Activating).is_err());
        lifecycle.transition(WorkerState::Parsed, WorkerState::Installing).unwrap();
        assert_eq!(lifecycle.state(), WorkerState::Installing);
    }

    #[test]
    fn test_transition_from_any_of() {
        let lifecycle = Lifecycle::new();
        lifecycle.set(WorkerState::Redundant);
        lifecycle
            .transition_from(&[WorkerState::Parsed, WorkerState::Redundant], WorkerState::Installing)
            .unwrap();
        assert!(
            lifecycle
                .transition_from(&[WorkerState::Parsed, WorkerState::Redundant], WorkerState::Installing)
                .is_err()
        );
    }

    #[test]
    fn test_ready_to_activate_requires_skip_waiting() {
        let lifecycle = Lifecycle::new();
        lifecycle.set(WorkerState::Installed);
        assert!(!lifecycle.ready_to_activate());
        lifecycle.skip_waiting();
        assert!(lifecycle.ready_to_activate());
    }

    #[test]
    fn test_claim_clients() {
        let clients = Clients::default();
        clients.register("tab-1", false);
        clients.register("tab-2", false);
        clients.register("tab-3", true);

        assert_eq!(clients.controlled(), 1);
        assert_eq!(clients.claim(), 2);
        assert_eq!(clients.controlled(), 3);
        assert_eq!(clients.claim(), 0);
    }

    #[test]
    fn test_controlled_client_stays_controlled() {
        let clients = Clients::default();
        clients.register("tab-1", true);
        clients.register("tab-1", false);
        assert_eq!(clients.controlled(), 1);
    }
}
