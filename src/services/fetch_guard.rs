//! Throttle for plan list refreshes.
//!
//! One guard belongs to one planner session. At most one refresh is active:
//! admitting a new one aborts the previous one, and every refresh carries a
//! ticket so a completion that arrives after being superseded can be
//! recognised and dropped.

use std::sync::Mutex;
use std::time::Instant;

use futures::future::{AbortHandle, AbortRegistration};

use crate::config::FetchGuardConfig;

/// Identifies one admitted refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    seq: u64,
}

/// An admitted refresh. `registration` wires the refresh future to the
/// guard so a later admission can abort it.
#[derive(Debug)]
pub struct Admission {
    pub ticket: FetchTicket,
    pub registration: AbortRegistration,
}

#[derive(Debug)]
pub enum RefreshDecision {
    Admitted(Admission),
    /// Admitted, and the refresh that was still in flight has been aborted.
    Superseded(Admission),
    TooFrequent,
}

impl RefreshDecision {
    pub fn into_admission(self) -> Option<Admission> {
        match self {
            RefreshDecision::Admitted(admission) | RefreshDecision::Superseded(admission) => {
                Some(admission)
            }
            RefreshDecision::TooFrequent => None,
        }
    }
}

#[derive(Debug)]
struct GuardState {
    first_request_pending: bool,
    user_id: Option<String>,
    last_admitted: Option<Instant>,
    active: Option<(u64, AbortHandle)>,
    next_seq: u64,
}

#[derive(Debug)]
pub struct FetchGuard {
    config: FetchGuardConfig,
    state: Mutex<GuardState>,
}

impl FetchGuard {
    pub fn new(config: FetchGuardConfig) -> Self {
        Self {
            config,
            state: Mutex::new(GuardState {
                first_request_pending: true,
                user_id: None,
                last_admitted: None,
                active: None,
                next_seq: 0,
            }),
        }
    }

    pub fn config(&self) -> FetchGuardConfig {
        self.config
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GuardState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn request_list_refresh(&self, user_id: &str) -> RefreshDecision {
        self.request_list_refresh_at(user_id, Instant::now())
    }

    /// Decides on a refresh requested at `now`. The first request after a
    /// user change skips the interval check; admission stamps `now` before
    /// any remote work starts.
    pub fn request_list_refresh_at(&self, user_id: &str, now: Instant) -> RefreshDecision {
        let mut state = self.lock();

        if state.user_id.as_deref() != Some(user_id) {
            state.user_id = Some(user_id.to_string());
            state.first_request_pending = true;
        }

        if !state.first_request_pending {
            if let Some(last) = state.last_admitted {
                if now.saturating_duration_since(last) < self.config.min_interval {
                    log::debug!("List refresh for {} rejected: too frequent", user_id);
                    return RefreshDecision::TooFrequent;
                }
            }
        }

        state.first_request_pending = false;
        state.last_admitted = Some(now);
        state.next_seq += 1;
        let seq = state.next_seq;

        let (handle, registration) = AbortHandle::new_pair();
        let admission = Admission {
            ticket: FetchTicket { seq },
            registration,
        };

        match state.active.replace((seq, handle)) {
            Some((previous, old_handle)) => {
                old_handle.abort();
                log::debug!("List refresh {} superseded by {}", previous, seq);
                RefreshDecision::Superseded(admission)
            }
            None => RefreshDecision::Admitted(admission),
        }
    }

    /// True while `ticket` belongs to the most recently admitted refresh
    /// and that refresh has not finished.
    pub fn is_live(&self, ticket: &FetchTicket) -> bool {
        matches!(self.lock().active, Some((seq, _)) if seq == ticket.seq)
    }

    /// Marks the refresh behind `ticket` as done. Returns false when it had
    /// already been superseded, in which case its result must be dropped.
    pub fn finish(&self, ticket: &FetchTicket) -> bool {
        let mut state = self.lock();
        match state.active {
            Some((seq, _)) if seq == ticket.seq => {
                state.active = None;
                true
            }
            _ => false,
        }
    }

    /// Forgets all history and aborts any refresh in flight, as after
    /// signing out.
    pub fn reset(&self) {
        let mut state = self.lock();
        if let Some((_, handle)) = state.active.take() {
            handle.abort();
        }
        state.first_request_pending = true;
        state.user_id = None;
        state.last_admitted = None;
    }
}
