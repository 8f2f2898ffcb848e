//! Usage: Single-flight coordination of access-token refresh.
//!
//! The first request that needs a refresh becomes the leader and receives a
//! [`RefreshLease`]; every request that needs one while the lease is held is
//! queued as a [`RefreshWaiter`]. Settling the lease releases waiters in FIFO
//! order with the same outcome.
//!
//! A successful refresh also hands out [`ReplayTicket`]s chained in queue
//! order (leader first), so replays reach the server in the order the
//! requests were queued no matter how the runtime schedules the tasks.

use crate::shared::error::{AppError, AppResult};
use crate::shared::mutex_ext::MutexExt;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::oneshot;

type RefreshOutcome = AppResult<ReplayGrant>;

#[derive(Debug, Default)]
struct RefreshState {
    in_flight: bool,
    waiters: VecDeque<oneshot::Sender<RefreshOutcome>>,
    cycles: u64,
}

#[derive(Debug, Default)]
pub struct SessionManager {
    state: Mutex<RefreshState>,
}

pub enum RefreshSlot<'a> {
    Leader(RefreshLease<'a>),
    Waiter(RefreshWaiter),
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Become the refresh leader, or join the queue behind the current one.
    ///
    /// The flag check and the queue push happen under one lock, so at most one
    /// lease exists at a time.
    pub fn acquire(&self) -> RefreshSlot<'_> {
        let mut guard = self.state.lock_or_recover();
        if guard.in_flight {
            let (tx, rx) = oneshot::channel();
            guard.waiters.push_back(tx);
            let position = guard.waiters.len();
            drop(guard);
            tracing::debug!(position, "refresh in flight; request queued");
            return RefreshSlot::Waiter(RefreshWaiter { rx });
        }

        guard.in_flight = true;
        guard.cycles = guard.cycles.saturating_add(1);
        let cycle = guard.cycles;
        drop(guard);
        tracing::debug!(cycle, "refresh lease acquired");
        RefreshSlot::Leader(RefreshLease {
            manager: self,
            cycle,
            settled: false,
        })
    }

    pub fn is_refreshing(&self) -> bool {
        self.state.with_recovered(|state| state.in_flight)
    }

    /// Number of requests currently queued behind an in-flight refresh.
    pub fn pending(&self) -> usize {
        self.state.with_recovered(|state| state.waiters.len())
    }

    /// Number of refresh cycles started over the lifetime of this manager.
    pub fn refresh_cycles(&self) -> u64 {
        self.state.with_recovered(|state| state.cycles)
    }

    fn take_waiters(&self) -> VecDeque<oneshot::Sender<RefreshOutcome>> {
        self.state.with_recovered(|state| {
            state.in_flight = false;
            std::mem::take(&mut state.waiters)
        })
    }

    fn settle_resolved(&self, access_token: &str) -> ResolvedRefresh {
        let waiters = self.take_waiters();

        let (leader_done, mut previous) = oneshot::channel();
        let leader_ticket = ReplayTicket {
            position: 0,
            previous: None,
            next: Some(leader_done),
        };

        let mut released = 0usize;
        for (index, tx) in waiters.into_iter().enumerate() {
            let (done, next_previous) = oneshot::channel();
            let ticket = ReplayTicket {
                position: index + 1,
                previous: Some(std::mem::replace(&mut previous, next_previous)),
                next: Some(done),
            };
            let grant = ReplayGrant {
                access_token: access_token.to_string(),
                ticket,
            };
            // A dropped receiver means that caller gave up waiting; its
            // ticket is dropped with it, which passes the turn along.
            if tx.send(Ok(grant)).is_ok() {
                released += 1;
            }
        }

        ResolvedRefresh {
            released,
            ticket: leader_ticket,
        }
    }

    fn settle_rejected(&self, err: AppError) -> usize {
        let mut released = 0usize;
        for tx in self.take_waiters() {
            if tx.send(Err(err.clone())).is_ok() {
                released += 1;
            }
        }
        released
    }
}

/// New access token plus the caller's place in the replay order.
#[derive(Debug)]
pub struct ReplayGrant {
    pub access_token: String,
    pub ticket: ReplayTicket,
}

/// Result of a successful [`RefreshLease::resolve`].
#[derive(Debug)]
pub struct ResolvedRefresh {
    /// Queued requests that were still waiting and received the token.
    pub released: usize,
    /// The leader's own replay turn; it goes before every queued request.
    pub ticket: ReplayTicket,
}

/// One link in the replay chain of a refresh cycle.
///
/// [`wait_turn`](Self::wait_turn) returns once the previous request in queue
/// order has been replayed (or abandoned). Passing or dropping the ticket
/// lets the next one go.
#[derive(Debug)]
pub struct ReplayTicket {
    position: usize,
    previous: Option<oneshot::Receiver<()>>,
    next: Option<oneshot::Sender<()>>,
}

impl ReplayTicket {
    /// 0 for the leader, then 1.. in enqueue order.
    pub fn position(&self) -> usize {
        self.position
    }

    pub async fn wait_turn(&mut self) {
        if let Some(previous) = self.previous.take() {
            // Err means the previous holder was dropped; the turn is ours either way.
            let _ = previous.await;
        }
    }

    pub fn pass(mut self) {
        if let Some(next) = self.next.take() {
            let _ = next.send(());
        }
    }
}

/// Proof of refresh leadership. Must be settled with [`resolve`](Self::resolve)
/// or [`reject`](Self::reject); dropping it unsettled rejects the queue.
#[must_use = "an unsettled lease rejects every queued request when dropped"]
pub struct RefreshLease<'a> {
    manager: &'a SessionManager,
    cycle: u64,
    settled: bool,
}

impl RefreshLease<'_> {
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Release every queued request with the new access token.
    pub fn resolve(mut self, access_token: &str) -> ResolvedRefresh {
        self.settled = true;
        let resolved = self.manager.settle_resolved(access_token);
        tracing::debug!(cycle = self.cycle, released = resolved.released, "refresh resolved");
        resolved
    }

    /// Fail every queued request with the refresh error.
    pub fn reject(mut self, err: AppError) -> usize {
        self.settled = true;
        let released = self.manager.settle_rejected(err);
        tracing::debug!(cycle = self.cycle, released, "refresh rejected");
        released
    }
}

impl Drop for RefreshLease<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        tracing::warn!(
            cycle = self.cycle,
            "refresh leader dropped before settling; rejecting queued requests"
        );
        self.manager.settle_rejected(AppError::new(
            "AUTH_REFRESH_ABORTED",
            "token refresh was abandoned before completing",
        ));
    }
}

#[derive(Debug)]
pub struct RefreshWaiter {
    rx: oneshot::Receiver<RefreshOutcome>,
}

impl RefreshWaiter {
    /// Suspend until the leader settles; yields the new access token and
    /// this request's replay turn.
    pub async fn wait(self) -> AppResult<ReplayGrant> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(AppError::new(
                "AUTH_REFRESH_ABORTED",
                "token refresh ended without a result",
            )),
        }
    }
}
