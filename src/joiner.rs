//! Bounded fan-out of enrichment fetches with a per-task deadline.
//!
//! A [`FetchPool`] is shared by every request and caps the number of outbound
//! calls in flight. Each request gets its own [`Joiner`], launches its fetches
//! as [`Pending`] handles, and settles them in whatever order the reply needs.
//! A fetch that overruns its deadline is dropped (cancelled), and dropping an
//! unsettled [`Pending`] aborts its task.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::types::SectionId;

/// Process-wide permit pool for enrichment fetches.
#[derive(Clone)]
pub struct FetchPool {
    permits: Arc<Semaphore>,
}

impl FetchPool {
    pub fn new(max_in_flight: usize) -> Self {
        Self { permits: Arc::new(Semaphore::new(max_in_flight.max(1))) }
    }

    pub fn available(&self) -> usize { self.permits.available_permits() }

    /// Start a per-request joiner drawing from this pool.
    pub fn joiner(&self) -> Joiner {
        Joiner { permits: self.permits.clone(), report: JoinReport::default() }
    }
}

/// How one slot of the joined result was filled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotState {
    Fetched,
    /// Value carried over from a stored record; nothing was fetched.
    Replayed,
    TimedOut,
    Failed(String),
}

/// Per-request record of every settled slot, in settle order.
#[derive(Debug, Clone, Default)]
pub struct JoinReport {
    slots: Vec<(SectionId, SlotState)>,
}

impl JoinReport {
    pub fn slots(&self) -> &[(SectionId, SlotState)] { &self.slots }

    pub fn state_of(&self, section: SectionId) -> Option<&SlotState> {
        self.slots.iter().find(|(s, _)| *s == section).map(|(_, st)| st)
    }

    pub fn fetched(&self) -> usize {
        self.slots.iter().filter(|(_, st)| *st == SlotState::Fetched).count()
    }

    pub fn fallbacks(&self) -> usize {
        self.slots
            .iter()
            .filter(|(_, st)| matches!(st, SlotState::TimedOut | SlotState::Failed(_)))
            .count()
    }

    fn record(&mut self, section: SectionId, state: SlotState) { self.slots.push((section, state)); }
}

/// Result of settling one slot: the value, or the error that forced a fallback.
#[derive(Debug)]
pub enum Settled<T> {
    Ready(T),
    Fallback(PipelineError),
}

impl<T> Settled<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Settled::Ready(v) => Some(v),
            Settled::Fallback(_) => None,
        }
    }

    pub fn unwrap_or(self, fallback: T) -> T { self.ok().unwrap_or(fallback) }

    pub fn unwrap_or_else(self, f: impl FnOnce(&PipelineError) -> T) -> T {
        match self {
            Settled::Ready(v) => v,
            Settled::Fallback(e) => f(&e),
        }
    }

    pub fn is_ready(&self) -> bool { matches!(self, Settled::Ready(_)) }
}

impl<T: Default> Settled<T> {
    pub fn unwrap_or_default(self) -> T { self.ok().unwrap_or_default() }
}

enum Slot<T> {
    Running(JoinHandle<Result<T, PipelineError>>),
    Replay(T),
    Done,
}

/// A launched (or replayed) fetch that has not been settled yet.
pub struct Pending<T> {
    section: SectionId,
    slot: Slot<T>,
}

impl<T> Pending<T> {
    /// A slot whose value is already known, e.g. carried by a cached record.
    pub fn replay(section: SectionId, value: T) -> Self {
        Self { section, slot: Slot::Replay(value) }
    }

    pub fn section(&self) -> SectionId { self.section }

    async fn wait(mut self) -> Result<T, PipelineError> {
        // The handle stays in `self` while awaited so a dropped waiter still aborts it.
        if let Slot::Running(handle) = &mut self.slot {
            let joined = handle.await;
            self.slot = Slot::Done;
            return match joined {
                Ok(res) => res,
                Err(join_err) => Err(PipelineError::FetchFailure {
                    section: self.section,
                    reason: join_err.to_string(),
                }),
            };
        }
        match std::mem::replace(&mut self.slot, Slot::Done) {
            Slot::Replay(v) => Ok(v),
            _ => Err(PipelineError::FetchFailure {
                section: self.section,
                reason: "slot already settled".to_string(),
            }),
        }
    }

    fn is_replay(&self) -> bool { matches!(self.slot, Slot::Replay(_)) }

    /// Settle a slot that outlives its request's joiner. Logged like any other
    /// slot; the state is returned instead of recorded.
    pub async fn settle_detached(self) -> (SlotState, Settled<T>) {
        self.settle_state().await
    }

    async fn settle_state(self) -> (SlotState, Settled<T>) {
        let section = self.section();
        let replayed = self.is_replay();
        match self.wait().await {
            Ok(v) => {
                let state = if replayed { SlotState::Replayed } else { SlotState::Fetched };
                debug!(section = %section, state = ?state, "slot settled");
                (state, Settled::Ready(v))
            }
            Err(e) => {
                warn!(section = %section, error = %e, "enrichment fell back");
                let state = match &e {
                    PipelineError::FetchTimeout { .. } => SlotState::TimedOut,
                    other => SlotState::Failed(other.to_string()),
                };
                (state, Settled::Fallback(e))
            }
        }
    }
}

impl<T> Drop for Pending<T> {
    fn drop(&mut self) {
        if let Slot::Running(handle) = &self.slot {
            handle.abort();
        }
    }
}

pub struct Joiner {
    permits: Arc<Semaphore>,
    report: JoinReport,
}

impl Joiner {
    /// Launch `fut` now. The deadline covers waiting for a pool permit as well
    /// as the call itself; on expiry the future is dropped.
    pub fn launch<T, F>(&self, section: SectionId, deadline: Duration, fut: F) -> Pending<T>
    where
        T: Send + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let permits = self.permits.clone();
        let handle = tokio::spawn(async move {
            let work = async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| anyhow::anyhow!("fetch pool closed: {e}"))?;
                fut.await
            };
            match tokio::time::timeout(deadline, work).await {
                Ok(Ok(v)) => Ok(v),
                Ok(Err(e)) => Err(PipelineError::FetchFailure { section, reason: format!("{e:#}") }),
                Err(_) => Err(PipelineError::FetchTimeout { section, after: deadline }),
            }
        });
        Pending { section, slot: Slot::Running(handle) }
    }

    /// Await one slot and record how it was filled. Never fails: errors come
    /// back as [`Settled::Fallback`] for the caller to substitute.
    pub async fn settle<T>(&mut self, pending: Pending<T>) -> Settled<T> {
        let section = pending.section();
        let (state, settled) = pending.settle_state().await;
        self.report.record(section, state);
        settled
    }

    /// Settle a batch in launch order.
    pub async fn settle_all<T>(&mut self, pending: Vec<Pending<T>>) -> Vec<Settled<T>> {
        let mut out = Vec::with_capacity(pending.len());
        for p in pending {
            out.push(self.settle(p).await);
        }
        out
    }

    pub fn report(&self) -> &JoinReport { &self.report }

    pub fn into_report(self) -> JoinReport { self.report }
}
