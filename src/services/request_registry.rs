//! Outstanding decryption requests, keyed by oracle token.
//!
//! Tokens are single-use. `resolve` looks an entry up and removes it under
//! one lock, so among concurrent deliveries of the same token exactly one
//! caller gets the entry and every other caller gets `UnknownRequest`.
//!
//! The oracle is called outside the lock. A registration is tracked as in
//! flight from before the oracle call until its entry is inserted, and a
//! `resolve` that misses waits for registrations that were in flight when
//! it started. A callback that overtakes its own registration therefore
//! still resolves, while lookups for other tokens never wait on an oracle.
//!
//! Entries older than the request timeout are expired: resolving one yields
//! `Expired`, and [`RequestRegistry::sweep_expired`] reclaims abandoned ones.
//! Expired tokens are remembered as tombstones for a retention window so a
//! late callback is reported as `Expired` rather than as a forgery.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    CiphertextHandle, PendingRequest, RegistryConfig, RequestKind, RequestToken, ReviewId,
};
use crate::domain::ports::DecryptionOracle;

#[derive(Debug, Default)]
struct RegistryState {
    pending: HashMap<RequestToken, PendingRequest>,
    tombstones: HashMap<RequestToken, Instant>,
    /// Tickets of registrations whose oracle call has not finished.
    in_flight: BTreeSet<u64>,
    next_ticket: u64,
}

impl RegistryState {
    /// Remove `token` if it is known. `None` means it was never registered
    /// (or its tombstone was purged).
    fn take(
        &mut self,
        token: &RequestToken,
        request_timeout: Duration,
    ) -> Option<DomainResult<PendingRequest>> {
        if let Some(request) = self.pending.remove(token) {
            if request.issued_at.elapsed() > request_timeout {
                self.tombstones.insert(*token, Instant::now());
                return Some(Err(DomainError::Expired(*token)));
            }
            return Some(Ok(request));
        }
        if self.tombstones.contains_key(token) {
            return Some(Err(DomainError::Expired(*token)));
        }
        None
    }

    /// Whether any registration that started before `horizon` is still
    /// waiting on the oracle.
    fn registering_before(&self, horizon: u64) -> bool {
        self.in_flight.first().is_some_and(|&ticket| ticket < horizon)
    }
}

/// Marks one registration as in flight until dropped, including when the
/// oracle call fails or the registering future is cancelled.
struct InFlightRegistration<'a> {
    registry: &'a RequestRegistry,
    ticket: u64,
}

impl Drop for InFlightRegistration<'_> {
    fn drop(&mut self) {
        self.registry.lock_state().in_flight.remove(&self.ticket);
        self.registry.settled.notify_waiters();
    }
}

/// Result of one expiry sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Requests that timed out during this sweep.
    pub expired: Vec<PendingRequest>,
    /// Tombstones dropped after their retention window.
    pub purged_tombstones: usize,
}

/// Token-keyed table of decryption requests awaiting their callback.
///
/// Shared by the engine, the callback listener and the sweeper. Every
/// operation takes a short synchronous lock; none of them holds it across
/// an await point.
#[derive(Debug)]
pub struct RequestRegistry {
    state: Mutex<RegistryState>,
    settled: Notify,
    request_timeout: Duration,
    tombstone_retention: Duration,
}

impl RequestRegistry {
    /// Create a registry with explicit expiry and tombstone windows.
    pub fn new(request_timeout: Duration, tombstone_retention: Duration) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            settled: Notify::new(),
            request_timeout,
            tombstone_retention,
        }
    }

    /// Create a registry from the `registry` config section.
    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(config.request_timeout(), config.tombstone_retention())
    }

    /// Age after which an unanswered request is expired.
    pub const fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    fn lock_state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_registration(&self) -> InFlightRegistration<'_> {
        let mut state = self.lock_state();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.in_flight.insert(ticket);
        InFlightRegistration {
            registry: self,
            ticket,
        }
    }

    /// Ask the oracle to decrypt `handles` and record the returned token.
    ///
    /// The oracle call runs without the registry lock, so a slow oracle only
    /// delays this registration. A token that is already outstanding (or
    /// recently expired) fails with `DuplicateToken` and leaves the registry
    /// untouched.
    pub async fn register(
        &self,
        oracle: &dyn DecryptionOracle,
        handles: &[CiphertextHandle],
        subject_id: ReviewId,
        kind: RequestKind,
    ) -> DomainResult<PendingRequest> {
        let registration = self.begin_registration();
        let token = oracle.request_decryption(handles, kind).await?;
        let request = PendingRequest::new(token, subject_id, kind);

        {
            let mut state = self.lock_state();
            if state.pending.contains_key(&token) || state.tombstones.contains_key(&token) {
                tracing::error!(%token, %kind, review_id = %subject_id, "oracle returned a token that is already in use");
                return Err(DomainError::DuplicateToken(token));
            }
            state.pending.insert(token, request.clone());
            tracing::debug!(%token, %kind, review_id = %subject_id, outstanding = state.pending.len(), "registered decryption request");
        }

        // Entry is visible before the ticket is released.
        drop(registration);
        Ok(request)
    }

    /// Consume the entry for `token`.
    ///
    /// On a miss, waits for registrations that were already in flight and
    /// looks again. Gives up with `UnknownRequest` once none of them remain
    /// or after the request timeout.
    pub async fn resolve(&self, token: &RequestToken) -> DomainResult<PendingRequest> {
        let deadline = Instant::now() + self.request_timeout;
        let mut horizon = None;

        loop {
            let settled = self.settled.notified();
            {
                let mut state = self.lock_state();
                if let Some(result) = state.take(token, self.request_timeout) {
                    return result;
                }
                let cutoff = *horizon.get_or_insert(state.next_ticket);
                if !state.registering_before(cutoff) {
                    return Err(DomainError::UnknownRequest(*token));
                }
            }

            if tokio::time::timeout_at(deadline, settled).await.is_err() {
                tracing::warn!(%token, "in-flight registrations did not settle before the request timeout");
                return Err(DomainError::UnknownRequest(*token));
            }
        }
    }

    /// Drop the entry for `token` without checks. Used when a callback fails
    /// authentication: the token is spent either way.
    pub fn discard(&self, token: &RequestToken) -> Option<PendingRequest> {
        self.lock_state().pending.remove(token)
    }

    /// Expire timed-out requests and purge old tombstones.
    pub fn sweep_expired(&self) -> SweepReport {
        let mut state = self.lock_state();
        let now = Instant::now();

        let expired_tokens: Vec<RequestToken> = state
            .pending
            .values()
            .filter(|request| now.duration_since(request.issued_at) > self.request_timeout)
            .map(|request| request.token)
            .collect();

        let mut expired = Vec::with_capacity(expired_tokens.len());
        for token in expired_tokens {
            if let Some(request) = state.pending.remove(&token) {
                state.tombstones.insert(token, now);
                expired.push(request);
            }
        }

        let before = state.tombstones.len();
        let retention = self.tombstone_retention;
        state
            .tombstones
            .retain(|_, expired_at| now.duration_since(*expired_at) <= retention);

        SweepReport {
            expired,
            purged_tombstones: before - state.tombstones.len(),
        }
    }

    /// Number of requests awaiting a callback.
    pub fn outstanding(&self) -> usize {
        self.lock_state().pending.len()
    }

    /// Whether `token` is registered and not yet resolved.
    pub fn is_outstanding(&self, token: &RequestToken) -> bool {
        self.lock_state().pending.contains_key(token)
    }

    /// Outstanding requests for one review, in no particular order.
    pub fn pending_for(&self, subject_id: ReviewId) -> Vec<PendingRequest> {
        self.lock_state()
            .pending
            .values()
            .filter(|request| request.subject_id == subject_id)
            .cloned()
            .collect()
    }
}

impl Default for RequestRegistry {
    fn default() -> Self {
        Self::from_config(&RegistryConfig::default())
    }
}
