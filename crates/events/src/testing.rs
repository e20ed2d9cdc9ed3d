//! In-memory implementations of the engine's capability traits.
//!
//! Compiled for this crate's tests and, with the `testing` feature, for
//! downstream crates. Nothing here touches a database or the network.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use showcase_core::cadence::NotificationCadence;
use showcase_core::discussion::{DiscussionEvent, Participant};
use showcase_core::types::{DbId, Timestamp};

use crate::config::DispatchConfig;
use crate::delivery::{DeliveryError, EmailGateway, TemplatedEmail};
use crate::dispatcher::DeliveryDispatcher;
use crate::error::NotifyError;
use crate::ledger::{FlushLease, LedgerEntry, NotificationLedger, PendingNotification, RecordOutcome};
use crate::store::{DiscussionStore, PreferenceLookup};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// MemoryDiscussionStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredProject {
    title: String,
    owner_id: Option<DbId>,
}

#[derive(Debug, Clone)]
struct StoredDiscussion {
    project_id: DbId,
    author_id: Option<DbId>,
    parent_id: Option<DbId>,
    body: String,
    created_at: Timestamp,
}

#[derive(Debug, Default)]
struct StoreState {
    users: HashMap<DbId, Participant>,
    projects: HashMap<DbId, StoredProject>,
    discussions: BTreeMap<DbId, StoredDiscussion>,
    next_discussion_id: DbId,
}

impl StoreState {
    fn event(&self, id: DbId) -> Option<DiscussionEvent> {
        let d = self.discussions.get(&id)?;
        let project = self.projects.get(&d.project_id)?;
        let user = |uid: Option<DbId>| uid.and_then(|uid| self.users.get(&uid).cloned());
        let parent_author = d
            .parent_id
            .and_then(|pid| self.discussions.get(&pid))
            .and_then(|p| user(p.author_id));

        Some(DiscussionEvent {
            id,
            project_id: d.project_id,
            project_title: project.title.clone(),
            project_owner: user(project.owner_id),
            author: user(d.author_id),
            parent_id: d.parent_id,
            parent_author,
            body: d.body.clone(),
            created_at: d.created_at,
        })
    }
}

/// Users, projects, and discussions held in memory.
///
/// Users get the email `<lowercase name>@example.com` and the last name
/// `Example`. Discussion ids are assigned from 1 upward and timestamps
/// increase strictly with each post without running ahead of the clock
/// by more than a few microseconds.
#[derive(Debug, Default)]
pub struct MemoryDiscussionStore {
    state: Mutex<StoreState>,
}

impl MemoryDiscussionStore {
    pub fn add_user(&self, id: DbId, name: &str) -> DbId {
        let participant = Participant {
            id,
            email: format!("{}@example.com", name.to_lowercase()),
            first_name: name.to_string(),
            last_name: "Example".to_string(),
        };
        lock(&self.state).users.insert(id, participant);
        id
    }

    pub fn participant(&self, id: DbId) -> Option<Participant> {
        lock(&self.state).users.get(&id).cloned()
    }

    pub fn add_project(&self, id: DbId, title: &str, owner_id: Option<DbId>) -> DbId {
        lock(&self.state).projects.insert(
            id,
            StoredProject {
                title: title.to_string(),
                owner_id,
            },
        );
        id
    }

    /// Post a comment and return its id.
    pub fn post(
        &self,
        project_id: DbId,
        author_id: Option<DbId>,
        parent_id: Option<DbId>,
        body: &str,
    ) -> DbId {
        let mut state = lock(&self.state);
        state.next_discussion_id += 1;
        let id = state.next_discussion_id;
        let now = Utc::now();
        let created_at = match state.discussions.values().map(|d| d.created_at).max() {
            Some(last) if last >= now => last + TimeDelta::microseconds(1),
            _ => now,
        };
        state.discussions.insert(
            id,
            StoredDiscussion {
                project_id,
                author_id,
                parent_id,
                body: body.to_string(),
                created_at,
            },
        );
        id
    }

    pub fn event(&self, id: DbId) -> Option<DiscussionEvent> {
        lock(&self.state).event(id)
    }

    /// Ids of discussions created at or before `cutoff`, oldest first.
    pub fn created_before(&self, cutoff: Timestamp) -> Vec<DbId> {
        let state = lock(&self.state);
        let mut ids: Vec<(Timestamp, DbId)> = state
            .discussions
            .iter()
            .filter(|(_, d)| d.created_at <= cutoff)
            .map(|(id, d)| (d.created_at, *id))
            .collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id).collect()
    }
}

#[async_trait]
impl DiscussionStore for MemoryDiscussionStore {
    async fn get_event_by_id(&self, id: DbId) -> Result<Option<DiscussionEvent>, NotifyError> {
        Ok(self.event(id))
    }

    async fn list_replies_of(&self, root_id: DbId) -> Result<Vec<DiscussionEvent>, NotifyError> {
        let state = lock(&self.state);
        let mut replies: Vec<DiscussionEvent> = state
            .discussions
            .iter()
            .filter(|(_, d)| d.parent_id == Some(root_id))
            .filter_map(|(id, _)| state.event(*id))
            .collect();
        replies.sort_by_key(|r| (r.created_at, r.id));
        Ok(replies)
    }
}

// ---------------------------------------------------------------------------
// MemoryPreferences
// ---------------------------------------------------------------------------

/// Per-user cadences; users without an entry are `Immediate`.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    cadences: Mutex<HashMap<DbId, NotificationCadence>>,
}

impl MemoryPreferences {
    pub fn set(&self, user_id: DbId, cadence: NotificationCadence) {
        lock(&self.cadences).insert(user_id, cadence);
    }
}

#[async_trait]
impl PreferenceLookup for MemoryPreferences {
    async fn cadence_of(&self, user_id: DbId) -> Result<NotificationCadence, NotifyError> {
        Ok(lock(&self.cadences).get(&user_id).copied().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MemoryLedger
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct LedgerState {
    entries: Vec<LedgerEntry>,
    fail_records: u32,
    fail_marks: u32,
    held_leases: HashSet<NotificationCadence>,
    mark_calls: Vec<Vec<DbId>>,
    claims: HashMap<DbId, Timestamp>,
    notified: HashSet<DbId>,
}

/// Ledger held in memory, joined against a [`MemoryDiscussionStore`].
///
/// Can be told to fail upcoming writes or to report a cadence's flush lease
/// as held by someone else.
pub struct MemoryLedger {
    store: Arc<MemoryDiscussionStore>,
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new(store: Arc<MemoryDiscussionStore>) -> Self {
        Self {
            store,
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// All rows, in insertion order.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        lock(&self.state).entries.clone()
    }

    /// The id lists passed to each successful `mark_sent` call.
    pub fn mark_calls(&self) -> Vec<Vec<DbId>> {
        lock(&self.state).mark_calls.clone()
    }

    /// Make the next `n` calls to `record` fail.
    pub fn fail_next_records(&self, n: u32) {
        lock(&self.state).fail_records = n;
    }

    /// Make the next `n` calls to `mark_sent` fail.
    pub fn fail_next_marks(&self, n: u32) {
        lock(&self.state).fail_marks = n;
    }

    /// Report the flush lease for `cadence` as taken.
    pub fn hold_lease(&self, cadence: NotificationCadence) {
        lock(&self.state).held_leases.insert(cadence);
    }

    /// Hand a held flush lease back.
    pub fn release_lease(&self, cadence: NotificationCadence) {
        lock(&self.state).held_leases.remove(&cadence);
    }

    /// Whether notification creation finished for `discussion_id`.
    pub fn is_notified(&self, discussion_id: DbId) -> bool {
        lock(&self.state).notified.contains(&discussion_id)
    }

    fn pending(&self, entry: &LedgerEntry) -> Option<PendingNotification> {
        let event = self.store.event(entry.discussion_id)?;
        let recipient = self.store.participant(entry.recipient_id)?;
        Some(PendingNotification::from_event(entry, recipient, &event))
    }
}

fn injected_failure() -> NotifyError {
    NotifyError::Ledger(sqlx::Error::PoolTimedOut)
}

#[async_trait]
impl NotificationLedger for MemoryLedger {
    async fn record(
        &self,
        recipient_id: DbId,
        discussion_id: DbId,
        cadence: NotificationCadence,
    ) -> Result<RecordOutcome, NotifyError> {
        let mut state = lock(&self.state);
        if state.fail_records > 0 {
            state.fail_records -= 1;
            return Err(injected_failure());
        }
        if cadence == NotificationCadence::Never {
            return Ok(RecordOutcome::Skipped);
        }
        if state
            .entries
            .iter()
            .any(|e| e.recipient_id == recipient_id && e.discussion_id == discussion_id)
        {
            return Ok(RecordOutcome::Duplicate);
        }

        let entry = LedgerEntry {
            id: state.entries.len() as DbId + 1,
            recipient_id,
            discussion_id,
            cadence,
            sent: false,
            created_at: Utc::now(),
            sent_at: None,
        };
        state.entries.push(entry.clone());
        Ok(RecordOutcome::Created(entry))
    }

    async fn unsent_by_cadence(
        &self,
        cadence: NotificationCadence,
    ) -> Result<Vec<PendingNotification>, NotifyError> {
        let mut rows: Vec<LedgerEntry> = lock(&self.state)
            .entries
            .iter()
            .filter(|e| !e.sent && e.cadence == cadence)
            .cloned()
            .collect();
        rows.sort_by_key(|e| (e.recipient_id, e.created_at, e.id));

        // Rows whose discussion or recipient vanished drop out, like the
        // cascading deletes of the real schema.
        Ok(rows.iter().filter_map(|e| self.pending(e)).collect())
    }

    async fn mark_sent(&self, ids: &[DbId], sent_at: Timestamp) -> Result<u64, NotifyError> {
        let mut state = lock(&self.state);
        if state.fail_marks > 0 {
            state.fail_marks -= 1;
            return Err(injected_failure());
        }

        let mut marked = 0;
        for entry in state.entries.iter_mut() {
            if ids.contains(&entry.id) && !entry.sent {
                entry.sent = true;
                entry.sent_at = Some(sent_at);
                marked += 1;
            }
        }
        state.mark_calls.push(ids.to_vec());
        Ok(marked)
    }

    async fn claim(&self, ids: &[DbId], ttl: Duration) -> Result<Vec<DbId>, NotifyError> {
        let now = Utc::now();
        let until = now + TimeDelta::from_std(ttl).unwrap_or(TimeDelta::days(365));
        let mut state = lock(&self.state);

        let unsent: Vec<DbId> = state
            .entries
            .iter()
            .filter(|e| ids.contains(&e.id) && !e.sent)
            .map(|e| e.id)
            .collect();
        let mut claimed = Vec::new();
        for id in unsent {
            let free = state.claims.get(&id).map_or(true, |held| *held <= now);
            if free {
                state.claims.insert(id, until);
                claimed.push(id);
            }
        }
        Ok(claimed)
    }

    async fn release_claims(&self, ids: &[DbId]) -> Result<(), NotifyError> {
        let mut state = lock(&self.state);
        for id in ids {
            state.claims.remove(id);
        }
        Ok(())
    }

    async fn mark_discussion_notified(&self, discussion_id: DbId) -> Result<(), NotifyError> {
        lock(&self.state).notified.insert(discussion_id);
        Ok(())
    }

    async fn unnotified_discussions(
        &self,
        min_age: Duration,
        limit: i64,
    ) -> Result<Vec<DbId>, NotifyError> {
        let cutoff = Utc::now() - TimeDelta::from_std(min_age).unwrap_or(TimeDelta::days(365));
        let notified = lock(&self.state).notified.clone();
        Ok(self
            .store
            .created_before(cutoff)
            .into_iter()
            .filter(|id| !notified.contains(id))
            .take(usize::try_from(limit).unwrap_or(0))
            .collect())
    }

    async fn acquire_flush_lease(
        &self,
        cadence: NotificationCadence,
    ) -> Result<Option<FlushLease>, NotifyError> {
        if lock(&self.state).held_leases.contains(&cadence) {
            Ok(None)
        } else {
            Ok(Some(FlushLease::Local))
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingGateway
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct GatewayState {
    sent: Vec<TemplatedEmail>,
    failing: HashSet<String>,
    delay: Option<Duration>,
}

/// Gateway that records successful sends instead of delivering them.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    state: Mutex<GatewayState>,
}

impl RecordingGateway {
    pub fn sent(&self) -> Vec<TemplatedEmail> {
        lock(&self.state).sent.clone()
    }

    pub fn sent_to(&self, address: &str) -> Vec<TemplatedEmail> {
        lock(&self.state)
            .sent
            .iter()
            .filter(|e| e.to == address)
            .cloned()
            .collect()
    }

    /// Reject every send to `address` until [`recover`](Self::recover).
    pub fn fail_for(&self, address: &str) {
        lock(&self.state).failing.insert(address.to_string());
    }

    pub fn recover(&self, address: &str) {
        lock(&self.state).failing.remove(address);
    }

    /// Sleep this long inside every send.
    pub fn set_delay(&self, delay: Duration) {
        lock(&self.state).delay = Some(delay);
    }
}

#[async_trait]
impl EmailGateway for RecordingGateway {
    async fn send_templated(&self, email: &TemplatedEmail) -> Result<(), DeliveryError> {
        let delay = lock(&self.state).delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = lock(&self.state);
        if state.failing.contains(&email.to) {
            return Err(DeliveryError::Rejected(format!("mailbox {} unavailable", email.to)));
        }
        state.sent.push(email.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TestHarness
// ---------------------------------------------------------------------------

/// A dispatcher wired to in-memory fakes, with handles to each fake.
pub struct TestHarness {
    pub store: Arc<MemoryDiscussionStore>,
    pub preferences: Arc<MemoryPreferences>,
    pub ledger: Arc<MemoryLedger>,
    pub gateway: Arc<RecordingGateway>,
    pub dispatcher: Arc<DeliveryDispatcher>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(DispatchConfig::default())
    }

    pub fn with_config(config: DispatchConfig) -> Self {
        let store = Arc::new(MemoryDiscussionStore::default());
        let preferences = Arc::new(MemoryPreferences::default());
        let ledger = Arc::new(MemoryLedger::new(Arc::clone(&store)));
        let gateway = Arc::new(RecordingGateway::default());

        let dispatcher = Arc::new(DeliveryDispatcher::new(
            store.clone(),
            preferences.clone(),
            ledger.clone(),
            gateway.clone(),
            config,
        ));

        Self {
            store,
            preferences,
            ledger,
            gateway,
            dispatcher,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
