mod admission;
mod catalog;
mod error;
mod index;
mod journal;
mod lifecycle;
mod queries;
mod similarity;
mod store;

pub use admission::now_ms;
pub use error::EngineError;
pub use index::{free_spans, IndexEntry, IntervalIndex};
pub use journal::{Journal, MemoryJournal, WalJournal};
pub use similarity::rank_order;
pub use store::{SharedCampgroundState, Store};

use std::io;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::observability;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Pending reservations older than this are expired by the sweep.
    pub pending_ttl_ms: Ms,
    /// Upper bound on waiting for a campground lock.
    pub admission_timeout: Duration,
    /// How long Cancelled/Expired records are kept before purging.
    pub archive_retention_ms: Ms,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pending_ttl_ms: 3_600_000,
            admission_timeout: Duration::from_secs(2),
            archive_retention_ms: 7 * 86_400_000,
        }
    }
}

/// Write access to one campground. Holds the commit gate in shared mode so
/// compaction never snapshots a half-applied change.
pub struct CampgroundWrite {
    guard: OwnedRwLockWriteGuard<CampgroundState>,
    _gate: OwnedRwLockReadGuard<()>,
}

impl Deref for CampgroundWrite {
    type Target = CampgroundState;

    fn deref(&self) -> &CampgroundState {
        &self.guard
    }
}

impl DerefMut for CampgroundWrite {
    fn deref_mut(&mut self) -> &mut CampgroundState {
        &mut self.guard
    }
}

pub struct Engine {
    pub(super) store: Store,
    pub(super) journal: Arc<dyn Journal>,
    pub(super) config: EngineConfig,
    /// Mutations hold it shared; compaction takes it exclusively.
    /// Always acquired before any campground lock.
    commit_gate: Arc<RwLock<()>>,
    /// Serializes catalog changes (campgrounds, tags). Never taken on the
    /// reservation path.
    catalog_lock: Mutex<()>,
}

impl Engine {
    /// Open a file-backed engine, replaying its journal. Needs a tokio runtime.
    pub fn open(path: &Path, config: EngineConfig) -> io::Result<Self> {
        let (journal, events) = WalJournal::open(path)?;
        let store = Store::from_events(&events);
        tracing::info!(
            "replayed {} events: {} campgrounds, {} tags",
            events.len(),
            store.campground_count(),
            store.tag_count()
        );
        Ok(Self::from_parts(store, Arc::new(journal), config))
    }

    pub fn in_memory(config: EngineConfig) -> Self {
        Self::from_parts(Store::new(), Arc::new(MemoryJournal::new()), config)
    }

    pub fn from_parts(store: Store, journal: Arc<dyn Journal>, config: EngineConfig) -> Self {
        Self {
            store,
            journal,
            config,
            commit_gate: Arc::new(RwLock::new(())),
            catalog_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Take the campground write lock, bounded by the admission timeout.
    pub(super) async fn lock_campground(&self, id: Ulid) -> Result<CampgroundWrite, EngineError> {
        let cs = self.store.get_campground(&id).ok_or(EngineError::NotFound(id))?;
        let gate = self.commit_gate.clone();
        let started = Instant::now();
        let acquired = tokio::time::timeout(self.config.admission_timeout, async move {
            let gate = gate.read_owned().await;
            let guard = cs.write_owned().await;
            CampgroundWrite { guard, _gate: gate }
        })
        .await;
        metrics::histogram!(observability::LOCK_WAIT_SECONDS)
            .record(started.elapsed().as_secs_f64());
        let write = acquired.map_err(|_| {
            metrics::counter!(observability::ADMISSION_TIMEOUTS_TOTAL).increment(1);
            EngineError::AdmissionTimeout(id)
        })?;
        // Deleted while we were queued.
        if !self.store.contains_campground(&id) {
            return Err(EngineError::NotFound(id));
        }
        Ok(write)
    }

    /// Lookup reservation → campground, then lock that campground.
    pub(super) async fn lock_reservation(
        &self,
        reservation_id: Ulid,
    ) -> Result<CampgroundWrite, EngineError> {
        let campground_id = self
            .store
            .campground_for_reservation(&reservation_id)
            .ok_or(EngineError::NotFound(reservation_id))?;
        let write = self.lock_campground(campground_id).await?;
        if !write.reservations.contains_key(&reservation_id) {
            // Purged between lookup and lock.
            return Err(EngineError::NotFound(reservation_id));
        }
        Ok(write)
    }

    /// Hold the commit gate shared without touching a campground.
    pub(super) async fn hold_commit_gate(&self) -> OwnedRwLockReadGuard<()> {
        self.commit_gate.clone().read_owned().await
    }

    pub(super) async fn catalog_lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.catalog_lock.lock().await
    }

    /// Journal first, then apply. A failed append leaves memory untouched.
    pub(super) async fn persist_and_apply(
        &self,
        cs: &mut CampgroundState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.journal.append(event).await?;
        self.store.apply_event(cs, event);
        Ok(())
    }

    /// Rewrite the journal with only the events needed to recreate current state.
    pub async fn compact(&self) -> Result<(), EngineError> {
        let _exclusive = self.commit_gate.write().await;
        let mut events = Vec::new();

        let mut tags = self.store.tags();
        tags.sort_by_key(|t| t.id);
        for tag in tags {
            events.push(Event::TagCreated {
                id: tag.id,
                name: tag.name,
            });
        }

        for cs in self.store.campgrounds() {
            let guard = cs.read().await;
            snapshot_campground(&guard, &mut events);
        }

        let count = events.len();
        self.journal.compact(events).await?;
        tracing::info!("compacted journal to {count} events");
        Ok(())
    }

    pub async fn appends_since_compact(&self) -> u64 {
        self.journal.appends_since_compact().await
    }
}

fn snapshot_campground(cs: &CampgroundState, events: &mut Vec<Event>) {
    events.push(Event::CampgroundCreated {
        id: cs.id,
        name: cs.name.clone(),
        max_reservations: cs.max_reservations,
    });
    if cs.rating.is_some() {
        events.push(Event::CampgroundUpdated {
            id: cs.id,
            name: cs.name.clone(),
            max_reservations: cs.max_reservations,
            rating: cs.rating,
        });
    }
    for tag_id in &cs.tags {
        events.push(Event::TagAttached {
            campground_id: cs.id,
            tag_id: *tag_id,
        });
    }

    let mut records: Vec<&Reservation> = cs.reservations.values().collect();
    records.sort_by_key(|r| r.id);
    for r in records {
        events.push(Event::ReservationRequested {
            id: r.id,
            campground_id: cs.id,
            user_id: r.user_id.clone(),
            span: r.span,
            count: r.count,
            created_at: r.created_at,
        });
        let (id, campground_id, at) = (r.id, cs.id, r.updated_at);
        match r.status {
            ReservationStatus::Pending => {}
            ReservationStatus::Confirmed => events.push(Event::ReservationConfirmed {
                id,
                campground_id,
                at,
            }),
            ReservationStatus::Cancelled => events.push(Event::ReservationCancelled {
                id,
                campground_id,
                at,
            }),
            ReservationStatus::Expired => events.push(Event::ReservationExpired {
                id,
                campground_id,
                at,
            }),
        }
    }
}
