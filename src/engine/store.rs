use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

pub type SharedCampgroundState = Arc<RwLock<CampgroundState>>;

/// In-memory repository for everything the journal describes.
///
/// Campground state (tags, reservation records, interval index) sits behind a
/// per-campground lock. The side maps here are lock-free lookups kept in step
/// with it by `apply_event`.
pub struct Store {
    campgrounds: DashMap<Ulid, SharedCampgroundState>,
    /// Reverse lookup: reservation id → campground id.
    reservation_to_campground: DashMap<Ulid, Ulid>,
    tags: DashMap<Ulid, Tag>,
    tag_names: DashMap<String, Ulid>,
    /// Inverted index: tag id → campgrounds carrying it.
    postings: DashMap<Ulid, HashSet<Ulid>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            campgrounds: DashMap::new(),
            reservation_to_campground: DashMap::new(),
            tags: DashMap::new(),
            tag_names: DashMap::new(),
            postings: DashMap::new(),
        }
    }

    /// Rebuild state from journal history. Nothing else holds these locks
    /// yet, so `try_write` always succeeds.
    pub fn from_events(events: &[Event]) -> Self {
        let store = Self::new();
        for event in events {
            match event {
                Event::CampgroundCreated { .. }
                | Event::CampgroundDeleted { .. }
                | Event::TagCreated { .. } => store.apply_catalog(event),
                Event::TagDeleted { id } => {
                    for cid in store.remove_tag(id) {
                        if let Some(cs) = store.get_campground(&cid)
                            && let Ok(mut guard) = cs.try_write()
                        {
                            guard.tags.remove(id);
                        }
                    }
                }
                other => {
                    if let Some(cid) = other.campground_id()
                        && let Some(cs) = store.get_campground(&cid)
                        && let Ok(mut guard) = cs.try_write()
                    {
                        store.apply_event(&mut guard, other);
                    }
                }
            }
        }
        // The index is a cache; derive it from the replayed records.
        for cs in store.campgrounds() {
            if let Ok(mut guard) = cs.try_write() {
                guard.rebuild_index();
            }
        }
        store
    }

    // ── Campgrounds ──────────────────────────────────────────

    pub fn campground_count(&self) -> usize {
        self.campgrounds.len()
    }

    pub fn contains_campground(&self, id: &Ulid) -> bool {
        self.campgrounds.contains_key(id)
    }

    pub fn get_campground(&self, id: &Ulid) -> Option<SharedCampgroundState> {
        self.campgrounds.get(id).map(|e| e.value().clone())
    }

    /// Snapshot of all campground handles. Collect before awaiting on any of
    /// them so no map shard stays locked across an await point.
    pub fn campgrounds(&self) -> Vec<SharedCampgroundState> {
        self.campgrounds.iter().map(|e| e.value().clone()).collect()
    }

    /// Drop a campground and every lookup pointing into it.
    pub fn remove_campground(&self, state: &CampgroundState) {
        for rid in state.reservations.keys() {
            self.reservation_to_campground.remove(rid);
        }
        for tag_id in &state.tags {
            self.remove_posting(tag_id, &state.id);
        }
        self.campgrounds.remove(&state.id);
    }

    // ── Reservation lookup ───────────────────────────────────

    pub fn campground_for_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.reservation_to_campground
            .get(reservation_id)
            .map(|e| *e.value())
    }

    /// Reserve `reservation_id` for `campground_id` before its event is
    /// journaled. Fails if any campground already owns the id.
    pub fn claim_reservation(&self, reservation_id: Ulid, campground_id: Ulid) -> bool {
        match self.reservation_to_campground.entry(reservation_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(campground_id);
                true
            }
        }
    }

    /// Undo a claim whose event never made it into the journal.
    pub fn release_reservation_claim(&self, reservation_id: &Ulid, campground_id: &Ulid) {
        self.reservation_to_campground
            .remove_if(reservation_id, |_, owner| owner == campground_id);
    }

    // ── Tags ─────────────────────────────────────────────────

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    pub fn get_tag(&self, id: &Ulid) -> Option<Tag> {
        self.tags.get(id).map(|e| e.value().clone())
    }

    pub fn tag_by_name(&self, name: &str) -> Option<Ulid> {
        self.tag_names.get(name).map(|e| *e.value())
    }

    pub fn tags(&self) -> Vec<Tag> {
        self.tags.iter().map(|e| e.value().clone()).collect()
    }

    /// Unregister a tag. Returns the campgrounds that still carry it; the
    /// caller removes it from their tag sets under their locks.
    pub fn remove_tag(&self, id: &Ulid) -> Vec<Ulid> {
        if let Some((_, tag)) = self.tags.remove(id) {
            self.tag_names.remove(&tag.name);
        }
        self.postings
            .remove(id)
            .map(|(_, set)| set.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn campgrounds_with_tag(&self, tag_id: &Ulid) -> Vec<Ulid> {
        self.postings
            .get(tag_id)
            .map(|e| e.value().iter().copied().collect())
            .unwrap_or_default()
    }

    fn remove_posting(&self, tag_id: &Ulid, campground_id: &Ulid) {
        if let Some(mut set) = self.postings.get_mut(tag_id) {
            set.remove(campground_id);
        }
    }

    // ── Event application ────────────────────────────────────

    /// Apply catalog events that are not scoped to a single campground lock.
    pub fn apply_catalog(&self, event: &Event) {
        match event {
            Event::CampgroundCreated {
                id,
                name,
                max_reservations,
            } => {
                let cs = CampgroundState::new(*id, name.clone(), *max_reservations);
                self.campgrounds.insert(*id, Arc::new(RwLock::new(cs)));
            }
            Event::CampgroundDeleted { id } => {
                if let Some(cs) = self.get_campground(id)
                    && let Ok(guard) = cs.try_read()
                {
                    self.remove_campground(&guard);
                } else {
                    self.campgrounds.remove(id);
                }
            }
            Event::TagCreated { id, name } => {
                self.tags.insert(
                    *id,
                    Tag {
                        id: *id,
                        name: name.clone(),
                    },
                );
                self.tag_names.insert(name.clone(), *id);
            }
            _ => {}
        }
    }

    /// Apply a campground-scoped event. Caller holds the campground write lock
    /// and has already checked the transition is legal.
    pub fn apply_event(&self, cs: &mut CampgroundState, event: &Event) {
        match event {
            Event::CampgroundUpdated {
                name,
                max_reservations,
                rating,
                ..
            } => {
                cs.name = name.clone();
                cs.max_reservations = *max_reservations;
                cs.rating = *rating;
            }
            Event::TagAttached {
                campground_id,
                tag_id,
            } => {
                cs.tags.insert(*tag_id);
                self.postings
                    .entry(*tag_id)
                    .or_default()
                    .insert(*campground_id);
            }
            Event::TagDetached {
                campground_id,
                tag_id,
            } => {
                cs.tags.remove(tag_id);
                self.remove_posting(tag_id, campground_id);
            }
            Event::ReservationRequested {
                id,
                campground_id,
                user_id,
                span,
                count,
                created_at,
            } => {
                cs.reservations.insert(
                    *id,
                    Reservation {
                        id: *id,
                        campground_id: *campground_id,
                        user_id: user_id.clone(),
                        span: *span,
                        count: *count,
                        status: ReservationStatus::Pending,
                        created_at: *created_at,
                        updated_at: *created_at,
                    },
                );
                cs.index.insert(*id, *span, *count);
                self.reservation_to_campground.insert(*id, *campground_id);
            }
            Event::ReservationConfirmed { id, at, .. } => {
                set_status(cs, id, ReservationStatus::Confirmed, *at);
            }
            Event::ReservationCancelled { id, at, .. } => {
                set_status(cs, id, ReservationStatus::Cancelled, *at);
                cs.index.remove(id);
            }
            Event::ReservationExpired { id, at, .. } => {
                set_status(cs, id, ReservationStatus::Expired, *at);
                cs.index.remove(id);
            }
            Event::ReservationPurged { id, .. } => {
                cs.reservations.remove(id);
                cs.index.remove(id);
                self.reservation_to_campground.remove(id);
            }
            Event::CampgroundCreated { .. }
            | Event::CampgroundDeleted { .. }
            | Event::TagCreated { .. }
            | Event::TagDeleted { .. } => {}
        }
    }
}

fn set_status(cs: &mut CampgroundState, id: &Ulid, status: ReservationStatus, at: Ms) {
    if let Some(r) = cs.reservations.get_mut(id) {
        r.status = status;
        r.updated_at = at;
    }
}
