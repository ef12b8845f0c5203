use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::index::free_spans;
use super::{Engine, EngineError};

fn validate_window(span: &Span) -> Result<(), EngineError> {
    if span.is_empty() {
        return Err(EngineError::Validation("start must be before end"));
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_QUERY_WINDOW_MS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(())
}

impl Engine {
    pub async fn list_campgrounds(&self) -> Vec<CampgroundInfo> {
        let mut out = Vec::new();
        for cs in self.store.campgrounds() {
            out.push(cs.read().await.info());
        }
        out.sort_by_key(|c| c.id);
        out
    }

    pub async fn get_campground(&self, id: Ulid) -> Result<CampgroundInfo, EngineError> {
        let cs = self
            .store
            .get_campground(&id)
            .ok_or(EngineError::NotFound(id))?;
        let guard = cs.read().await;
        Ok(guard.info())
    }

    pub fn list_tags(&self) -> Vec<Tag> {
        let mut tags = self.store.tags();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        tags
    }

    pub async fn get_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let campground_id = self
            .store
            .campground_for_reservation(&id)
            .ok_or(EngineError::NotFound(id))?;
        let cs = self
            .store
            .get_campground(&campground_id)
            .ok_or(EngineError::NotFound(id))?;
        let guard = cs.read().await;
        guard
            .reservations
            .get(&id)
            .cloned()
            .ok_or(EngineError::NotFound(id))
    }

    /// All reservations of a campground, archived ones included, ordered by
    /// start then id. Unknown campgrounds have none.
    pub async fn list_reservations(&self, campground_id: Ulid) -> Vec<Reservation> {
        let Some(cs) = self.store.get_campground(&campground_id) else {
            return Vec::new();
        };
        let guard = cs.read().await;
        let mut out: Vec<Reservation> = guard.reservations.values().cloned().collect();
        out.sort_by_key(|r| (r.span.start, r.id));
        out
    }

    /// Peak simultaneous units held over `span`. Unknown campgrounds report 0.
    pub async fn peak_occupancy(&self, campground_id: Ulid, span: Span) -> u32 {
        if span.is_empty() {
            return 0;
        }
        match self.store.get_campground(&campground_id) {
            Some(cs) => cs.read().await.index.peak(&span),
            None => 0,
        }
    }

    pub async fn occupancy(&self, campground_id: Ulid, span: Span) -> Result<Occupancy, EngineError> {
        validate_window(&span)?;
        let cs = self
            .store
            .get_campground(&campground_id)
            .ok_or(EngineError::NotFound(campground_id))?;
        let guard = cs.read().await;
        let peak = guard.index.peak(&span);
        Ok(Occupancy {
            peak,
            capacity: guard.max_reservations,
            remaining: guard.max_reservations.saturating_sub(peak),
        })
    }

    /// Sub-ranges of `span` where `units` more could be admitted right now.
    pub async fn availability(
        &self,
        campground_id: Ulid,
        span: Span,
        units: u32,
    ) -> Result<Vec<Span>, EngineError> {
        validate_window(&span)?;
        if units == 0 {
            return Err(EngineError::Validation("count must be at least 1"));
        }
        let cs = self
            .store
            .get_campground(&campground_id)
            .ok_or(EngineError::NotFound(campground_id))?;
        let guard = cs.read().await;
        Ok(free_spans(&guard.index, &span, guard.max_reservations, units))
    }
}
