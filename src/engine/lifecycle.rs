use std::time::Instant;

use ulid::Ulid;

use crate::model::*;
use crate::observability;

use super::{Engine, EngineError};

impl Engine {
    /// Whether the sweep at `now` should expire this reservation.
    pub fn is_expiry_due(&self, r: &Reservation, now: Ms) -> bool {
        match r.status {
            ReservationStatus::Pending => {
                r.created_at.saturating_add(self.config.pending_ttl_ms) <= now
            }
            ReservationStatus::Confirmed => r.span.end <= now,
            ReservationStatus::Cancelled | ReservationStatus::Expired => false,
        }
    }

    fn is_purge_due(&self, r: &Reservation, now: Ms) -> bool {
        r.status.is_terminal()
            && r.updated_at.saturating_add(self.config.archive_retention_ms) <= now
    }

    /// Reservations the sweep would act on, as `(reservation_id, campground_id)`.
    /// Reads only; the decision is re-checked under the write lock.
    async fn collect_due(
        &self,
        now: Ms,
        due: impl Fn(&Reservation, Ms) -> bool,
    ) -> Vec<(Ulid, Ulid)> {
        let mut found = Vec::new();
        for cs in self.store.campgrounds() {
            let guard = cs.read().await;
            for r in guard.reservations.values() {
                if due(r, now) {
                    found.push((r.id, guard.id));
                }
            }
        }
        found
    }

    pub async fn collect_expired(&self, now: Ms) -> Vec<(Ulid, Ulid)> {
        self.collect_due(now, |r, now| self.is_expiry_due(r, now)).await
    }

    /// Expire stale Pending reservations and elapsed Confirmed ones.
    ///
    /// Best effort: an item that fails (lock timeout, journal error) is logged
    /// and left for the next run. Running it twice at the same `now` is a no-op
    /// the second time.
    pub async fn sweep_expired(&self, now: Ms) -> Vec<Ulid> {
        let started = Instant::now();
        let mut expired = Vec::new();
        for (id, campground_id) in self.collect_expired(now).await {
            match self.expire_one(id, now).await {
                Ok(true) => expired.push(id),
                Ok(false) => {}
                Err(EngineError::NotFound(_)) => {
                    tracing::debug!("sweep skip {id}: gone");
                }
                Err(e) => {
                    tracing::warn!("sweep could not expire {id} on {campground_id}: {e}");
                    metrics::counter!(observability::SWEEP_FAILURES_TOTAL).increment(1);
                }
            }
        }
        metrics::histogram!(observability::SWEEP_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        if !expired.is_empty() {
            metrics::counter!(observability::RESERVATIONS_EXPIRED_TOTAL)
                .increment(expired.len() as u64);
            tracing::info!("expired {} reservations", expired.len());
        }
        expired
    }

    async fn expire_one(&self, id: Ulid, now: Ms) -> Result<bool, EngineError> {
        let mut cs = self.lock_reservation(id).await?;
        let Some(r) = cs.reservations.get(&id) else {
            return Ok(false);
        };
        // Confirmed or cancelled since the candidate scan.
        if !self.is_expiry_due(r, now) {
            return Ok(false);
        }
        let event = Event::ReservationExpired {
            id,
            campground_id: r.campground_id,
            at: now,
        };
        self.persist_and_apply(&mut cs, &event).await?;
        Ok(true)
    }

    /// Drop Cancelled/Expired records whose retention has elapsed.
    pub async fn purge_archived(&self, now: Ms) -> usize {
        let candidates = self
            .collect_due(now, |r, now| self.is_purge_due(r, now))
            .await;
        let mut purged = 0;
        for (id, campground_id) in candidates {
            let result = async {
                let mut cs = self.lock_reservation(id).await?;
                match cs.reservations.get(&id) {
                    Some(r) if self.is_purge_due(r, now) => {}
                    _ => return Ok(false),
                }
                let event = Event::ReservationPurged { id, campground_id };
                self.persist_and_apply(&mut cs, &event).await?;
                Ok::<_, EngineError>(true)
            }
            .await;
            match result {
                Ok(true) => purged += 1,
                Ok(false) | Err(EngineError::NotFound(_)) => {}
                Err(e) => {
                    tracing::warn!("purge could not drop {id}: {e}");
                    metrics::counter!(observability::PURGE_FAILURES_TOTAL).increment(1);
                }
            }
        }
        if purged > 0 {
            tracing::info!("purged {purged} archived reservations");
        }
        purged
    }
}
