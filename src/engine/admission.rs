use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::{Engine, EngineError};

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.is_empty() {
        return Err(EngineError::Validation("start must be before end"));
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_RESERVATION_SPAN_MS {
        return Err(EngineError::LimitExceeded("reservation span too wide"));
    }
    Ok(())
}

fn validate_request(span: &Span, count: u32, user_id: &str) -> Result<(), EngineError> {
    validate_span(span)?;
    if count == 0 {
        return Err(EngineError::Validation("count must be at least 1"));
    }
    if count > MAX_UNITS_PER_RESERVATION {
        return Err(EngineError::LimitExceeded("too many units in one reservation"));
    }
    if user_id.is_empty() {
        return Err(EngineError::Validation("user id must not be empty"));
    }
    if user_id.len() > MAX_USER_ID_LEN {
        return Err(EngineError::LimitExceeded("user id too long"));
    }
    Ok(())
}

impl Engine {
    /// Admit a reservation if capacity allows it over the whole range.
    ///
    /// The peak query and the insert run under the campground write lock, so
    /// two racing requests can never both see the same spare unit.
    pub async fn request_reservation(
        &self,
        id: Ulid,
        campground_id: Ulid,
        user_id: String,
        span: Span,
        count: u32,
    ) -> Result<Reservation, EngineError> {
        validate_request(&span, count, &user_id)?;
        if self.store.campground_for_reservation(&id).is_some() {
            return Err(EngineError::AlreadyExists(id));
        }

        let mut cs = self.lock_campground(campground_id).await?;
        if cs.reservations.len() >= MAX_RESERVATIONS_PER_CAMPGROUND {
            return Err(EngineError::LimitExceeded("too many reservations on campground"));
        }
        if cs.reservations.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let peak = cs.index.peak(&span);
        if u64::from(peak) + u64::from(count) > u64::from(cs.max_reservations) {
            metrics::counter!(observability::ADMISSIONS_TOTAL, "outcome" => "rejected").increment(1);
            tracing::debug!(
                "rejected {id} on {campground_id}: peak {peak} + {count} > {}",
                cs.max_reservations
            );
            return Err(EngineError::CapacityExceeded {
                campground_id,
                peak,
                requested: count,
                capacity: cs.max_reservations,
            });
        }

        let event = Event::ReservationRequested {
            id,
            campground_id,
            user_id,
            span,
            count,
            created_at: now_ms(),
        };
        // Claimed across all campgrounds before the journal await, so the same
        // id racing on another campground sees it taken.
        if !self.store.claim_reservation(id, campground_id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if let Err(e) = self.persist_and_apply(&mut cs, &event).await {
            self.store.release_reservation_claim(&id, &campground_id);
            return Err(e);
        }
        metrics::counter!(observability::ADMISSIONS_TOTAL, "outcome" => "accepted").increment(1);

        cs.reservations
            .get(&id)
            .cloned()
            .ok_or(EngineError::NotFound(id))
    }

    /// Pending → Confirmed. Confirming twice returns the same record.
    pub async fn confirm_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.transition(id, ReservationStatus::Confirmed).await
    }

    /// Pending/Confirmed → Cancelled, releasing the held units.
    /// Cancelling twice is a no-op.
    pub async fn cancel_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.transition(id, ReservationStatus::Cancelled).await
    }

    async fn transition(&self, id: Ulid, to: ReservationStatus) -> Result<Reservation, EngineError> {
        let mut cs = self.lock_reservation(id).await?;
        let current = cs
            .reservations
            .get(&id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;

        if current.status == to {
            return Ok(current);
        }
        if !current.status.can_transition_to(to) {
            return Err(EngineError::InvalidTransition {
                id,
                from: current.status,
                to,
            });
        }

        let (campground_id, at) = (current.campground_id, now_ms());
        let event = match to {
            ReservationStatus::Confirmed => Event::ReservationConfirmed { id, campground_id, at },
            ReservationStatus::Cancelled => Event::ReservationCancelled { id, campground_id, at },
            // Expiry belongs to the lifecycle sweep; Pending is never a target.
            ReservationStatus::Expired | ReservationStatus::Pending => {
                return Err(EngineError::InvalidTransition {
                    id,
                    from: current.status,
                    to,
                });
            }
        };
        self.persist_and_apply(&mut cs, &event).await?;
        tracing::debug!("reservation {id}: {} -> {to}", current.status);

        cs.reservations
            .get(&id)
            .cloned()
            .ok_or(EngineError::NotFound(id))
    }
}
