use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::IntervalIndex;

/// Unix milliseconds, the only time type. Calendar dates are midnight UTC.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Build a span without the ordering assertion. Callers validate it afterwards.
    pub fn unchecked(start: Ms, end: Ms) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Saturates rather than overflowing on spans wider than `i64` can hold.
    pub fn duration_ms(&self) -> Ms {
        self.end.saturating_sub(self.start)
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// Parse a calendar date (`2024-06-01`), an RFC 3339 timestamp or raw Unix ms.
pub fn parse_instant(s: &str) -> Option<Ms> {
    let s = s.trim();
    if let Ok(ms) = s.parse::<Ms>() {
        return Some(ms);
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date_ms(date);
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

pub fn date_ms(date: NaiveDate) -> Option<Ms> {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
}

// ── Reservations ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
    Expired,
}

impl ReservationStatus {
    /// Pending and Confirmed reservations hold capacity.
    pub fn is_active(self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Confirmed)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    /// Monotonic lifecycle: Pending → {Confirmed, Cancelled, Expired},
    /// Confirmed → {Cancelled, Expired}. Terminal states never move.
    pub fn can_transition_to(self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Pending, Expired)
                | (Confirmed, Cancelled) | (Confirmed, Expired)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Pending => "Pending",
            ReservationStatus::Confirmed => "Confirmed",
            ReservationStatus::Cancelled => "Cancelled",
            ReservationStatus::Expired => "Expired",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(ReservationStatus::Pending),
            "confirmed" => Ok(ReservationStatus::Confirmed),
            "cancelled" | "canceled" => Ok(ReservationStatus::Cancelled),
            "expired" => Ok(ReservationStatus::Expired),
            other => Err(format!("unknown reservation status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub campground_id: Ulid,
    pub user_id: String,
    pub span: Span,
    pub count: u32,
    pub status: ReservationStatus,
    pub created_at: Ms,
    /// Time of the last status change.
    pub updated_at: Ms,
}

// ── Campgrounds ──────────────────────────────────────────────────

#[derive(Debug)]
pub struct CampgroundState {
    pub id: Ulid,
    pub name: Option<String>,
    pub max_reservations: u32,
    pub rating: Option<f64>,
    pub tags: BTreeSet<Ulid>,
    /// System of record: every reservation of this campground, archived ones included.
    pub reservations: HashMap<Ulid, Reservation>,
    /// Derived from `reservations`; only Pending/Confirmed entries.
    pub index: IntervalIndex,
}

impl CampgroundState {
    pub fn new(id: Ulid, name: Option<String>, max_reservations: u32) -> Self {
        Self {
            id,
            name,
            max_reservations,
            rating: None,
            tags: BTreeSet::new(),
            reservations: HashMap::new(),
            index: IntervalIndex::new(),
        }
    }

    pub fn active_reservations(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations.values().filter(|r| r.status.is_active())
    }

    /// Rebuild the index from the reservation records.
    pub fn rebuild_index(&mut self) {
        self.index = IntervalIndex::rebuild(self.reservations.values());
    }

    pub fn info(&self) -> CampgroundInfo {
        CampgroundInfo {
            id: self.id,
            name: self.name.clone(),
            max_reservations: self.max_reservations,
            rating: self.rating,
            tags: self.tags.iter().copied().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Ulid,
    pub name: String,
}

/// Journal record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    CampgroundCreated {
        id: Ulid,
        name: Option<String>,
        max_reservations: u32,
    },
    CampgroundUpdated {
        id: Ulid,
        name: Option<String>,
        max_reservations: u32,
        rating: Option<f64>,
    },
    CampgroundDeleted {
        id: Ulid,
    },
    TagCreated {
        id: Ulid,
        name: String,
    },
    TagDeleted {
        id: Ulid,
    },
    TagAttached {
        campground_id: Ulid,
        tag_id: Ulid,
    },
    TagDetached {
        campground_id: Ulid,
        tag_id: Ulid,
    },
    ReservationRequested {
        id: Ulid,
        campground_id: Ulid,
        user_id: String,
        span: Span,
        count: u32,
        created_at: Ms,
    },
    ReservationConfirmed {
        id: Ulid,
        campground_id: Ulid,
        at: Ms,
    },
    ReservationCancelled {
        id: Ulid,
        campground_id: Ulid,
        at: Ms,
    },
    ReservationExpired {
        id: Ulid,
        campground_id: Ulid,
        at: Ms,
    },
    ReservationPurged {
        id: Ulid,
        campground_id: Ulid,
    },
}

impl Event {
    /// Campground whose lock must be held while applying this event.
    pub fn campground_id(&self) -> Option<Ulid> {
        match self {
            Event::CampgroundUpdated { id, .. } => Some(*id),
            Event::TagAttached { campground_id, .. }
            | Event::TagDetached { campground_id, .. }
            | Event::ReservationRequested { campground_id, .. }
            | Event::ReservationConfirmed { campground_id, .. }
            | Event::ReservationCancelled { campground_id, .. }
            | Event::ReservationExpired { campground_id, .. }
            | Event::ReservationPurged { campground_id, .. } => Some(*campground_id),
            Event::CampgroundCreated { .. }
            | Event::CampgroundDeleted { .. }
            | Event::TagCreated { .. }
            | Event::TagDeleted { .. } => None,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampgroundInfo {
    pub id: Ulid,
    pub name: Option<String>,
    pub max_reservations: u32,
    pub rating: Option<f64>,
    pub tags: Vec<Ulid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Occupancy {
    pub peak: u32,
    pub capacity: u32,
    pub remaining: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarCampground {
    pub id: Ulid,
    pub shared_tags: usize,
    pub rating: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_half_open() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200));
    }

    #[test]
    fn span_adjacent_does_not_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn unchecked_span_reports_empty() {
        assert!(Span::unchecked(5, 5).is_empty());
        assert!(Span::unchecked(6, 5).is_empty());
        assert!(!Span::unchecked(5, 6).is_empty());
    }

    #[test]
    fn duration_of_full_range_saturates() {
        assert_eq!(Span::unchecked(i64::MIN, i64::MAX).duration_ms(), i64::MAX);
        assert_eq!(Span::unchecked(-10, 10).duration_ms(), 20);
    }

    #[test]
    fn parse_calendar_dates() {
        assert_eq!(parse_instant("2024-06-01"), Some(1_717_200_000_000));
        assert_eq!(parse_instant("2024-06-02"), Some(1_717_200_000_000 + 86_400_000));
        assert_eq!(parse_instant("1717200000000"), Some(1_717_200_000_000));
        assert_eq!(parse_instant("2024-06-01T12:00:00Z"), Some(1_717_243_200_000));
        assert_eq!(parse_instant("June first"), None);
    }

    #[test]
    fn status_transitions() {
        use ReservationStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Expired));
        assert!(!Confirmed.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!Expired.can_transition_to(Cancelled));
        assert!(!Confirmed.can_transition_to(Confirmed));
    }

    #[test]
    fn status_parse() {
        assert_eq!("confirmed".parse::<ReservationStatus>(), Ok(ReservationStatus::Confirmed));
        assert_eq!("Canceled".parse::<ReservationStatus>(), Ok(ReservationStatus::Cancelled));
        assert!("booked".parse::<ReservationStatus>().is_err());
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::ReservationRequested {
            id: Ulid::new(),
            campground_id: Ulid::new(),
            user_id: "u-1".into(),
            span: Span::new(1000, 2000),
            count: 2,
            created_at: 500,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
