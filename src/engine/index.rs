use ulid::Ulid;

use crate::model::*;

/// One active reservation as seen by the overlap index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub reservation_id: Ulid,
    pub span: Span,
    pub count: u32,
}

/// Per-campground overlap index over Pending/Confirmed reservations.
///
/// Entries are kept sorted by `span.start`, so overlap queries can cut off
/// everything starting at or after the query end with one binary search.
/// The index is a cache: `rebuild` reproduces it from the reservation records.
#[derive(Debug, Clone, Default)]
pub struct IntervalIndex {
    entries: Vec<IndexEntry>,
}

impl IntervalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebuild<'a>(reservations: impl IntoIterator<Item = &'a Reservation>) -> Self {
        let mut entries: Vec<IndexEntry> = reservations
            .into_iter()
            .filter(|r| r.status.is_active())
            .map(|r| IndexEntry {
                reservation_id: r.id,
                span: r.span,
                count: r.count,
            })
            .collect();
        entries.sort_by_key(|e| (e.span.start, e.reservation_id));
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter()
    }

    pub fn contains(&self, reservation_id: &Ulid) -> bool {
        self.entries.iter().any(|e| e.reservation_id == *reservation_id)
    }

    /// Insert maintaining sort order by span.start. Re-inserting an id replaces it.
    pub fn insert(&mut self, reservation_id: Ulid, span: Span, count: u32) {
        self.remove(&reservation_id);
        let pos = self
            .entries
            .partition_point(|e| e.span.start <= span.start);
        self.entries.insert(
            pos,
            IndexEntry {
                reservation_id,
                span,
                count,
            },
        );
    }

    pub fn remove(&mut self, reservation_id: &Ulid) -> Option<IndexEntry> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.reservation_id == *reservation_id)?;
        Some(self.entries.remove(pos))
    }

    /// Entries whose span overlaps the query window.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &IndexEntry> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self.entries.partition_point(|e| e.span.start < query.end);
        self.entries[..right_bound]
            .iter()
            .filter(move |e| e.span.end > query.start)
    }

    /// Occupancy step function over `query`: consecutive segments covering the
    /// whole window, each with the number of reserved units inside it.
    pub fn profile(&self, query: &Span) -> Vec<(Span, u32)> {
        if query.is_empty() {
            return Vec::new();
        }
        // (time, delta). Ends sort before starts at the same instant: half-open.
        let mut events: Vec<(Ms, i64)> = Vec::new();
        for e in self.overlapping(query) {
            events.push((e.span.start.max(query.start), e.count as i64));
            events.push((e.span.end.min(query.end), -(e.count as i64)));
        }
        events.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut segments = Vec::new();
        let mut level: i64 = 0;
        let mut cursor = query.start;
        let mut i = 0;
        while i < events.len() {
            let t = events[i].0;
            if t > cursor {
                segments.push((Span::new(cursor, t), level as u32));
                cursor = t;
            }
            while i < events.len() && events[i].0 == t {
                level += events[i].1;
                i += 1;
            }
        }
        if cursor < query.end {
            segments.push((Span::new(cursor, query.end), level as u32));
        }
        coalesce(segments)
    }

    /// Maximum simultaneous reserved units at any instant inside `query`.
    pub fn peak(&self, query: &Span) -> u32 {
        if query.is_empty() {
            return 0;
        }
        let mut events: Vec<(Ms, i64)> = Vec::new();
        for e in self.overlapping(query) {
            events.push((e.span.start.max(query.start), e.count as i64));
            events.push((e.span.end.min(query.end), -(e.count as i64)));
        }
        events.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut level: i64 = 0;
        let mut peak: i64 = 0;
        for (_, delta) in events {
            level += delta;
            peak = peak.max(level);
        }
        peak as u32
    }

    /// Peak over every entry in the index.
    pub fn peak_overall(&self) -> u32 {
        match self.bounds() {
            Some(span) => self.peak(&span),
            None => 0,
        }
    }

    fn bounds(&self) -> Option<Span> {
        let start = self.entries.first()?.span.start;
        let end = self.entries.iter().map(|e| e.span.end).max()?;
        Some(Span::new(start, end))
    }
}

/// Merge adjacent segments carrying the same level.
fn coalesce(segments: Vec<(Span, u32)>) -> Vec<(Span, u32)> {
    let mut out: Vec<(Span, u32)> = Vec::with_capacity(segments.len());
    for (span, level) in segments {
        if let Some(last) = out.last_mut()
            && last.1 == level
            && last.0.end == span.start
        {
            last.0.end = span.end;
            continue;
        }
        out.push((span, level));
    }
    out
}

/// Spans inside `query` where at least `units` more can be admitted.
pub fn free_spans(index: &IntervalIndex, query: &Span, capacity: u32, units: u32) -> Vec<Span> {
    let mut free: Vec<Span> = Vec::new();
    for (span, level) in index.profile(query) {
        if level.saturating_add(units) > capacity {
            continue;
        }
        match free.last_mut() {
            Some(last) if last.end == span.start => last.end = span.end,
            _ => free.push(span),
        }
    }
    free
}

#[cfg(test)]
mod tests {
    use super::*;

    const D: Ms = 86_400_000;

    fn reservation(start: Ms, end: Ms, count: u32, status: ReservationStatus) -> Reservation {
        Reservation {
            id: Ulid::new(),
            campground_id: Ulid::nil(),
            user_id: "u".into(),
            span: Span::new(start, end),
            count,
            status,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn insert_keeps_start_order() {
        let mut idx = IntervalIndex::new();
        idx.insert(Ulid::new(), Span::new(300, 400), 1);
        idx.insert(Ulid::new(), Span::new(100, 200), 1);
        idx.insert(Ulid::new(), Span::new(200, 300), 1);
        let starts: Vec<Ms> = idx.iter().map(|e| e.span.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn remove_returns_entry_once() {
        let mut idx = IntervalIndex::new();
        let id = Ulid::new();
        idx.insert(id, Span::new(0, 10), 2);
        assert_eq!(idx.remove(&id).map(|e| e.count), Some(2));
        assert!(idx.remove(&id).is_none());
        assert!(idx.is_empty());
    }

    #[test]
    fn reinsert_replaces() {
        let mut idx = IntervalIndex::new();
        let id = Ulid::new();
        idx.insert(id, Span::new(0, 10), 1);
        idx.insert(id, Span::new(20, 30), 3);
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.peak(&Span::new(0, 10)), 0);
        assert_eq!(idx.peak(&Span::new(20, 30)), 3);
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut idx = IntervalIndex::new();
        idx.insert(Ulid::new(), Span::new(100, 200), 1);
        idx.insert(Ulid::new(), Span::new(450, 600), 1);
        idx.insert(Ulid::new(), Span::new(1000, 1100), 1);
        let hits: Vec<_> = idx.overlapping(&Span::new(500, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(450, 600));
    }

    #[test]
    fn peak_of_empty_index_is_zero() {
        let idx = IntervalIndex::new();
        assert_eq!(idx.peak(&Span::new(0, 1000)), 0);
        assert_eq!(idx.peak_overall(), 0);
    }

    #[test]
    fn back_to_back_ranges_do_not_stack() {
        let mut idx = IntervalIndex::new();
        idx.insert(Ulid::new(), Span::new(0, 4 * D), 1);
        idx.insert(Ulid::new(), Span::new(4 * D, 6 * D), 1);
        assert_eq!(idx.peak(&Span::new(0, 6 * D)), 1);
    }

    #[test]
    fn peak_counts_units_not_entries() {
        let mut idx = IntervalIndex::new();
        idx.insert(Ulid::new(), Span::new(0, 10 * D), 2);
        idx.insert(Ulid::new(), Span::new(3 * D, 5 * D), 3);
        idx.insert(Ulid::new(), Span::new(4 * D, 8 * D), 1);
        assert_eq!(idx.peak(&Span::new(0, 10 * D)), 6);
        assert_eq!(idx.peak(&Span::new(0, 3 * D)), 2);
        assert_eq!(idx.peak(&Span::new(5 * D, 10 * D)), 3);
        assert_eq!(idx.peak_overall(), 6);
    }

    #[test]
    fn peak_only_inside_query() {
        let mut idx = IntervalIndex::new();
        idx.insert(Ulid::new(), Span::new(0, 5 * D), 1);
        idx.insert(Ulid::new(), Span::new(4 * D, 8 * D), 1);
        // Both cover day 4, but the query stops before it.
        assert_eq!(idx.peak(&Span::new(0, 4 * D)), 1);
        assert_eq!(idx.peak(&Span::new(4 * D, 5 * D)), 2);
    }

    #[test]
    fn profile_covers_window() {
        let mut idx = IntervalIndex::new();
        idx.insert(Ulid::new(), Span::new(2 * D, 4 * D), 1);
        idx.insert(Ulid::new(), Span::new(3 * D, 6 * D), 2);
        let profile = idx.profile(&Span::new(0, 8 * D));
        assert_eq!(
            profile,
            vec![
                (Span::new(0, 2 * D), 0),
                (Span::new(2 * D, 3 * D), 1),
                (Span::new(3 * D, 4 * D), 3),
                (Span::new(4 * D, 6 * D), 2),
                (Span::new(6 * D, 8 * D), 0),
            ]
        );
    }

    #[test]
    fn profile_merges_equal_levels_across_handover() {
        let mut idx = IntervalIndex::new();
        idx.insert(Ulid::new(), Span::new(0, 2 * D), 1);
        idx.insert(Ulid::new(), Span::new(2 * D, 4 * D), 1);
        assert_eq!(idx.profile(&Span::new(0, 4 * D)), vec![(Span::new(0, 4 * D), 1)]);
    }

    #[test]
    fn free_spans_respect_units() {
        let mut idx = IntervalIndex::new();
        idx.insert(Ulid::new(), Span::new(2 * D, 4 * D), 1);
        idx.insert(Ulid::new(), Span::new(3 * D, 5 * D), 1);
        let q = Span::new(0, 6 * D);
        assert_eq!(
            free_spans(&idx, &q, 2, 1),
            vec![Span::new(0, 3 * D), Span::new(4 * D, 6 * D)]
        );
        assert_eq!(
            free_spans(&idx, &q, 2, 2),
            vec![Span::new(0, 2 * D), Span::new(5 * D, 6 * D)]
        );
        assert!(free_spans(&idx, &q, 2, 3).is_empty());
    }

    #[test]
    fn rebuild_ignores_terminal_reservations() {
        let records = vec![
            reservation(0, 10, 1, ReservationStatus::Pending),
            reservation(5, 15, 2, ReservationStatus::Confirmed),
            reservation(0, 20, 5, ReservationStatus::Cancelled),
            reservation(0, 20, 5, ReservationStatus::Expired),
        ];
        let idx = IntervalIndex::rebuild(records.iter());
        assert_eq!(idx.len(), 2);
        assert_eq!(idx.peak(&Span::new(0, 20)), 3);
    }
}
