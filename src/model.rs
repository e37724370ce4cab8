use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;

/// Unix milliseconds, the only time type.
pub type Ms = i64;

/// Identifier of a bookable asset (aircraft, room, ...). Owned by the caller.
pub type ResourceId = String;

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

    /// Checked constructor for untrusted input. Zero-length and inverted
    /// ranges are rejected.
    pub fn try_new(start: Ms, end: Ms) -> Result<Self, EngineError> {
        if end <= start {
            return Err(EngineError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Touching spans (`a.end == b.start`) do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// A persisted reservation of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub resource_id: ResourceId,
    pub span: Span,
    pub title: String,
    pub details: Option<String>,
    pub owner_id: String,
    /// When the booking was accepted. Preserved across amendments.
    pub created_at: Ms,
}

/// A booking that has not been persisted yet. Spans stay as raw millis so
/// validation can report the first failing constraint in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingDraft {
    pub resource_id: ResourceId,
    pub start: Ms,
    pub end: Ms,
    pub title: String,
    pub details: Option<String>,
    pub owner_id: String,
}

/// The mutable fields of an existing booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingAmendment {
    pub start: Ms,
    pub end: Ms,
    pub title: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResourceState {
    pub id: ResourceId,
    /// Sorted by `(span.start, id)`; pairwise non-overlapping.
    pub bookings: Vec<Booking>,
}

impl ResourceState {
    pub fn new(id: ResourceId) -> Self {
        Self {
            id,
            bookings: Vec::new(),
        }
    }

    fn sort_key(b: &Booking) -> (Ms, Ulid) {
        (b.span.start, b.id)
    }

    /// Insert booking maintaining `(start, id)` order.
    pub fn insert_booking(&mut self, booking: Booking) {
        let key = Self::sort_key(&booking);
        let pos = self
            .bookings
            .binary_search_by(|b| Self::sort_key(b).cmp(&key))
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    /// Remove booking by id.
    pub fn remove_booking(&mut self, id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn get(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    /// Return only bookings whose span overlaps the query window.
    /// Uses binary search to skip bookings starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right_bound = self
            .bookings
            .partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }

    /// Bookings whose span contains `t`. More than one is an invariant breach.
    pub fn occupants_at(&self, t: Ms) -> impl Iterator<Item = &Booking> {
        let right_bound = self.bookings.partition_point(|b| b.span.start <= t);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.contains_instant(t))
    }
}

/// The event types, flat with no nesting. This is the WAL record format and the
/// payload of the per-resource change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BookingCreated { booking: Booking },
    BookingAmended { booking: Booking },
    BookingRetracted { id: Ulid, resource_id: ResourceId },
}

impl Event {
    pub fn resource_id(&self) -> &str {
        match self {
            Event::BookingCreated { booking } | Event::BookingAmended { booking } => {
                &booking.resource_id
            }
            Event::BookingRetracted { resource_id, .. } => resource_id,
        }
    }
}

/// Which bookings a listing covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceScope {
    All,
    Resource(ResourceId),
}

impl ResourceScope {
    pub fn matches(&self, resource_id: &str) -> bool {
        match self {
            ResourceScope::All => true,
            ResourceScope::Resource(id) => id == resource_id,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotStatus {
    Booked { booking_id: Ulid, title: String },
    Past,
    Available,
}

/// One cell of the day grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub span: Span,
    pub status: SlotStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(start: Ms, end: Ms) -> Booking {
        Booking {
            id: Ulid::new(),
            resource_id: "aircraft1".into(),
            span: Span::new(start, end),
            title: "Flight".into(),
            details: None,
            owner_id: "pilot".into(),
            created_at: 0,
        }
    }

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn span_try_new_rejects_empty_and_inverted() {
        assert!(matches!(
            Span::try_new(100, 100),
            Err(EngineError::InvalidRange { start: 100, end: 100 })
        ));
        assert!(matches!(
            Span::try_new(200, 100),
            Err(EngineError::InvalidRange { .. })
        ));
        assert_eq!(Span::try_new(100, 101).unwrap(), Span::new(100, 101));
    }

    #[test]
    fn booking_ordering() {
        let mut rs = ResourceState::new("aircraft1".into());
        rs.insert_booking(booking(300, 400));
        rs.insert_booking(booking(100, 200));
        rs.insert_booking(booking(200, 300));
        let starts: Vec<Ms> = rs.bookings.iter().map(|b| b.span.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn equal_starts_ordered_by_id() {
        let mut rs = ResourceState::new("aircraft1".into());
        let mut first = booking(100, 200);
        let mut second = booking(100, 150);
        first.id = Ulid::from_parts(1, 1);
        second.id = Ulid::from_parts(1, 2);
        rs.insert_booking(second.clone());
        rs.insert_booking(first.clone());
        assert_eq!(rs.bookings[0].id, first.id);
        assert_eq!(rs.bookings[1].id, second.id);
    }

    #[test]
    fn remove_middle_preserves_order() {
        let mut rs = ResourceState::new("aircraft1".into());
        let bookings: Vec<Booking> = (0..3).map(|i| booking(i * 100, i * 100 + 50)).collect();
        for b in &bookings {
            rs.insert_booking(b.clone());
        }
        assert_eq!(rs.remove_booking(bookings[1].id), Some(bookings[1].clone()));
        assert_eq!(rs.bookings.len(), 2);
        assert_eq!(rs.bookings[0].id, bookings[0].id);
        assert_eq!(rs.bookings[1].id, bookings[2].id);
    }

    #[test]
    fn remove_nonexistent_returns_none() {
        let mut rs = ResourceState::new("aircraft1".into());
        rs.insert_booking(booking(100, 200));
        assert!(rs.remove_booking(Ulid::new()).is_none());
        assert_eq!(rs.bookings.len(), 1);
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut rs = ResourceState::new("aircraft1".into());
        rs.insert_booking(booking(100, 200));
        rs.insert_booking(booking(450, 600));
        rs.insert_booking(booking(1000, 1100));

        let hits: Vec<_> = rs.overlapping(&Span::new(500, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(450, 600));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        let mut rs = ResourceState::new("aircraft1".into());
        rs.insert_booking(booking(100, 200));
        assert_eq!(rs.overlapping(&Span::new(200, 300)).count(), 0);
        assert_eq!(rs.overlapping(&Span::new(0, 100)).count(), 0);
    }

    #[test]
    fn overlapping_single_ms_overlap() {
        let mut rs = ResourceState::new("aircraft1".into());
        rs.insert_booking(booking(100, 201));
        assert_eq!(rs.overlapping(&Span::new(200, 300)).count(), 1);
    }

    #[test]
    fn occupants_at_uses_half_open_rule() {
        let mut rs = ResourceState::new("aircraft1".into());
        rs.insert_booking(booking(100, 200));
        rs.insert_booking(booking(200, 300));
        let at_200: Vec<_> = rs.occupants_at(200).collect();
        assert_eq!(at_200.len(), 1);
        assert_eq!(at_200[0].span.start, 200);
        assert_eq!(rs.occupants_at(99).count(), 0);
        assert_eq!(rs.occupants_at(300).count(), 0);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingCreated {
            booking: Booking {
                details: Some("Navigation practice".into()),
                ..booking(100, 200)
            },
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
        assert_eq!(decoded.resource_id(), "aircraft1");
    }

    #[test]
    fn scope_matches() {
        assert!(ResourceScope::All.matches("anything"));
        let scope = ResourceScope::Resource("aircraft1".into());
        assert!(scope.matches("aircraft1"));
        assert!(!scope.matches("aircraft2"));
    }
}
