use tracing::error;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::notify::Subscription;

use super::availability::{merge_overlapping, subtract_intervals};
use super::conflict::{check_no_conflict, validate_fields};
use super::{Engine, EngineError};

impl Engine {
    /// Dry-run validation of a booking: the same checks `create` (or `amend`,
    /// with `exclude`) would run, without mutating anything.
    pub async fn propose(
        &self,
        draft: &BookingDraft,
        exclude: Option<Ulid>,
    ) -> Result<(), EngineError> {
        let span = validate_fields(
            &draft.resource_id,
            &draft.owner_id,
            draft.start,
            draft.end,
            &draft.title,
            draft.details.as_deref(),
        )?;
        let Some(rs) = self.get_resource(&draft.resource_id) else {
            return Ok(());
        };
        let guard = rs.read().await;
        check_no_conflict(&guard, &span, exclude)
    }

    pub async fn get_booking(&self, id: Ulid) -> Option<Booking> {
        let resource_id = self.get_resource_for_entity(&id)?;
        let rs = self.get_resource(&resource_id)?;
        let guard = rs.read().await;
        guard.get(id).cloned()
    }

    /// Bookings on one resource ordered by start, then id. Empty when unknown.
    pub async fn list_by_resource(&self, resource_id: &str) -> Vec<Booking> {
        match self.get_resource(resource_id) {
            Some(rs) => rs.read().await.bookings.clone(),
            None => Vec::new(),
        }
    }

    /// Listing optionally narrowed to bookings overlapping `window`.
    /// Across all resources the order is start, then id.
    pub async fn list(&self, scope: &ResourceScope, window: Option<Span>) -> Vec<Booking> {
        let resource_ids: Vec<ResourceId> = match scope {
            ResourceScope::Resource(id) => vec![id.clone()],
            ResourceScope::All => self.state.iter().map(|e| e.key().clone()).collect(),
        };

        let mut out = Vec::new();
        for rid in resource_ids {
            let Some(rs) = self.get_resource(&rid) else {
                continue;
            };
            let guard = rs.read().await;
            match &window {
                Some(w) => out.extend(guard.overlapping(w).cloned()),
                None => out.extend(guard.bookings.iter().cloned()),
            }
        }
        if matches!(scope, ResourceScope::All) {
            out.sort_by_key(|b| (b.span.start, b.id));
        }
        out
    }

    /// The booking on `resource_id` whose span contains `instant`.
    pub async fn find_occupant(
        &self,
        resource_id: &str,
        instant: Ms,
    ) -> Result<Option<Booking>, EngineError> {
        let Some(rs) = self.get_resource(resource_id) else {
            return Ok(None);
        };
        let guard = rs.read().await;
        let hits: Vec<&Booking> = guard.occupants_at(instant).collect();
        match hits.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some((*only).clone())),
            many => {
                let ids: Vec<Ulid> = many.iter().map(|b| b.id).collect();
                error!("overlapping bookings on {resource_id} at {instant}: {ids:?}");
                Err(EngineError::InvariantViolation {
                    resource_id: resource_id.to_string(),
                    ids,
                })
            }
        }
    }

    /// Parts of `window` on `resource_id` not covered by any booking.
    pub async fn free_windows(
        &self,
        resource_id: &str,
        window: Span,
    ) -> Result<Vec<Span>, EngineError> {
        if window.duration_ms() > MAX_QUERY_WINDOW_MS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        let Some(rs) = self.get_resource(resource_id) else {
            return Ok(vec![window]);
        };
        let guard = rs.read().await;
        let taken: Vec<Span> = guard
            .overlapping(&window)
            .map(|b| Span::new(b.span.start.max(window.start), b.span.end.min(window.end)))
            .collect();
        Ok(subtract_intervals(&[window], &merge_overlapping(&taken)))
    }

    /// Consecutive `slots` slots of `slot_ms` starting at `day_start`, the
    /// calendar grid view. A slot is booked when any booking overlaps it and
    /// past when it starts at or before `now`.
    pub async fn day_grid(
        &self,
        resource_id: &str,
        day_start: Ms,
        slot_ms: Ms,
        slots: usize,
        now: Ms,
    ) -> Result<Vec<Slot>, EngineError> {
        if slot_ms <= 0 {
            return Err(EngineError::InvalidRange {
                start: day_start,
                end: day_start + slot_ms,
            });
        }
        if slots > MAX_DAY_SLOTS {
            return Err(EngineError::LimitExceeded("too many slots"));
        }
        if slot_ms.saturating_mul(slots as Ms) > MAX_QUERY_WINDOW_MS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }

        let bookings = self.list_by_resource(resource_id).await;
        let grid = (0..slots as Ms)
            .map(|i| {
                let span = Span::new(day_start + i * slot_ms, day_start + (i + 1) * slot_ms);
                let status = match bookings.iter().find(|b| b.span.overlaps(&span)) {
                    Some(b) => SlotStatus::Booked {
                        booking_id: b.id,
                        title: b.title.clone(),
                    },
                    None if span.start <= now => SlotStatus::Past,
                    None => SlotStatus::Available,
                };
                Slot { span, status }
            })
            .collect();
        Ok(grid)
    }

    /// Change feed for one resource.
    pub fn subscribe(&self, resource_id: &str) -> Subscription {
        self.notify.subscribe(resource_id)
    }
}
