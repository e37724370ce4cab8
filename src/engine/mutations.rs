use chrono::Utc;
use tracing::{debug, error};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::record_mutation;

use super::conflict::{check_no_conflict, validate_fields};
use super::{Engine, EngineError};

impl Engine {
    /// Validate and persist a new booking. The store is unchanged on any error.
    pub async fn create(&self, draft: BookingDraft) -> Result<Booking, EngineError> {
        let result = self.create_inner(draft).await;
        record_mutation("create", &result);
        result
    }

    async fn create_inner(&self, draft: BookingDraft) -> Result<Booking, EngineError> {
        let span = validate_fields(
            &draft.resource_id,
            &draft.owner_id,
            draft.start,
            draft.end,
            &draft.title,
            draft.details.as_deref(),
        )?;

        let rs = self.resource_entry(&draft.resource_id);
        let mut guard = rs.write().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many bookings on resource"));
        }
        check_no_conflict(&guard, &span, None)?;

        let booking = Booking {
            id: self.next_id(),
            resource_id: draft.resource_id,
            span,
            title: draft.title,
            details: draft.details,
            owner_id: draft.owner_id,
            created_at: Utc::now().timestamp_millis(),
        };
        let stored = self.repo.insert(&booking).await.inspect_err(|e| {
            error!("persisting booking {} failed: {e}", booking.id);
        })?;

        debug!("created booking {} on {} {}", stored.id, stored.resource_id, stored.span);
        self.apply_and_notify(
            &mut guard,
            Event::BookingCreated {
                booking: stored.clone(),
            },
        );
        Ok(stored)
    }

    /// Replace a booking's span, title and details. Re-validated against every
    /// other booking on its resource; id, resource and owner are preserved.
    pub async fn amend(
        &self,
        id: Ulid,
        amendment: BookingAmendment,
    ) -> Result<Booking, EngineError> {
        let result = self.amend_inner(id, amendment).await;
        record_mutation("amend", &result);
        result
    }

    async fn amend_inner(
        &self,
        id: Ulid,
        amendment: BookingAmendment,
    ) -> Result<Booking, EngineError> {
        let mut guard = self.resolve_entity_write(&id).await?;
        let current = guard.get(id).cloned().ok_or(EngineError::NotFound(id))?;

        let span = validate_fields(
            &current.resource_id,
            &current.owner_id,
            amendment.start,
            amendment.end,
            &amendment.title,
            amendment.details.as_deref(),
        )?;
        check_no_conflict(&guard, &span, Some(id))?;

        let updated = Booking {
            span,
            title: amendment.title,
            details: amendment.details,
            ..current
        };
        let stored = self.repo.update(id, &updated).await.inspect_err(|e| {
            error!("persisting amendment of {id} failed: {e}");
        })?;

        debug!("amended booking {id} to {}", stored.span);
        self.apply_and_notify(
            &mut guard,
            Event::BookingAmended {
                booking: stored.clone(),
            },
        );
        Ok(stored)
    }

    /// Remove a booking. Not idempotent: retracting an absent id is `NotFound`.
    pub async fn retract(&self, id: Ulid) -> Result<Booking, EngineError> {
        let result = self.retract_inner(id).await;
        record_mutation("retract", &result);
        result
    }

    async fn retract_inner(&self, id: Ulid) -> Result<Booking, EngineError> {
        let mut guard = self.resolve_entity_write(&id).await?;
        let current = guard.get(id).cloned().ok_or(EngineError::NotFound(id))?;

        self.repo.delete(id).await.inspect_err(|e| {
            error!("persisting retraction of {id} failed: {e}");
        })?;

        debug!("retracted booking {id} from {}", current.resource_id);
        self.apply_and_notify(
            &mut guard,
            Event::BookingRetracted {
                id,
                resource_id: current.resource_id.clone(),
            },
        );
        Ok(current)
    }
}
