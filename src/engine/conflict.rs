use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("span too wide"));
    }
    Ok(())
}

fn require(value: &str, what: &'static str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::InvalidInput(what));
    }
    Ok(())
}

/// Field checks shared by create and amend, in reporting order:
/// required fields, then range shape, then size limits.
pub(crate) fn validate_fields(
    resource_id: &str,
    owner_id: &str,
    start: Ms,
    end: Ms,
    title: &str,
    details: Option<&str>,
) -> Result<Span, EngineError> {
    require(title, "title required")?;
    require(resource_id, "resource required")?;
    require(owner_id, "owner required")?;

    let span = Span::try_new(start, end)?;

    validate_span(&span)?;
    if title.len() > MAX_TITLE_LEN {
        return Err(EngineError::LimitExceeded("title too long"));
    }
    if details.is_some_and(|d| d.len() > MAX_DETAILS_LEN) {
        return Err(EngineError::LimitExceeded("details too long"));
    }
    if resource_id.len() > MAX_ID_LEN {
        return Err(EngineError::LimitExceeded("resource id too long"));
    }
    if owner_id.len() > MAX_ID_LEN {
        return Err(EngineError::LimitExceeded("owner id too long"));
    }
    Ok(span)
}

/// First booking (in `(start, id)` order) on the resource that overlaps `span`,
/// ignoring `exclude` so an amendment does not collide with its prior state.
pub(crate) fn check_no_conflict(
    rs: &ResourceState,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    match rs
        .overlapping(span)
        .find(|b| Some(b.id) != exclude)
    {
        Some(b) => Err(EngineError::Conflict {
            id: b.id,
            span: b.span,
        }),
        None => Ok(()),
    }
}
