use crate::model::Ms;

const DAY_MS: Ms = 86_400_000;

pub const MAX_TITLE_LEN: usize = 256;
pub const MAX_DETAILS_LEN: usize = 4096;
/// Applies to resource and owner identifiers.
pub const MAX_ID_LEN: usize = 128;
pub const MAX_BOOKINGS_PER_RESOURCE: usize = 100_000;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2200-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;

pub const MAX_SPAN_DURATION_MS: Ms = 366 * DAY_MS;
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * DAY_MS;

/// One-minute slots over a whole day.
pub const MAX_DAY_SLOTS: usize = 1440;
