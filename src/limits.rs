use crate::model::Ms;

pub const DAY_MS: Ms = 86_400_000;

pub const MAX_CAMPGROUNDS: usize = 100_000;
pub const MAX_TAGS: usize = 10_000;
pub const MAX_TAGS_PER_CAMPGROUND: usize = 64;
/// Records per campground, archived ones included.
pub const MAX_RESERVATIONS_PER_CAMPGROUND: usize = 50_000;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_TAG_NAME_LEN: usize = 64;
pub const MAX_USER_ID_LEN: usize = 128;

pub const MAX_CAPACITY: u32 = 100_000;
pub const MAX_UNITS_PER_RESERVATION: u32 = 1_000;
pub const MAX_RESERVATION_SPAN_MS: Ms = 366 * DAY_MS;
pub const MAX_QUERY_WINDOW_MS: Ms = 5 * 366 * DAY_MS;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2200-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;

pub const DEFAULT_SIMILAR_LIMIT: usize = 10;
pub const MAX_SIMILAR_LIMIT: usize = 100;
