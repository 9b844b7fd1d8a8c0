/// Max sessions a single user may have on their schedule.
pub const MAX_SCHEDULED_PER_USER: usize = 1_000;

/// Max length of an externally supplied user id.
pub const MAX_USER_ID_LEN: usize = 256;

pub const MAX_TITLE_LEN: usize = 512;
pub const MAX_SPEAKERS_PER_SESSION: usize = 64;

/// Max sessions held by the in-memory catalog.
pub const MAX_CATALOG_SESSIONS: usize = 100_000;
