pub const MAX_EXCLUDE_IDS: usize = 1_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_NOTES_LEN: usize = 4_096;
pub const MAX_ROOMS_PER_SEMESTER: usize = 10_000;
pub const MAX_SCHEDULES_PER_SEMESTER: usize = 100_000;
pub const MAX_SEMESTERS: usize = 64;
pub const MAX_SEMESTER_NAME_LEN: usize = 64;
/// Largest WAL payload; a bigger length prefix is read as a torn tail.
pub const MAX_WAL_RECORD_LEN: usize = 64 * 1024;
/// Lower bound on the slot step so a misconfigured grid cannot explode the search.
pub const MIN_SLOT_STEP_MINUTES: u16 = 5;
