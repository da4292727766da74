//! redb table definitions and index key encoding for the Slipway store.
//!
//! Every record kind gets two tables: a primary table keyed by record id
//! (value = JSON-serialized envelope) and a group-index table keyed by
//! `{application}{GROUP_SEP}{sequence:020}` (value = record id). Sequences
//! are zero-padded decimal so lexicographic key order equals numeric order,
//! which makes "oldest first" a forward range scan and "latest" a reverse
//! one.

use redb::TableDefinition;

/// Separator between the group key and the sequence in index keys.
///
/// U+001F sorts below every printable character and is rejected by record
/// validation, so `{group}{GROUP_SEP}` prefixes can never collide across
/// groups.
pub(crate) const GROUP_SEP: char = '\u{001f}';

/// Deployments keyed by id.
pub const DEPLOYMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("deployments");
/// Deployment group index keyed by `{application}{GROUP_SEP}{seq}`.
pub const DEPLOYMENTS_BY_APP: TableDefinition<&str, &str> =
    TableDefinition::new("deployments_by_app");

/// Builds keyed by id.
pub const BUILDS: TableDefinition<&str, &[u8]> = TableDefinition::new("builds");
/// Build group index keyed by `{application}{GROUP_SEP}{seq}`.
pub const BUILDS_BY_APP: TableDefinition<&str, &str> = TableDefinition::new("builds_by_app");

/// Releases keyed by id.
pub const RELEASES: TableDefinition<&str, &[u8]> = TableDefinition::new("releases");
/// Release group index keyed by `{application}{GROUP_SEP}{seq}`.
pub const RELEASES_BY_APP: TableDefinition<&str, &str> = TableDefinition::new("releases_by_app");

/// Jobs keyed by id.
pub const JOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("jobs");
/// Job group index keyed by `{application}{GROUP_SEP}{seq}`.
pub const JOBS_BY_APP: TableDefinition<&str, &str> = TableDefinition::new("jobs_by_app");

/// Monotonic per-primary-table sequence counters, keyed by table name.
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

/// Build the index key for a record in a group.
pub(crate) fn index_key(group: &str, seq: u64) -> String {
    format!("{group}{GROUP_SEP}{seq:020}")
}

/// Half-open key range `[start, end)` covering exactly one group's entries.
pub(crate) fn group_range(group: &str) -> (String, String) {
    // U+0020 is the next scalar value after GROUP_SEP, so every key of this
    // group (and no key of any other) falls inside the range.
    (format!("{group}{GROUP_SEP}"), format!("{group}\u{0020}"))
}
