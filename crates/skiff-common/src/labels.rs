//! Ownership labels stamped on every container Skiff creates.
//!
//! The labels are the only state that survives a crashed process: orphan
//! discovery filters on exactly [`MANAGED`]`=true` and [`CLEANUP`]`=true`.

use std::collections::BTreeMap;

use crate::id::SessionId;

/// Marks a container as created by Skiff.
pub const MANAGED: &str = "io.skiff.managed";

/// Marks whether a container may be removed automatically.
pub const CLEANUP: &str = "io.skiff.cleanup";

/// Records the session that created the container.
pub const SESSION: &str = "io.skiff.session";

/// Label value for boolean `true`.
pub const TRUE: &str = "true";

/// Label value for boolean `false`.
pub const FALSE: &str = "false";

/// Render a boolean label value.
#[must_use]
pub const fn bool_value(value: bool) -> &'static str {
    if value { TRUE } else { FALSE }
}

/// Merge the ownership labels over caller-supplied labels.
///
/// Ownership labels always win; a caller cannot unmark a container.
#[must_use]
pub fn stamp(
    labels: &BTreeMap<String, String>,
    cleanup: bool,
    session: &SessionId,
) -> BTreeMap<String, String> {
    let mut stamped = labels.clone();
    stamped.insert(MANAGED.to_string(), TRUE.to_string());
    stamped.insert(CLEANUP.to_string(), bool_value(cleanup).to_string());
    stamped.insert(SESSION.to_string(), session.to_string());
    stamped
}

/// The label filter used to discover orphan candidates.
#[must_use]
pub fn orphan_filter() -> Vec<(String, String)> {
    vec![
        (MANAGED.to_string(), TRUE.to_string()),
        (CLEANUP.to_string(), TRUE.to_string()),
    ]
}

/// The label filter for every managed container, regardless of cleanup policy.
#[must_use]
pub fn managed_filter() -> Vec<(String, String)> {
    vec![(MANAGED.to_string(), TRUE.to_string())]
}

/// Whether a label set satisfies every `key=value` pair of `filter`.
#[must_use]
pub fn matches(labels: &BTreeMap<String, String>, filter: &[(String, String)]) -> bool {
    filter
        .iter()
        .all(|(key, value)| labels.get(key).is_some_and(|v| v == value))
}
