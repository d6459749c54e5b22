//! Input validation for admin-supplied identifiers.

use std::sync::LazyLock;

use regex::Regex;

static UID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+$").expect("static pattern"));

static CHANNEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("static pattern"));

/// Parse a uid path/body parameter.
///
/// `None` unless the string is all digits and fits in a `u64`. uids arriving
/// as URL path segments are strings; comparisons elsewhere are strictly
/// numeric, so the parse happens exactly once, here.
pub fn parse_uid(raw: &str) -> Option<u64> {
    if UID_RE.is_match(raw) {
        raw.parse().ok()
    } else {
        None
    }
}

/// Parse a comma-separated uid list. `None` if any entry is malformed.
pub fn parse_uid_list(raw: &str) -> Option<Vec<u64>> {
    raw.split(',').map(parse_uid).collect()
}

/// Whether a channel name is well-formed (`[A-Za-z0-9_]+`).
pub fn channel_name_ok(name: &str) -> bool {
    CHANNEL_RE.is_match(name)
}
