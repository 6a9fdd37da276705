//! Identifiers and timestamps assigned when no authoritative backend does it.

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Generate a version-4 UUID string (`xxxxxxxx-xxxx-4xxx-yxxx-xxxxxxxxxxxx`).
///
/// Collision resistance is that of 122 random bits; not meant to resist forgery.
pub fn generate() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current UTC time as an RFC 3339 string.
pub fn timestamp() -> String {
    format_timestamp(OffsetDateTime::now_utc())
}

/// Format `at` the way stored records carry timestamps.
pub fn format_timestamp(at: OffsetDateTime) -> String {
    at.format(&Rfc3339)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

/// Parse a stored RFC 3339 timestamp. `None` if it is not one.
pub fn parse_timestamp(value: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339).ok()
}
