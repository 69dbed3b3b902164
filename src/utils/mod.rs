//! Small shared helpers: time and identifier generation.

mod time;

pub use time::{iso_timestamp, now, parse_timestamp, Timestamp};

use uuid::Uuid;

/// Generates a fresh random v4 UUID.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Parses a UUID from its string form, ignoring malformed input.
#[must_use]
pub fn parse_uuid(value: &str) -> Option<Uuid> {
    Uuid::parse_str(value.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_uuids_are_unique() {
        assert_ne!(generate_uuid(), generate_uuid());
    }

    #[test]
    fn parse_uuid_accepts_padded_input() {
        let id = generate_uuid();
        assert_eq!(parse_uuid(&format!("  {id} ")), Some(id));
        assert_eq!(parse_uuid("not-a-uuid"), None);
    }
}
