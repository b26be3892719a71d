//! UUIDv7 utilities for time-ordered identifiers.
//!
//! Every durable row in the graph store is keyed by a UUIDv7, which embeds
//! a millisecond Unix timestamp in its first 48 bits. Audit history paging
//! exploits this: a time range maps to a primary-key range, no separate
//! timestamp index required.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

/// Generate a new UUIDv7 identifier.
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

/// "Floor" UUIDv7 for a timestamp: version/variant bits set, random bits
/// zeroed. Suitable as an inclusive lower bound in range queries.
pub fn v7_floor(ts: &DateTime<Utc>) -> Uuid {
    let millis = ts.timestamp_millis() as u64;
    let bytes = [
        ((millis >> 40) & 0xFF) as u8,
        ((millis >> 32) & 0xFF) as u8,
        ((millis >> 24) & 0xFF) as u8,
        ((millis >> 16) & 0xFF) as u8,
        ((millis >> 8) & 0xFF) as u8,
        (millis & 0xFF) as u8,
        0x70, // version 7, rand_a zeroed
        0x00,
        0x80, // variant 10, rand_b zeroed
        0x00,
        0x00,
        0x00,
        0x00,
        0x00,
        0x00,
        0x00,
    ];
    Uuid::from_bytes(bytes)
}

/// "Ceiling" UUIDv7 for a timestamp: random bits maxed. Suitable as an
/// exclusive upper bound in range queries.
pub fn v7_ceiling(ts: &DateTime<Utc>) -> Uuid {
    let millis = ts.timestamp_millis() as u64;
    let bytes = [
        ((millis >> 40) & 0xFF) as u8,
        ((millis >> 32) & 0xFF) as u8,
        ((millis >> 24) & 0xFF) as u8,
        ((millis >> 16) & 0xFF) as u8,
        ((millis >> 8) & 0xFF) as u8,
        (millis & 0xFF) as u8,
        0x7F,
        0xFF,
        0xBF,
        0xFF,
        0xFF,
        0xFF,
        0xFF,
        0xFF,
        0xFF,
        0xFF,
    ];
    Uuid::from_bytes(bytes)
}

/// Extract the embedded timestamp from a UUIDv7.
///
/// Returns `None` if the UUID is not version 7.
pub fn extract_timestamp(uuid: &Uuid) -> Option<DateTime<Utc>> {
    let bytes = uuid.as_bytes();
    if (bytes[6] >> 4) != 7 {
        return None;
    }

    let millis = ((bytes[0] as u64) << 40)
        | ((bytes[1] as u64) << 32)
        | ((bytes[2] as u64) << 24)
        | ((bytes[3] as u64) << 16)
        | ((bytes[4] as u64) << 8)
        | (bytes[5] as u64);

    Utc.timestamp_millis_opt(millis as i64).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_v7_is_version_7() {
        assert_eq!(new_v7().get_version_num(), 7);
    }

    #[test]
    fn test_v7_ordering() {
        let id1 = new_v7();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = new_v7();
        assert!(id2 > id1);
    }

    #[test]
    fn test_floor_ceiling_bracket_generated_ids() {
        let start = Utc::now() - Duration::seconds(1);
        let id = new_v7();
        let end = Utc::now() + Duration::seconds(1);

        assert!(id >= v7_floor(&start));
        assert!(id < v7_ceiling(&end));
    }

    #[test]
    fn test_timestamp_extraction() {
        let before = Utc::now();
        let id = new_v7();
        let after = Utc::now();

        let extracted = extract_timestamp(&id).expect("should extract timestamp");
        assert!(extracted >= before - Duration::milliseconds(1));
        assert!(extracted <= after + Duration::milliseconds(1));
    }

    #[test]
    fn test_v4_has_no_timestamp() {
        assert!(extract_timestamp(&Uuid::new_v4()).is_none());
    }
}
