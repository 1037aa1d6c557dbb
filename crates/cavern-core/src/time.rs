use chrono::{SecondsFormat, Utc};

/// Current UTC time as an RFC 3339 timestamp with millisecond precision,
/// e.g. `2026-08-23T12:00:00.000Z`.
///
/// Message timestamps are assigned server-side at acceptance time so client
/// clock skew can never reorder a room's history.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn timestamp_is_rfc3339_utc() {
        let ts = timestamp_now();
        assert!(ts.ends_with('Z'), "expected UTC suffix: {ts}");
        DateTime::parse_from_rfc3339(&ts).expect("timestamp must parse as RFC 3339");
    }
}
