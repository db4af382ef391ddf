//! Result identity format and timestamp parsing.
//!
//! A result UUID is its start time in UTC, `YYYY-MM-DDTHH:MM:SS.ffffff`.
//! Because every field is zero-padded and fixed-width, lexicographic order
//! of UUIDs is chronological order.

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Render `at` (converted to UTC) in the fixed UUID format.
pub fn format_uuid(at: OffsetDateTime) -> String {
    let at = at.to_offset(UtcOffset::UTC);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:06}",
        at.year(),
        at.month() as u8,
        at.day(),
        at.hour(),
        at.minute(),
        at.second(),
        at.microsecond()
    )
}

/// Parse a result UUID back into its UTC instant.
pub fn parse_uuid(uuid: &str) -> Option<OffsetDateTime> {
    parse_timestamp(uuid, None)
}

/// Parse a timestamp into a UTC instant.
///
/// Accepted forms, tried in order:
/// - `YYYY-MM-DDTHH:MM:SS.ffffff±HH:MM` (shifted to UTC)
/// - `YYYY-MM-DDTHH:MM:SS.ffffff` (assumed UTC)
/// - `YYYY-MM-DDTHH:MM:SS` (assumed UTC)
/// - RFC 3339, for inputs ending in `Z`
///
/// A caller-supplied `format` (a `time` format description such as
/// `"[year]/[month]/[day] [hour]:[minute]"`) replaces all of the above;
/// it is assumed UTC unless it carries an offset. Returns `None` on any
/// failure.
pub fn parse_timestamp(input: &str, format: Option<&str>) -> Option<OffsetDateTime> {
    let input = input.trim();
    if let Some(format) = format {
        let items = time::format_description::parse(format).ok()?;
        return match OffsetDateTime::parse(input, &items) {
            Ok(at) => Some(at.to_offset(UtcOffset::UTC)),
            Err(_) => PrimitiveDateTime::parse(input, &items)
                .ok()
                .map(PrimitiveDateTime::assume_utc),
        };
    }

    let with_offset = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond][offset_hour sign:mandatory]:[offset_minute]"
    );
    if let Ok(at) = OffsetDateTime::parse(input, with_offset) {
        return Some(at.to_offset(UtcOffset::UTC));
    }

    let naive_fractional =
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]");
    if let Ok(at) = PrimitiveDateTime::parse(input, naive_fractional) {
        return Some(at.assume_utc());
    }

    let naive = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    if let Ok(at) = PrimitiveDateTime::parse(input, naive) {
        return Some(at.assume_utc());
    }

    OffsetDateTime::parse(input, &Rfc3339)
        .ok()
        .map(|at| at.to_offset(UtcOffset::UTC))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn formats_fixed_width_utc() {
        let at = datetime!(2024-03-05 07:08:09.000042 +02:00);
        assert_eq!(format_uuid(at), "2024-03-05T05:08:09.000042");
    }

    #[test]
    fn offset_is_applied() {
        let parsed = parse_timestamp("2024-03-05T07:08:09.500000+02:00", None).unwrap();
        assert_eq!(parsed, datetime!(2024-03-05 05:08:09.5 UTC));
        let parsed = parse_timestamp("2024-03-05T01:00:00.000000-03:30", None).unwrap();
        assert_eq!(parsed, datetime!(2024-03-05 04:30:00 UTC));
    }

    #[test]
    fn naive_forms_assume_utc() {
        assert_eq!(
            parse_timestamp("2024-03-05T07:08:09.123456", None),
            Some(datetime!(2024-03-05 07:08:09.123456 UTC))
        );
        assert_eq!(
            parse_timestamp("2024-03-05T07:08:09", None),
            Some(datetime!(2024-03-05 07:08:09 UTC))
        );
    }

    #[test]
    fn custom_format_overrides_defaults() {
        let parsed = parse_timestamp("2024/03/05 07:08", Some("[year]/[month]/[day] [hour]:[minute]"));
        assert_eq!(parsed, Some(datetime!(2024-03-05 07:08 UTC)));
        // The default forms are not consulted once a format is given.
        assert_eq!(
            parse_timestamp("2024-03-05T07:08:09", Some("[year]/[month]/[day]")),
            None
        );
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_timestamp("not a date", None), None);
        assert_eq!(parse_timestamp("2024-13-40T99:00:00", None), None);
        assert_eq!(parse_timestamp("x", Some("[invalid")), None);
    }

    #[test]
    fn minted_uuids_round_trip() {
        for at in [
            datetime!(2024-01-01 00:00:00 UTC),
            datetime!(2024-12-31 23:59:59.999999 UTC),
            datetime!(1999-06-15 12:30:45.000001 UTC),
        ] {
            assert_eq!(parse_uuid(&format_uuid(at)), Some(at));
        }
    }
}
