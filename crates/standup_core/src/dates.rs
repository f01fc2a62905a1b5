use crate::error::AppError;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};

const ISO_DATE: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Accepted input layouts, tried in order. Day-first wins over month-first
/// for ambiguous slash dates.
const INPUT_FORMATS: [&[BorrowedFormatItem<'static>]; 5] = [
    format_description!("[year]-[month padding:none]-[day padding:none]"),
    format_description!("[day padding:none]/[month padding:none]/[year]"),
    format_description!("[month padding:none]/[day padding:none]/[year]"),
    format_description!("[day padding:none]-[month padding:none]-[year]"),
    format_description!("[year]/[month padding:none]/[day padding:none]"),
];

/// Parses a user-supplied date in any accepted layout.
pub fn parse_flexible(raw: &str) -> Result<Date, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("date is required"));
    }

    INPUT_FORMATS
        .iter()
        .find_map(|format| Date::parse(trimmed, format).ok())
        .ok_or_else(|| AppError::validation(format!("malformed date '{trimmed}'")))
}

/// Parses a user-supplied date and returns its ISO-8601 form.
pub fn normalize(raw: &str) -> Result<String, AppError> {
    format_iso(parse_flexible(raw)?)
}

pub fn parse_iso(value: &str) -> Result<Date, AppError> {
    Date::parse(value, ISO_DATE)
        .map_err(|_| AppError::invalid_data(format!("stored date '{value}' is not ISO-8601")))
}

pub fn format_iso(date: Date) -> Result<String, AppError> {
    date.format(ISO_DATE)
        .map_err(|err| AppError::invalid_data(err.to_string()))
}

pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

pub fn local_today() -> Date {
    OffsetDateTime::now_utc().to_offset(local_offset()).date()
}

pub fn now_rfc3339() -> Result<String, AppError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|err| AppError::invalid_data(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{format_iso, normalize, parse_flexible, parse_iso};
    use time::{Date, Month};

    #[test]
    fn parse_flexible_accepts_known_layouts() {
        let expected = Date::from_calendar_date(2025, Month::May, 12).unwrap();

        assert_eq!(parse_flexible("2025-05-12").unwrap(), expected);
        assert_eq!(parse_flexible("12/05/2025").unwrap(), expected);
        assert_eq!(parse_flexible("12-05-2025").unwrap(), expected);
        assert_eq!(parse_flexible("2025/05/12").unwrap(), expected);
        assert_eq!(parse_flexible(" 2025-5-12 ").unwrap(), expected);
    }

    #[test]
    fn parse_flexible_falls_back_to_month_first() {
        let parsed = parse_flexible("05/25/2025").unwrap();
        assert_eq!(
            parsed,
            Date::from_calendar_date(2025, Month::May, 25).unwrap()
        );
    }

    #[test]
    fn parse_flexible_rejects_garbage() {
        let err = parse_flexible("next tuesday").unwrap_err();
        assert_eq!(err.code(), "validation_error");
        assert!(err.message().contains("malformed date"));

        let err = parse_flexible("   ").unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn normalize_produces_iso_dates() {
        assert_eq!(normalize("1/2/2024").unwrap(), "2024-02-01");
    }

    #[test]
    fn iso_round_trip() {
        let date = Date::from_calendar_date(2024, Month::December, 31).unwrap();
        let formatted = format_iso(date).unwrap();
        assert_eq!(formatted, "2024-12-31");
        assert_eq!(parse_iso(&formatted).unwrap(), date);
        assert_eq!(parse_iso("31/12/2024").unwrap_err().code(), "invalid_data");
    }
}
