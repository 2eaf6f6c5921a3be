//! Calendar day keys
//!
//! Every on-disk series is keyed by a fixed-width `YYYY.MM.DD` string. Keeping
//! the key as raw ASCII bytes makes lexicographic order equal to calendar order
//! and lets the unique-element codec embed it verbatim.

use crate::{Error, Result};

use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;

/// Width of a serialized date key in bytes.
pub const DATE_KEY_LEN: usize = 10;

/// Width of the `YYYY.MM` month prefix.
const MONTH_PREFIX_LEN: usize = 7;

/// nginx month abbreviations and their two-digit numbers.
const MONTHS: [(&[u8; 3], &[u8; 2]); 12] = [
    (b"Jan", b"01"),
    (b"Feb", b"02"),
    (b"Mar", b"03"),
    (b"Apr", b"04"),
    (b"May", b"05"),
    (b"Jun", b"06"),
    (b"Jul", b"07"),
    (b"Aug", b"08"),
    (b"Sep", b"09"),
    (b"Oct", b"10"),
    (b"Nov", b"11"),
    (b"Dec", b"12"),
];

/// A calendar day encoded as `YYYY.MM.DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateKey([u8; DATE_KEY_LEN]);

impl DateKey {
    /// Build a key from raw bytes, validating the `YYYY.MM.DD` shape.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; DATE_KEY_LEN] = bytes.try_into().map_err(|_| {
            Error::parse(
                "date key",
                format!("expected {} bytes, got {}", DATE_KEY_LEN, bytes.len()),
            )
        })?;
        let shape_ok = raw.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'.',
            _ => b.is_ascii_digit(),
        });
        if !shape_ok {
            return Err(Error::parse(
                "date key",
                format!("'{}' is not YYYY.MM.DD", String::from_utf8_lossy(&raw)),
            ));
        }
        Ok(Self(raw))
    }

    /// Convert the nginx `$time_local` token (`[10/Oct/2021:13:55:36`) into a
    /// day key. Only the day, month and year are inspected.
    pub fn from_nginx_timestamp(field: &[u8]) -> Result<Self> {
        if field.len() < 12 || field[0] != b'[' || field[3] != b'/' || field[7] != b'/' {
            return Err(Error::parse(
                "nginx timestamp",
                format!("unexpected token '{}'", String::from_utf8_lossy(field)),
            ));
        }
        let month = month_number(&field[4..7]).ok_or_else(|| {
            Error::parse(
                "nginx timestamp",
                format!("unknown month '{}'", String::from_utf8_lossy(&field[4..7])),
            )
        })?;

        let mut raw = [b'.'; DATE_KEY_LEN];
        raw[0..4].copy_from_slice(&field[8..12]);
        raw[5..7].copy_from_slice(month);
        raw[8..10].copy_from_slice(&field[1..3]);
        Self::from_bytes(&raw)
    }

    /// Raw ASCII bytes of the key.
    pub fn as_bytes(&self) -> &[u8; DATE_KEY_LEN] {
        &self.0
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        // Validated ASCII on construction.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    /// The `YYYY.MM` prefix shared by all days of a month.
    pub fn month_prefix(&self) -> &[u8] {
        &self.0[..MONTH_PREFIX_LEN]
    }

    /// `YYYY-MM-DD`, the label format used by the charting snippets.
    pub fn dashed(&self) -> String {
        self.as_str().replace('.', "-")
    }

    /// `YYYY-MM`, the monthly label format used by the charting snippets.
    pub fn month_label(&self) -> String {
        self.as_str()[..MONTH_PREFIX_LEN].replace('.', "-")
    }

    /// Calendar date for day arithmetic.
    pub fn to_naive_date(&self) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(self.as_str(), "%Y.%m.%d")
            .map_err(|e| Error::parse("date key", format!("'{}': {}", self, e)))
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DateKey {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        Self::from_bytes(value.trim().as_bytes())
    }
}

fn month_number(abbrev: &[u8]) -> Option<&'static [u8; 2]> {
    MONTHS
        .iter()
        .find(|(name, _)| name.as_slice() == abbrev)
        .map(|(_, number)| *number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nginx_timestamp_conversion() {
        let key = DateKey::from_nginx_timestamp(b"[10/Oct/2021:13:55:36").unwrap();
        assert_eq!(key.as_str(), "2021.10.10");

        let key = DateKey::from_nginx_timestamp(b"[01/Jun/2021:00:00:00").unwrap();
        assert_eq!(key.as_str(), "2021.06.01");
    }

    #[test]
    fn test_every_month_maps() {
        let expected = [
            "01", "02", "03", "04", "05", "06", "07", "08", "09", "10", "11", "12",
        ];
        for ((name, _), number) in MONTHS.iter().zip(expected) {
            let token = format!("[15/{}/2022:10:00:00", String::from_utf8_lossy(*name));
            let key = DateKey::from_nginx_timestamp(token.as_bytes()).unwrap();
            assert_eq!(&key.as_str()[5..7], number);
        }
    }

    #[test]
    fn test_rejects_bad_month_and_shape() {
        assert!(DateKey::from_nginx_timestamp(b"[10/Foo/2021:13:55:36").is_err());
        assert!(DateKey::from_nginx_timestamp(b"10/Oct/2021").is_err());
        assert!("2021-01-01".parse::<DateKey>().is_err());
        assert!("2021.1.01".parse::<DateKey>().is_err());
    }

    #[test]
    fn test_labels() {
        let key: DateKey = "2021.06.30".parse().unwrap();
        assert_eq!(key.dashed(), "2021-06-30");
        assert_eq!(key.month_label(), "2021-06");
        assert_eq!(key.month_prefix(), b"2021.06");
    }

    #[test]
    fn test_order_matches_calendar() {
        let a: DateKey = "2021.12.31".parse().unwrap();
        let b: DateKey = "2022.01.01".parse().unwrap();
        assert!(a < b);
        assert_eq!(
            (b.to_naive_date().unwrap() - a.to_naive_date().unwrap()).num_days(),
            1
        );
    }
}
