//! On-disk series codecs
//!
//! Scalar series are text, one `YYYY.MM.DD count` line per day. Unique
//! element series are binary sections of
//! `date (10 bytes) | count (u64 LE) | count x element (u32 LE)`.
//!
//! Both decoders enforce strictly increasing dates so the merge can rely on
//! it.

use crate::date::{DateKey, DATE_KEY_LEN};
use crate::{Error, Result};

use std::fmt::Write as _;
use std::io;
use std::path::Path;

const COUNT_LEN: usize = 8;
const SECTION_HEADER_LEN: usize = DATE_KEY_LEN + COUNT_LEN;

/// Width of one encoded element.
pub const ELEMENT_LEN: usize = 4;

/// Read a whole series file; a missing file reads as empty when `optional`.
pub(crate) fn read_series_file(path: &Path, optional: bool) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if optional && e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Io(e)),
    }
}

fn ensure_increasing(prev: Option<&DateKey>, next: &DateKey, context: &str) -> Result<()> {
    match prev {
        Some(prev) if prev >= next => Err(Error::InputContract(format!(
            "{context}: date {next} does not follow {prev}"
        ))),
        _ => Ok(()),
    }
}

/// Per-day counter series, sorted by date with no repeated days.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SumSeries {
    entries: Vec<(DateKey, u64)>,
}

impl SumSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from entries, rejecting unsorted or repeated dates.
    pub fn from_entries(entries: Vec<(DateKey, u64)>) -> Result<Self> {
        let mut series = Self::new();
        for (date, count) in entries {
            series.push(date, count, "series entries")?;
        }
        Ok(series)
    }

    /// Decode the text form. `context` names the source in errors.
    pub fn decode(data: &[u8], context: &str) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::parse(context, format!("not UTF-8: {e}")))?;
        let mut series = Self::new();
        for (number, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let line_context = format!("{context}:{}", number + 1);
            let (date, count) = line.split_once(' ').ok_or_else(|| {
                Error::parse(&line_context, format!("expected 'date count', got '{line}'"))
            })?;
            let date = DateKey::from_bytes(date.as_bytes())
                .map_err(|e| Error::parse(&line_context, e.to_string()))?;
            let count = count.trim().parse::<u64>().map_err(|e| {
                Error::parse(&line_context, format!("bad counter '{count}': {e}"))
            })?;
            series.push(date, count, &line_context)?;
        }
        Ok(series)
    }

    /// Load a series file. A missing file is an empty series when `optional`.
    pub fn load(path: &Path, optional: bool) -> Result<Self> {
        match read_series_file(path, optional)? {
            Some(data) => Self::decode(&data, &path.display().to_string()),
            None => Ok(Self::new()),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = String::with_capacity(self.entries.len() * 16);
        for (date, count) in &self.entries {
            let _ = writeln!(out, "{date} {count}");
        }
        out.into_bytes()
    }

    /// Append one day after every existing day.
    pub fn push(&mut self, date: DateKey, count: u64, context: &str) -> Result<()> {
        ensure_increasing(self.entries.last().map(|(d, _)| d), &date, context)?;
        self.entries.push((date, count));
        Ok(())
    }

    pub fn entries(&self) -> &[(DateKey, u64)] {
        &self.entries
    }

    pub fn last_date(&self) -> Option<DateKey> {
        self.entries.last().map(|(date, _)| *date)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Distinct elements seen on one day, kept sorted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySet {
    pub date: DateKey,
    elements: Vec<u32>,
}

impl DaySet {
    /// Build a section from any element list; duplicates collapse.
    pub fn new(date: DateKey, mut elements: Vec<u32>) -> Self {
        elements.sort_unstable();
        elements.dedup();
        Self { date, elements }
    }

    pub fn elements(&self) -> &[u32] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Union of two sections of the same day.
    pub fn union(&self, other: &DaySet) -> DaySet {
        let mut merged = Vec::with_capacity(self.len() + other.len());
        let (mut a, mut b) = (self.elements.iter().peekable(), other.elements.iter().peekable());
        loop {
            match (a.peek(), b.peek()) {
                (Some(&&x), Some(&&y)) if x < y => {
                    merged.push(x);
                    a.next();
                }
                (Some(&&x), Some(&&y)) if y < x => {
                    merged.push(y);
                    b.next();
                }
                (Some(&&x), Some(_)) => {
                    merged.push(x);
                    a.next();
                    b.next();
                }
                (Some(&&x), None) => {
                    merged.push(x);
                    a.next();
                }
                (None, Some(&&y)) => {
                    merged.push(y);
                    b.next();
                }
                (None, None) => break,
            }
        }
        DaySet {
            date: self.date,
            elements: merged,
        }
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.date.as_bytes());
        out.extend_from_slice(&(self.elements.len() as u64).to_le_bytes());
        for element in &self.elements {
            out.extend_from_slice(&element.to_le_bytes());
        }
    }
}

/// Per-day distinct element sets, sorted by date with no repeated days.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniqueSeries {
    sections: Vec<DaySet>,
}

impl UniqueSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the binary form. A section must be complete and must not
    /// repeat an element.
    pub fn decode(data: &[u8], context: &str) -> Result<Self> {
        let mut series = Self::new();
        let mut rest = data;
        while !rest.is_empty() {
            if rest.len() < SECTION_HEADER_LEN {
                return Err(Error::parse(
                    context,
                    format!("truncated section header ({} bytes left)", rest.len()),
                ));
            }
            let date = DateKey::from_bytes(&rest[..DATE_KEY_LEN])
                .map_err(|e| Error::parse(context, e.to_string()))?;
            let mut raw_count = [0u8; COUNT_LEN];
            raw_count.copy_from_slice(&rest[DATE_KEY_LEN..SECTION_HEADER_LEN]);
            let count = u64::from_le_bytes(raw_count);

            let body_len = usize::try_from(count)
                .ok()
                .and_then(|c| c.checked_mul(ELEMENT_LEN))
                .filter(|len| *len <= rest.len() - SECTION_HEADER_LEN)
                .ok_or_else(|| {
                    Error::parse(
                        context,
                        format!("section {date} declares {count} elements past end of data"),
                    )
                })?;
            let body = &rest[SECTION_HEADER_LEN..SECTION_HEADER_LEN + body_len];
            let elements: Vec<u32> = body
                .chunks_exact(ELEMENT_LEN)
                .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect();

            let section = DaySet::new(date, elements);
            if section.len() as u64 != count {
                return Err(Error::InputContract(format!(
                    "{context}: section {date} repeats elements ({count} listed, {} distinct)",
                    section.len()
                )));
            }
            series.push(section, context)?;
            rest = &rest[SECTION_HEADER_LEN + body_len..];
        }
        Ok(series)
    }

    /// Load a series file. A missing file is an empty series when `optional`.
    pub fn load(path: &Path, optional: bool) -> Result<Self> {
        match read_series_file(path, optional)? {
            Some(data) => Self::decode(&data, &path.display().to_string()),
            None => Ok(Self::new()),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for section in &self.sections {
            section.encode_into(&mut out);
        }
        out
    }

    /// Append one section after every existing day.
    pub fn push(&mut self, section: DaySet, context: &str) -> Result<()> {
        ensure_increasing(self.sections.last().map(|s| &s.date), &section.date, context)?;
        self.sections.push(section);
        Ok(())
    }

    pub fn sections(&self) -> &[DaySet] {
        &self.sections
    }

    pub fn last_date(&self) -> Option<DateKey> {
        self.sections.last().map(|s| s.date)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}
