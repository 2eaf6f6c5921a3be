//! Extraction of the condensed record from one access-log line.

use super::tokenizer::Fields;
use crate::date::DateKey;
use crate::{Error, Result};

const FIELD_IP: usize = 0;
const FIELD_TIME: usize = 3;
const FIELD_REQUEST: usize = 5;
const FIELD_REFERER: usize = 8;
const FIELD_CONTENT_ID: usize = 16;

/// Width of a content identifier, excluding its quotes.
pub const CONTENT_ID_LEN: usize = 46;

const UPLOAD_METHOD: &[u8] = b"POST";
const EMPTY_DOMAIN: &[u8] = b"-";

/// The fields of one line that survive condensing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRecord<'a> {
    pub date: DateKey,
    pub ip: &'a [u8],
    pub method: &'a [u8],
    pub domain: &'a [u8],
}

impl<'a> AccessRecord<'a> {
    /// Classify a split line. `offset` is the logical offset of the line and
    /// only used in error messages.
    pub fn from_fields(fields: &Fields<'a>, offset: u64) -> Result<Self> {
        let date = line_date(fields, offset)?;
        let ip = required(fields, FIELD_IP, "client address", offset)?;
        let request = required(fields, FIELD_REQUEST, "request", offset)?;
        let referer = required(fields, FIELD_REFERER, "referer", offset)?;
        Ok(Self {
            date,
            ip,
            method: method_of(request),
            domain: domain_of(referer).unwrap_or_else(|| {
                tracing::warn!(
                    offset,
                    line = %String::from_utf8_lossy(fields.line()),
                    "Bad referer field, recording empty domain"
                );
                EMPTY_DOMAIN
            }),
        })
    }

    /// Whether the request is an upload.
    pub fn is_upload(&self) -> bool {
        self.method == UPLOAD_METHOD
    }

    /// Append `ip method domain\n` to `out`.
    pub fn write_condensed(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.ip);
        out.push(b' ');
        out.extend_from_slice(self.method);
        out.push(b' ');
        out.extend_from_slice(self.domain);
        out.push(b'\n');
    }

    /// Length of the condensed form, newline included.
    pub fn condensed_len(&self) -> usize {
        self.ip.len() + self.method.len() + self.domain.len() + 3
    }
}

/// Day of the line, from the `[dd/Mon/yyyy:hh:mm:ss` field.
pub fn line_date(fields: &Fields<'_>, offset: u64) -> Result<DateKey> {
    let field = required(fields, FIELD_TIME, "timestamp", offset)?;
    DateKey::from_nginx_timestamp(field).map_err(|e| {
        Error::parse(
            format!("log line at offset {offset}"),
            e.to_string(),
        )
    })
}

/// The content identifier of an upload, if the line carries a well-formed one.
pub fn content_id<'a>(fields: &Fields<'a>) -> Option<&'a [u8]> {
    let field = fields.get(FIELD_CONTENT_ID)?;
    if field.len() != CONTENT_ID_LEN + 2 {
        return None;
    }
    Some(&field[1..=CONTENT_ID_LEN])
}

/// Method from the quoted request line: everything up to the first space.
fn method_of(request: &[u8]) -> &[u8] {
    let request = request.strip_prefix(b"\"").unwrap_or(request);
    let end = request
        .iter()
        .position(|&b| b == b' ')
        .unwrap_or(request.len());
    &request[..end]
}

/// Host part of the quoted referer. Referers without a `//` carry no host
/// and map to `-`, as do empty hosts. `None` when the field is too short to
/// carry quotes.
fn domain_of(referer: &[u8]) -> Option<&[u8]> {
    if referer.len() < 2 {
        return None;
    }
    let url = &referer[1..referer.len() - 1];
    let mut host = match url.windows(2).position(|w| w == b"//") {
        Some(scheme_end) => &url[scheme_end + 2..],
        None => return Some(EMPTY_DOMAIN),
    };
    if let Some(path_start) = host.iter().position(|&b| b == b'/') {
        host = &host[..path_start];
    }
    if host.is_empty() || host == b" " {
        return Some(EMPTY_DOMAIN);
    }
    Some(host)
}

fn required<'a>(
    fields: &Fields<'a>,
    index: usize,
    name: &str,
    offset: u64,
) -> Result<&'a [u8]> {
    fields.get(index).ok_or_else(|| {
        Error::parse(
            format!("log line at offset {offset}"),
            format!(
                "missing {name} field (#{index}, line has {} fields)",
                fields.len()
            ),
        )
    })
}
