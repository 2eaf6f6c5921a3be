//! Matching the upload log against blocked content identifiers.

use crate::ingest::CONTENT_ID_LEN;
use crate::{Error, Result};

use std::collections::HashSet;
use std::io::{self, Read};
use std::path::Path;
use tracing::{debug, info};

/// Blocked content identifiers, loaded once per scan.
#[derive(Debug, Clone, Default)]
pub struct EvilElementSet {
    ids: HashSet<[u8; CONTENT_ID_LEN]>,
}

impl EvilElementSet {
    /// Load one identifier per line. Blank lines are ignored.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let set = Self::from_bytes(&data, &path.display().to_string())?;
        info!(path = %path.display(), identifiers = set.len(), "Loaded blocked identifiers");
        Ok(set)
    }

    pub fn from_bytes(data: &[u8], context: &str) -> Result<Self> {
        let mut ids = HashSet::new();
        for (number, line) in data.split(|&b| b == b'\n').enumerate() {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let id: [u8; CONTENT_ID_LEN] = line.try_into().map_err(|_| {
                Error::parse(
                    format!("{context}:{}", number + 1),
                    format!(
                        "identifier must be {CONTENT_ID_LEN} bytes, got {} ('{}')",
                        line.len(),
                        String::from_utf8_lossy(line)
                    ),
                )
            })?;
            ids.insert(id);
        }
        Ok(Self { ids })
    }

    pub fn contains(&self, id: &[u8]) -> bool {
        <&[u8; CONTENT_ID_LEN]>::try_from(id).is_ok_and(|id| self.ids.contains(id))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Stream `identifier IP` records from `reader` and call `on_hit` with the
/// IP of every record whose identifier is blocked. Returns the hit count.
///
/// Records are read through a buffer of `buffer_capacity` bytes; a record
/// split across two reads is reassembled before it is checked. A record that
/// is not `identifier IP` aborts the scan with a parse error naming
/// `context` and the line number.
pub fn scan<R, F>(
    mut reader: R,
    context: &str,
    set: &EvilElementSet,
    buffer_capacity: usize,
    mut on_hit: F,
) -> Result<u64>
where
    R: Read,
    F: FnMut(&[u8]),
{
    if buffer_capacity <= CONTENT_ID_LEN {
        return Err(Error::Config(format!(
            "scan buffer must exceed {CONTENT_ID_LEN} bytes, got {buffer_capacity}"
        )));
    }
    let mut buf = vec![0u8; buffer_capacity];
    let mut filled = 0usize;
    let mut hits = 0u64;
    let mut records = 0u64;
    let mut line_number = 0u64;

    loop {
        let n = match reader.read(&mut buf[filled..]) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        filled += n;

        let consumed = match buf[..filled].iter().rposition(|&b| b == b'\n') {
            Some(last_newline) => last_newline + 1,
            None if n == 0 => filled,
            None if filled == buf.len() => {
                return Err(Error::Config(format!(
                    "upload record longer than the {buffer_capacity} byte scan buffer"
                )))
            }
            None => continue,
        };
        let chunk = if n == 0 { &buf[..filled] } else { &buf[..consumed] };

        for line in chunk.split_inclusive(|&b| b == b'\n') {
            line_number += 1;
            let line = line.strip_suffix(b"\n").unwrap_or(line);
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            records += 1;
            if line.len() <= CONTENT_ID_LEN + 1 || line[CONTENT_ID_LEN] != b' ' {
                return Err(Error::parse(
                    format!("{context}:{line_number}"),
                    format!(
                        "expected '<identifier> <IP>', got '{}'",
                        String::from_utf8_lossy(line)
                    ),
                ));
            }
            if set.contains(&line[..CONTENT_ID_LEN]) {
                hits += 1;
                on_hit(&line[CONTENT_ID_LEN + 1..]);
            }
        }

        if n == 0 {
            break;
        }
        buf.copy_within(consumed..filled, 0);
        filled -= consumed;
    }

    debug!(records, hits, "Upload log scan complete");
    Ok(hits)
}
