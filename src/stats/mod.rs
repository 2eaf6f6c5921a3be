//! Per-host daily statistics
//!
//! Turns one day file of condensed `IP method domain` records into the
//! series the merge step consumes: download and upload counters plus the
//! set of distinct client addresses, for the host as a whole (`main`) and
//! for every referring app domain (`apps/<domain>`).

use crate::date::DateKey;
use crate::merge::{DaySet, SumSeries, UniqueSeries, IP_SERIES_FILE};
use crate::{Error, Result};

use std::collections::{BTreeMap, HashSet};
use std::fs::OpenOptions;
use std::io::Write;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const DOWNLOAD_METHOD: &str = "GET";
const UPLOAD_METHOD: &str = "POST";
const DOWNLOADS_FILE: &str = "downloads.txt";
const UPLOADS_FILE: &str = "uploads.txt";

/// Counters for one scope (the host or one app).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counters {
    pub downloads: u64,
    pub uploads: u64,
    /// Distinct IPv4 clients, as `u32::from(Ipv4Addr)`.
    pub ips: HashSet<u32>,
    /// Records whose client address is not IPv4.
    pub other_clients: u64,
}

impl Counters {
    fn observe(&mut self, method: &str, client: Option<u32>) {
        match method {
            DOWNLOAD_METHOD => self.downloads += 1,
            UPLOAD_METHOD => self.uploads += 1,
            _ => {}
        }
        match client {
            Some(ip) => {
                self.ips.insert(ip);
            }
            None => self.other_clients += 1,
        }
    }

    fn ip_section(&self, date: DateKey) -> DaySet {
        DaySet::new(date, self.ips.iter().copied().collect())
    }
}

/// Statistics of one day file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayStats {
    pub date: DateKey,
    pub main: Counters,
    pub apps: BTreeMap<String, Counters>,
}

impl DayStats {
    /// Read a day file. Its name is the date of its records.
    pub fn from_day_file(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let date: DateKey = name.parse().map_err(|_| {
            Error::Config(format!(
                "day file name '{}' is not a YYYY.MM.DD date",
                path.display()
            ))
        })?;
        let data = std::fs::read(path)?;
        Self::from_records(date, &data, &path.display().to_string())
    }

    /// Aggregate condensed records. `context` names the source in errors.
    pub fn from_records(date: DateKey, data: &[u8], context: &str) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::parse(context, format!("not UTF-8: {e}")))?;
        let mut stats = Self {
            date,
            main: Counters::default(),
            apps: BTreeMap::new(),
        };

        for (number, line) in text.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split(' ');
            let (Some(ip), Some(method), Some(domain)) = (parts.next(), parts.next(), parts.next())
            else {
                return Err(Error::parse(
                    format!("{context}:{}", number + 1),
                    format!("expected 'IP method domain', got '{line}'"),
                ));
            };
            let client = ip.parse::<Ipv4Addr>().ok().map(u32::from);

            stats.main.observe(method, client);
            if is_app_domain(domain) {
                stats
                    .apps
                    .entry(domain.to_string())
                    .or_default()
                    .observe(method, client);
            }
        }
        debug!(
            date = %date,
            downloads = stats.main.downloads,
            uploads = stats.main.uploads,
            ips = stats.main.ips.len(),
            apps = stats.apps.len(),
            "Aggregated day file"
        );
        Ok(stats)
    }

    /// Append this day to the series under `root`: `main/` for the host and
    /// `apps/<domain>/` per app.
    ///
    /// Every target is checked before anything is written. A file whose last
    /// entry is already this day with the same value is left alone, so a run
    /// interrupted halfway can simply be repeated. A file that holds a later
    /// date, or this date with a different value, is an input contract error.
    pub fn write_series(&self, root: &Path) -> Result<()> {
        let mut targets = vec![(root.join("main"), &self.main)];
        for (domain, counters) in &self.apps {
            targets.push((root.join("apps").join(domain), counters));
        }

        let mut appends = Vec::new();
        for (dir, counters) in &targets {
            appends.push((dir, self.pending_appends(dir, counters)?));
        }
        let mut written = 0usize;
        let mut already_present = 0usize;
        for (dir, files) in appends {
            std::fs::create_dir_all(dir)?;
            for (path, bytes) in files {
                match bytes {
                    Some(bytes) => {
                        append_bytes(&path, &bytes)?;
                        written += 1;
                    }
                    None => already_present += 1,
                }
            }
        }
        if already_present > 0 {
            warn!(
                date = %self.date,
                root = %root.display(),
                already_present,
                "Day already present in some series files; appended the rest"
            );
        }
        info!(
            date = %self.date,
            root = %root.display(),
            targets = targets.len(),
            files_written = written,
            "Wrote daily series"
        );
        Ok(())
    }

    /// The bytes to append to each series file of `dir`, or `None` for a file
    /// that already ends with exactly this day.
    fn pending_appends(&self, dir: &Path, counters: &Counters) -> Result<Vec<(PathBuf, Option<Vec<u8>>)>> {
        let mut files = Vec::with_capacity(3);
        for (file, value) in [(DOWNLOADS_FILE, counters.downloads), (UPLOADS_FILE, counters.uploads)] {
            let path = dir.join(file);
            let last = SumSeries::load(&path, true)?.entries().last().copied();
            let present = match last {
                Some((date, existing)) if date == self.date && existing == value => true,
                Some((date, existing)) if date >= self.date => {
                    return Err(self.conflict(&path, date, &existing.to_string(), &value.to_string()))
                }
                _ => false,
            };
            let line = format!("{} {}\n", self.date, value);
            files.push((path, (!present).then(|| line.into_bytes())));
        }

        let path = dir.join(IP_SERIES_FILE);
        let section = counters.ip_section(self.date);
        let series = UniqueSeries::load(&path, true)?;
        let present = match series.sections().last() {
            Some(last) if *last == section => true,
            Some(last) if last.date >= self.date => {
                return Err(self.conflict(
                    &path,
                    last.date,
                    &format!("{} addresses", last.len()),
                    &format!("{} addresses", section.len()),
                ))
            }
            _ => false,
        };
        let mut bytes = Vec::new();
        if !present {
            section.encode_into(&mut bytes);
        }
        files.push((path, (!present).then_some(bytes)));
        Ok(files)
    }

    fn conflict(&self, path: &Path, last: DateKey, existing: &str, value: &str) -> Error {
        Error::InputContract(format!(
            "{} already holds {} ({}), cannot append {} ({})",
            path.display(),
            last,
            existing,
            self.date,
            value
        ))
    }
}

/// Domains that get their own series. `-` and empty mean no referer;
/// dot-only names cannot be used as directories.
fn is_app_domain(domain: &str) -> bool {
    match domain {
        "" | "-" => false,
        "." | ".." => {
            warn!(domain, "Ignoring app domain that is not a valid directory name");
            false
        }
        _ => true,
    }
}

fn append_bytes(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(data)?;
    file.sync_data()?;
    Ok(())
}
