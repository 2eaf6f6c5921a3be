//! Cross-host series merge
//!
//! Folds one host's series ("source") into the running fleet total
//! ("destination"). Both inputs are sorted by date; the merge walks them in
//! lockstep and combines days present in both:
//! - scalar series add their counters, after dropping source days at or
//!   before the watermark
//! - unique element series take the union of the day's sets, and feed a
//!   month tracker that derives monthly distinct counts and churn
//!
//! The destination is rewritten in full through a temporary file and a
//! rename, together with the chart snippets derived from it.

mod graph;
mod rollup;
mod series;
pub mod telemetry;

pub use graph::{ip_snippet, sum_snippet};
pub use rollup::{rollup, MonthTracker, Rollup};
pub use series::{DaySet, SumSeries, UniqueSeries, ELEMENT_LEN};

use crate::date::DateKey;
use crate::{Error, Result};

use std::cmp::Ordering;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Scalar series merged by [`join_sum_files`].
pub const SUM_SERIES_NAMES: [&str; 2] = ["downloads", "uploads"];

/// File name of the unique-IP series.
pub const IP_SERIES_FILE: &str = "ips.txt";

/// File name of the IP chart snippet.
pub const IP_GRAPH_FILE: &str = "ipData.js";

/// Merge `src` into `dest`, ignoring source days at or before `watermark`.
pub fn merge_sum_series(src: &SumSeries, dest: &SumSeries, watermark: &DateKey) -> Result<SumSeries> {
    let fresh = src
        .entries()
        .iter()
        .skip_while(|(date, _)| date <= watermark);
    let mut src_iter = fresh.peekable();
    let mut dest_iter = dest.entries().iter().peekable();
    let mut merged = SumSeries::new();

    loop {
        let next = match (src_iter.peek(), dest_iter.peek()) {
            (Some(&&(s_date, s_count)), Some(&&(d_date, d_count))) => match s_date.cmp(&d_date) {
                Ordering::Less => {
                    src_iter.next();
                    (s_date, s_count)
                }
                Ordering::Greater => {
                    dest_iter.next();
                    (d_date, d_count)
                }
                Ordering::Equal => {
                    src_iter.next();
                    dest_iter.next();
                    let total = s_count.checked_add(d_count).ok_or_else(|| {
                        Error::InputContract(format!("counter overflow on {s_date}"))
                    })?;
                    (s_date, total)
                }
            },
            (Some(&&entry), None) => {
                src_iter.next();
                entry
            }
            (None, Some(&&entry)) => {
                dest_iter.next();
                entry
            }
            (None, None) => break,
        };
        merged.push(next.0, next.1, "merged series")?;
    }
    Ok(merged)
}

/// Merge `src` into `dest` by day, returning the merged series and the
/// rollup tracked along the way.
pub fn merge_unique_series(src: &UniqueSeries, dest: &UniqueSeries) -> Result<(UniqueSeries, Rollup)> {
    let mut src_iter = src.sections().iter().peekable();
    let mut dest_iter = dest.sections().iter().peekable();
    let mut merged = UniqueSeries::new();
    let mut tracker = MonthTracker::new();

    loop {
        let section = match (src_iter.peek(), dest_iter.peek()) {
            (Some(&s), Some(&d)) => match s.date.cmp(&d.date) {
                Ordering::Less => {
                    src_iter.next();
                    s.clone()
                }
                Ordering::Greater => {
                    dest_iter.next();
                    d.clone()
                }
                Ordering::Equal => {
                    src_iter.next();
                    dest_iter.next();
                    s.union(d)
                }
            },
            (Some(&s), None) => {
                src_iter.next();
                s.clone()
            }
            (None, Some(&d)) => {
                dest_iter.next();
                d.clone()
            }
            (None, None) => break,
        };
        tracker.observe(section.date, section.elements());
        merged.push(section, "merged series")?;
    }
    Ok((merged, tracker.finish()))
}

/// Outcome of merging one scalar series file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SumJoin {
    pub name: String,
    pub days: usize,
    pub below_watermark: usize,
    pub dest: PathBuf,
    pub graph: PathBuf,
}

/// Outcome of merging a unique element series file.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueJoin {
    pub days: usize,
    pub rollup: Rollup,
    pub dest: PathBuf,
    pub graph: PathBuf,
}

/// Merge `downloads.txt` and `uploads.txt` from `src_dir` into `dest_dir`
/// and regenerate `<graph_dir>/<name>.js`.
///
/// Every input is read and validated before the first file is rewritten.
/// Source files must exist; missing destinations start empty.
pub fn join_sum_files(
    src_dir: &Path,
    dest_dir: &Path,
    watermark: &DateKey,
    graph_dir: &Path,
) -> Result<Vec<SumJoin>> {
    let started = Instant::now();
    let result = sum_join(src_dir, dest_dir, watermark, graph_dir);
    telemetry::record_merge("sum", outcome(&result), started.elapsed().as_secs_f64());
    result
}

fn sum_join(
    src_dir: &Path,
    dest_dir: &Path,
    watermark: &DateKey,
    graph_dir: &Path,
) -> Result<Vec<SumJoin>> {
    let mut planned = Vec::with_capacity(SUM_SERIES_NAMES.len());
    for name in SUM_SERIES_NAMES {
        let file = format!("{name}.txt");
        let src = SumSeries::load(&src_dir.join(&file), false)?;
        let dest_path = dest_dir.join(&file);
        let dest = SumSeries::load(&dest_path, true)?;
        let below_watermark = src
            .entries()
            .iter()
            .take_while(|(date, _)| date <= watermark)
            .count();
        let merged = merge_sum_series(&src, &dest, watermark)?;
        planned.push((name, dest_path, merged, below_watermark));
    }

    let mut joins = Vec::with_capacity(planned.len());
    for (name, dest_path, merged, below_watermark) in planned {
        rewrite_atomic(&dest_path, &merged.encode())?;
        let graph = graph_dir.join(format!("{name}.js"));
        rewrite_atomic(&graph, sum_snippet(name, &merged).as_bytes())?;
        telemetry::record_entries("sum", merged.len() as u64, below_watermark as u64);
        info!(
            series = name,
            dest = %dest_path.display(),
            days = merged.len(),
            below_watermark,
            watermark = %watermark,
            "Merged scalar series"
        );
        joins.push(SumJoin {
            name: name.to_string(),
            days: merged.len(),
            below_watermark,
            dest: dest_path,
            graph,
        });
    }
    Ok(joins)
}

/// Merge `ips.txt` from `src_dir` into `dest_dir` and regenerate
/// `<graph_dir>/ipData.js`.
///
/// Returns `None` without touching anything if the source file is absent:
/// not every host has traffic for every app.
pub fn join_unique_files(src_dir: &Path, dest_dir: &Path, graph_dir: &Path) -> Result<Option<UniqueJoin>> {
    let started = Instant::now();
    let result = unique_join(src_dir, dest_dir, graph_dir);
    telemetry::record_merge("unique", outcome(&result), started.elapsed().as_secs_f64());
    result
}

fn unique_join(src_dir: &Path, dest_dir: &Path, graph_dir: &Path) -> Result<Option<UniqueJoin>> {
    let src_path = src_dir.join(IP_SERIES_FILE);
    if !src_path.exists() {
        debug!(src = %src_path.display(), "No unique series at source, nothing to merge");
        return Ok(None);
    }
    let src = UniqueSeries::load(&src_path, false)?;
    let dest_path = dest_dir.join(IP_SERIES_FILE);
    let dest = UniqueSeries::load(&dest_path, true)?;
    let (merged, rollup) = merge_unique_series(&src, &dest)?;

    rewrite_atomic(&dest_path, &merged.encode())?;
    let graph = graph_dir.join(IP_GRAPH_FILE);
    rewrite_atomic(&graph, ip_snippet(&rollup).as_bytes())?;
    telemetry::record_entries("unique", merged.len() as u64, 0);
    info!(
        dest = %dest_path.display(),
        days = merged.len(),
        months = rollup.monthly.len(),
        "Merged unique series"
    );
    Ok(Some(UniqueJoin {
        days: merged.len(),
        rollup,
        dest: dest_path,
        graph,
    }))
}

fn outcome<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(Error::InputContract(_)) => "contract_violation",
        Err(Error::Parse { .. }) => "parse_error",
        Err(Error::Config(_)) => "config_error",
        Err(Error::Io(_) | Error::UnsupportedSeek | Error::Checkpoint { .. }) => "io_error",
    }
}

/// Replace `path` with `data` through a sibling temporary file.
pub(crate) fn rewrite_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let mut file = File::create(&tmp)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> DateKey {
        s.parse().unwrap()
    }

    fn sums(entries: &[(&str, u64)]) -> SumSeries {
        SumSeries::from_entries(entries.iter().map(|(d, c)| (day(d), *c)).collect()).unwrap()
    }

    #[test]
    fn test_outcome_labels_by_error_kind() {
        assert_eq!(outcome(&Ok(())), "ok");
        assert_eq!(outcome::<()>(&Err(Error::Config("graph dir".into()))), "config_error");
        assert_eq!(outcome::<()>(&Err(Error::InputContract("unsorted".into()))), "contract_violation");
        assert_eq!(outcome::<()>(&Err(Error::parse("downloads.txt:2", "bad counter"))), "parse_error");
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(outcome::<()>(&Err(Error::Io(io))), "io_error");
    }

    #[test]
    fn test_watermark_drops_merged_days() {
        let src = sums(&[("2021.01.01", 5), ("2021.01.02", 3)]);
        let merged = merge_sum_series(&src, &SumSeries::new(), &day("2021.01.01")).unwrap();
        assert_eq!(merged, sums(&[("2021.01.02", 3)]));
    }

    #[test]
    fn test_same_day_counters_add() {
        let src = sums(&[("2021.01.02", 4)]);
        let dest = sums(&[("2021.01.02", 3)]);
        let merged = merge_sum_series(&src, &dest, &day("2021.01.01")).unwrap();
        assert_eq!(merged, sums(&[("2021.01.02", 7)]));
    }

    #[test]
    fn test_interleaved_days_stay_sorted() {
        let src = sums(&[("2021.01.02", 1), ("2021.01.04", 1), ("2021.01.05", 2)]);
        let dest = sums(&[("2021.01.01", 9), ("2021.01.03", 9), ("2021.01.05", 9)]);
        let merged = merge_sum_series(&src, &dest, &day("2020.12.31")).unwrap();
        assert_eq!(
            merged,
            sums(&[
                ("2021.01.01", 9),
                ("2021.01.02", 1),
                ("2021.01.03", 9),
                ("2021.01.04", 1),
                ("2021.01.05", 11),
            ])
        );
    }

    #[test]
    fn test_unique_merge_unions_same_day() {
        let mut src = UniqueSeries::new();
        src.push(DaySet::new(day("2021.06.01"), vec![1, 2, 3]), "src").unwrap();
        let mut dest = UniqueSeries::new();
        dest.push(DaySet::new(day("2021.06.01"), vec![3, 4]), "dest").unwrap();

        let (merged, rollup) = merge_unique_series(&src, &dest).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.sections()[0].elements(), &[1, 2, 3, 4]);
        assert_eq!(rollup.daily, vec![(day("2021.06.01"), 4)]);
        assert!(rollup.monthly.is_empty());
    }

    #[test]
    fn test_rewrite_atomic_replaces_content() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested/downloads.txt");
        rewrite_atomic(&path, b"first").unwrap();
        rewrite_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert!(!dir.path().join("nested/downloads.txt.tmp").exists());
    }
}
