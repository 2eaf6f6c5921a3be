//! Decayed popularity score over a scalar series.

use crate::date::DateKey;
use crate::merge::SumSeries;
use crate::{Error, Result};

use std::fmt;
use std::str::FromStr;

/// Per-day decay factor, selected by half-life in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decay {
    /// No decay.
    None,
    HalfLife1,
    HalfLife7,
    HalfLife30,
    HalfLife90,
}

impl Decay {
    /// Factor applied once per elapsed day.
    pub fn factor(&self) -> f64 {
        match self {
            Decay::None => 1.0,
            Decay::HalfLife1 => 0.5,
            Decay::HalfLife7 => 0.90572,
            Decay::HalfLife30 => 0.97716,
            Decay::HalfLife90 => 0.99232,
        }
    }

    pub fn half_life_days(&self) -> u32 {
        match self {
            Decay::None => 0,
            Decay::HalfLife1 => 1,
            Decay::HalfLife7 => 7,
            Decay::HalfLife30 => 30,
            Decay::HalfLife90 => 90,
        }
    }
}

impl FromStr for Decay {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "0" => Ok(Decay::None),
            "1" => Ok(Decay::HalfLife1),
            "7" => Ok(Decay::HalfLife7),
            "30" => Ok(Decay::HalfLife30),
            "90" => Ok(Decay::HalfLife90),
            other => Err(Error::Config(format!(
                "invalid decay '{other}', expected one of [0, 1, 7, 30, 90]"
            ))),
        }
    }
}

impl fmt::Display for Decay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.half_life_days())
    }
}

/// Sum of the series with every day's count decayed to `as_of`.
///
/// Days after `as_of` are counted without decay. The result is truncated.
pub fn popularity(series: &SumSeries, decay: Decay, as_of: DateKey) -> Result<u64> {
    let factor = decay.factor();
    let mut score = 0.0f64;
    let mut last = None;

    for (date, count) in series.entries() {
        let day = date.to_naive_date()?;
        if let Some(prev) = last {
            score *= decay_over(factor, prev, day);
        }
        score += *count as f64;
        last = Some(day);
    }

    if let Some(prev) = last {
        score *= decay_over(factor, prev, as_of.to_naive_date()?);
    }
    Ok(score as u64)
}

fn decay_over(factor: f64, from: chrono::NaiveDate, to: chrono::NaiveDate) -> f64 {
    let days = (to - from).num_days();
    if days <= 0 {
        return 1.0;
    }
    factor.powi(i32::try_from(days).unwrap_or(i32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(entries: &[(&str, u64)]) -> SumSeries {
        SumSeries::from_entries(
            entries
                .iter()
                .map(|(d, c)| (d.parse().unwrap(), *c))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_decay_presets() {
        assert_eq!("30".parse::<Decay>().unwrap().factor(), 0.97716);
        assert_eq!("0".parse::<Decay>().unwrap(), Decay::None);
        assert!(matches!("14".parse::<Decay>(), Err(Error::Config(_))));
    }

    #[test]
    fn test_half_life_one_day() {
        let s = series(&[("2021.06.01", 100), ("2021.06.02", 100)]);
        // 100 halves once, plus 100, then halves twice more.
        let score = popularity(&s, Decay::HalfLife1, "2021.06.04".parse().unwrap()).unwrap();
        assert_eq!(score, 37);
    }

    #[test]
    fn test_no_decay_sums() {
        let s = series(&[("2021.01.31", 5), ("2021.03.01", 7)]);
        let score = popularity(&s, Decay::None, "2022.01.01".parse().unwrap()).unwrap();
        assert_eq!(score, 12);
    }

    #[test]
    fn test_month_boundaries_use_calendar_days() {
        let s = series(&[("2021.02.28", 64), ("2021.03.01", 0)]);
        let score = popularity(&s, Decay::HalfLife1, "2021.03.01".parse().unwrap()).unwrap();
        assert_eq!(score, 32);
    }

    #[test]
    fn test_empty_series_scores_zero() {
        let score = popularity(&SumSeries::new(), Decay::HalfLife7, "2021.01.01".parse().unwrap()).unwrap();
        assert_eq!(score, 0);
    }
}
