//! Daily, monthly and churn views of a unique element series.

use super::series::UniqueSeries;
use crate::date::DateKey;

use std::collections::HashSet;

/// Derived visitor statistics, recomputed on every merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rollup {
    /// Distinct elements per day.
    pub daily: Vec<(DateKey, u64)>,
    /// Distinct elements per closed month, labelled `YYYY-MM`.
    pub monthly: Vec<(String, u64)>,
    /// Percentage of the previous month's elements absent from the closed
    /// month, labelled with the closed month.
    pub churn: Vec<(String, f64)>,
}

/// Month accumulator that rotates whenever the month prefix advances.
#[derive(Debug, Default)]
pub struct MonthTracker {
    current_day: Option<DateKey>,
    current: HashSet<u32>,
    previous: Option<HashSet<u32>>,
    rollup: Rollup,
}

impl MonthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next day in date order.
    pub fn observe(&mut self, date: DateKey, elements: &[u32]) {
        if let Some(prev_day) = self.current_day {
            if prev_day.month_prefix() < date.month_prefix() {
                self.close_month(&prev_day);
            }
        }
        self.current_day = Some(date);
        self.current.extend(elements.iter().copied());
        self.rollup.daily.push((date, elements.len() as u64));
    }

    fn close_month(&mut self, last_day: &DateKey) {
        let label = last_day.month_label();
        if let Some(previous) = &self.previous {
            if !previous.is_empty() {
                let churned = previous.difference(&self.current).count();
                let churn = churned as f64 / previous.len() as f64 * 100.0;
                self.rollup.churn.push((label.clone(), churn));
            }
        }
        self.rollup.monthly.push((label, self.current.len() as u64));
        self.previous = Some(std::mem::take(&mut self.current));
    }

    /// The rollup so far. The month still open is not included.
    pub fn finish(self) -> Rollup {
        self.rollup
    }
}

/// Compute the rollup of an entire series.
pub fn rollup(series: &UniqueSeries) -> Rollup {
    let mut tracker = MonthTracker::new();
    for section in series.sections() {
        tracker.observe(section.date, section.elements());
    }
    tracker.finish()
}
