//! Script snippets consumed by the charting page.
//!
//! Each snippet declares parallel `X` (labels) and `Y` (values) arrays and
//! is rewritten in full on every merge.

use super::rollup::Rollup;
use super::series::SumSeries;

use std::fmt::Write as _;

/// Snippet for a scalar series, e.g. `downloadsX` / `downloadsY`.
pub fn sum_snippet(name: &str, series: &SumSeries) -> String {
    let labels: Vec<String> = series.entries().iter().map(|(d, _)| d.dashed()).collect();
    let values: Vec<String> = series.entries().iter().map(|(_, c)| c.to_string()).collect();

    let mut out = String::new();
    push_array(&mut out, &format!("{name}X"), &quoted(&labels, ", "));
    push_array(&mut out, &format!("{name}Y"), &values.join(", "));
    out
}

/// Snippet with the daily, monthly and churn arrays of an IP series.
pub fn ip_snippet(rollup: &Rollup) -> String {
    let daily_x: Vec<String> = rollup.daily.iter().map(|(d, _)| d.dashed()).collect();
    let daily_y: Vec<String> = rollup.daily.iter().map(|(_, n)| n.to_string()).collect();
    let monthly_x: Vec<String> = rollup.monthly.iter().map(|(m, _)| m.clone()).collect();
    let monthly_y: Vec<String> = rollup.monthly.iter().map(|(_, n)| n.to_string()).collect();
    let churn_x: Vec<String> = rollup.churn.iter().map(|(m, _)| m.clone()).collect();
    let churn_y: Vec<String> = rollup.churn.iter().map(|(_, c)| format!("{c:.2}")).collect();

    let mut out = String::new();
    push_array(&mut out, "xDailyIPs", &quoted(&daily_x, ","));
    push_array(&mut out, "yDailyIPs", &daily_y.join(","));
    push_array(&mut out, "xMonthlyIPs", &quoted(&monthly_x, ","));
    push_array(&mut out, "yMonthlyIPs", &monthly_y.join(","));
    push_array(&mut out, "xChurn", &quoted(&churn_x, ","));
    push_array(&mut out, "yChurn", &churn_y.join(","));
    out
}

fn quoted(labels: &[String], separator: &str) -> String {
    labels
        .iter()
        .map(|label| format!("'{label}'"))
        .collect::<Vec<_>>()
        .join(separator)
}

fn push_array(out: &mut String, name: &str, body: &str) {
    let _ = writeln!(out, "var {name} = [{body}];");
}
