//! Turns the rows of one definition into typed samples.
//!
//! This is the pure core of the scrape pipeline: no I/O, no registry. Input
//! is a validated [`MetricDefinition`] plus the row maps its query produced;
//! output is a flat list of [`ScrapeSample`]s ready to be grouped into
//! Prometheus metric families.

use tracing::error;

use crate::definitions::{HistogramSpec, MetricColumn, MetricDefinition, MetricKind};
use crate::error::{Error, Result};
use crate::rows::RowMap;

/// One emitted sample: a fully resolved metric name, its help text, label
/// pairs in declaration order, and a typed value.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeSample {
    pub name: String,
    pub help: String,
    pub labels: Vec<(String, String)>,
    pub value: SampleValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    Gauge(f64),
    Counter(f64),
    /// Cumulative buckets as `(upper_bound, count)`, ascending, without the
    /// implicit `+Inf` bucket.
    Histogram {
        sum: f64,
        count: u64,
        buckets: Vec<(f64, u64)>,
    },
}

/// Converts the rows of one definition into samples.
///
/// A definition that produced no samples at all is an error unless it opted
/// into `ignore_zero_result`. Unparsable values skip the affected column
/// only; the rest of the row and the remaining rows still emit.
pub fn scrape_definition(
    namespace: &str,
    def: &MetricDefinition,
    rows: &[RowMap],
) -> Result<Vec<ScrapeSample>> {
    let mut samples = Vec::new();
    for row in rows {
        scrape_row(namespace, def, row, &mut samples);
    }
    if samples.is_empty() && !def.ignore_zero_result {
        return Err(Error::ZeroResult);
    }
    Ok(samples)
}

fn scrape_row(
    namespace: &str,
    def: &MetricDefinition,
    row: &RowMap,
    out: &mut Vec<ScrapeSample>,
) {
    for metric in &def.metrics {
        let (name, labels) = match &def.field_to_append {
            // A dynamic suffix replaces labels entirely.
            Some(field) => {
                let suffix = row.get(field).map(String::as_str).unwrap_or_default();
                (
                    format!("{namespace}_{}_{}", def.context, clean_name(suffix)),
                    Vec::new(),
                )
            }
            None => {
                let labels = def
                    .labels
                    .iter()
                    .map(|label| {
                        (
                            label.clone(),
                            row.get(label).cloned().unwrap_or_default(),
                        )
                    })
                    .collect();
                (
                    format!("{namespace}_{}_{}", def.context, metric.column),
                    labels,
                )
            }
        };

        let Some(value) = metric_value(&def.context, metric, row) else {
            continue;
        };
        out.push(ScrapeSample {
            name,
            help: metric.help.clone(),
            labels,
            value,
        });
    }
}

fn metric_value(context: &str, metric: &MetricColumn, row: &RowMap) -> Option<SampleValue> {
    match &metric.kind {
        MetricKind::Histogram(spec) => histogram_value(context, metric, spec, row),
        kind => {
            let raw = row.get(&metric.column).map(String::as_str).unwrap_or_default();
            let Ok(value) = raw.trim().parse::<f64>() else {
                error!(
                    context,
                    column = %metric.column,
                    value = raw,
                    "unable to convert value to float, skipping metric"
                );
                return None;
            };
            Some(match kind {
                MetricKind::Counter => SampleValue::Counter(value),
                _ => SampleValue::Gauge(value),
            })
        }
    }
}

fn histogram_value(
    context: &str,
    metric: &MetricColumn,
    spec: &HistogramSpec,
    row: &RowMap,
) -> Option<SampleValue> {
    let raw_sum = row.get(&metric.column).map(String::as_str).unwrap_or_default();
    let Ok(sum) = raw_sum.trim().parse::<f64>() else {
        error!(
            context,
            column = %metric.column,
            value = raw_sum,
            "unable to convert value to float, skipping metric"
        );
        return None;
    };

    let raw_count = row.get("count").map(String::as_str).unwrap_or_default();
    let Ok(count) = raw_count.trim().parse::<u64>() else {
        error!(
            context,
            column = %metric.column,
            value = raw_count,
            "unable to convert count to int, skipping metric"
        );
        return None;
    };

    let mut buckets = Vec::with_capacity(spec.buckets.len());
    for bucket in &spec.buckets {
        let raw = row.get(&bucket.field).map(String::as_str).unwrap_or_default();
        match raw.trim().parse::<u64>() {
            Ok(v) => buckets.push((bucket.upper_bound, v)),
            Err(_) => error!(
                context,
                field = %bucket.field,
                value = raw,
                "unable to convert bucket value to int, skipping bucket"
            ),
        }
    }

    Some(SampleValue::Histogram { sum, count, buckets })
}

/// Normalizes a row value into a metric-name fragment: spaces become
/// underscores, `(`, `)`, `/` and `*` are dropped, and the result is
/// lower-cased.
pub fn clean_name(s: &str) -> String {
    s.replace(' ', "_")
        .replace(['(', ')', '/', '*'], "")
        .to_lowercase()
}
