//! Declarative metric definitions and their TOML document format.
//!
//! A definition source is a TOML document with one `[[metric]]` table per
//! definition. Raw documents are validated into [`MetricDefinition`]s at
//! load time: metric types are resolved once into a closed variant, unknown
//! type strings are rejected, and a histogram-typed column without a bucket
//! map is a load error rather than a scrape-time surprise.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::warn;

use crate::error::{Error, Result};

/// One `le` bucket of a histogram column: the result-set field carrying the
/// cumulative count, plus the parsed upper bound.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketSpec {
    pub field: String,
    pub upper_bound: f64,
}

/// Bucket layout for one histogram column, sorted by ascending upper bound.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSpec {
    pub buckets: Vec<BucketSpec>,
}

/// How a metric column is emitted. Decided once at load time.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricKind {
    Gauge,
    Counter,
    Histogram(HistogramSpec),
}

/// One declared metric column of a definition.
#[derive(Debug, Clone)]
pub struct MetricColumn {
    /// Lower-cased result column name.
    pub column: String,
    pub help: String,
    pub kind: MetricKind,
}

/// A validated SQL-to-metrics mapping.
#[derive(Debug, Clone)]
pub struct MetricDefinition {
    /// Short grouping string, used as a metric-name prefix.
    pub context: String,
    /// Label names in declaration order; also the row columns they read.
    pub labels: Vec<String>,
    pub metrics: Vec<MetricColumn>,
    /// Column whose value becomes a dynamic metric-name suffix. When set,
    /// labels are not attached.
    pub field_to_append: Option<String>,
    /// SQL text executed for this definition.
    pub request: String,
    /// When false, zero emitted samples is a definition-level error.
    pub ignore_zero_result: bool,
}

/// The full ordered definition list of one generation. Replaced wholesale,
/// never mutated in place.
#[derive(Debug, Clone, Default)]
pub struct MetricDefinitionSet {
    pub definitions: Vec<MetricDefinition>,
}

#[derive(Debug, Deserialize)]
struct MetricFile {
    #[serde(default)]
    metric: Vec<RawMetric>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMetric {
    context: String,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    metricsdesc: BTreeMap<String, String>,
    #[serde(default)]
    metricstype: HashMap<String, String>,
    #[serde(default)]
    metricsbuckets: HashMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    fieldtoappend: String,
    #[serde(default)]
    request: String,
    #[serde(default)]
    ignorezeroresult: bool,
}

/// Reads and validates every definition in one source file.
pub fn load_file(path: &Path) -> Result<Vec<MetricDefinition>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("unable to read {}: {e}", path.display())))?;
    parse_document(&text)
        .map_err(|e| Error::Config(format!("in {}: {e}", path.display())))
}

/// Parses one TOML definition document and validates each `[[metric]]`.
pub fn parse_document(text: &str) -> Result<Vec<MetricDefinition>> {
    let file: MetricFile =
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
    file.metric.into_iter().map(validate).collect()
}

fn validate(raw: RawMetric) -> Result<MetricDefinition> {
    // Column lookups are case-insensitive: row maps are keyed by the
    // lower-cased column name, so every declared name is folded here once.
    let types: HashMap<String, String> = raw
        .metricstype
        .into_iter()
        .map(|(k, v)| (k.to_lowercase(), v.to_lowercase()))
        .collect();
    let buckets: HashMap<String, BTreeMap<String, String>> = raw
        .metricsbuckets
        .into_iter()
        .map(|(k, v)| (k.to_lowercase(), v))
        .collect();

    let mut metrics = Vec::with_capacity(raw.metricsdesc.len());
    for (column, help) in raw.metricsdesc {
        let column = column.to_lowercase();
        let kind = match types.get(&column).map(String::as_str) {
            None | Some("gauge") => MetricKind::Gauge,
            Some("counter") => MetricKind::Counter,
            Some("histogram") => {
                let fields = buckets.get(&column).ok_or_else(|| {
                    Error::Config(format!(
                        "context {:?}: histogram column {column:?} has no metricsbuckets entry",
                        raw.context
                    ))
                })?;
                MetricKind::Histogram(histogram_spec(&raw.context, &column, fields))
            }
            Some(other) => {
                return Err(Error::Config(format!(
                    "context {:?}: unknown metric type {other:?} for column {column:?}",
                    raw.context
                )))
            }
        };
        metrics.push(MetricColumn { column, help, kind });
    }

    Ok(MetricDefinition {
        context: raw.context,
        labels: raw.labels.into_iter().map(|l| l.to_lowercase()).collect(),
        metrics,
        field_to_append: (!raw.fieldtoappend.is_empty())
            .then(|| raw.fieldtoappend.to_lowercase()),
        request: raw.request,
        ignore_zero_result: raw.ignorezeroresult,
    })
}

fn histogram_spec(
    context: &str,
    column: &str,
    fields: &BTreeMap<String, String>,
) -> HistogramSpec {
    let mut buckets = Vec::with_capacity(fields.len());
    for (field, bound) in fields {
        match bound.trim().parse::<f64>() {
            Ok(upper_bound) => buckets.push(BucketSpec {
                field: field.to_lowercase(),
                upper_bound,
            }),
            Err(_) => warn!(
                context,
                column,
                field,
                bound,
                "unable to convert bucket limit to float, skipping bucket"
            ),
        }
    }
    buckets.sort_by(|a, b| a.upper_bound.total_cmp(&b.upper_bound));
    HistogramSpec { buckets }
}
