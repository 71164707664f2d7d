//! End-to-end scrape pipeline tests against an in-memory SQLite database.

use std::sync::Arc;
use std::time::Duration;

use oracledb_exporter::db::{ConnectionManager, PoolLimits};
use oracledb_exporter::definitions::{parse_document, MetricDefinitionSet};
use oracledb_exporter::orchestrator::{self, ScrapeOutcome};
use oracledb_exporter::scraper::SampleValue;
use oracledb_exporter::Error;
use sqlx::AnyPool;

fn memory_pool() -> AnyPool {
    ConnectionManager::open("sqlite::memory:", PoolLimits::default())
        .unwrap()
        .pool()
}

fn definition_set(doc: &str) -> Arc<MetricDefinitionSet> {
    Arc::new(MetricDefinitionSet {
        definitions: parse_document(doc).unwrap(),
    })
}

async fn run(doc: &str, timeout: Duration) -> ScrapeOutcome {
    orchestrator::run_all(definition_set(doc), memory_pool(), timeout).await
}

// A recursive CTE with an unsatisfiable filter never yields a row and never
// terminates, so it only finishes by hitting the deadline.
const NEVER_ENDING: &str = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x+1 FROM c) SELECT x as value FROM c WHERE x = -1";

#[tokio::test]
async fn test_labeled_definition_scrapes_rows() {
    let outcome = run(
        r#"
        [[metric]]
        context = "sessions"
        labels = ["status", "type"]
        metricsdesc = { value = "Count of sessions." }
        request = "SELECT 'ACTIVE' as status, 'USER' as type, 3 as value UNION ALL SELECT 'INACTIVE', 'USER', 1"
        "#,
        Duration::from_secs(5),
    )
    .await;

    assert!(outcome.errors.is_empty(), "errors: {:?}", outcome.errors);
    assert_eq!(outcome.samples.len(), 2);

    let active = outcome
        .samples
        .iter()
        .find(|s| s.labels.contains(&("status".into(), "ACTIVE".into())))
        .unwrap();
    assert_eq!(active.name, "oracledb_sessions_value");
    assert_eq!(active.value, SampleValue::Gauge(3.0));

    let inactive = outcome
        .samples
        .iter()
        .find(|s| s.labels.contains(&("status".into(), "INACTIVE".into())))
        .unwrap();
    assert_eq!(inactive.value, SampleValue::Gauge(1.0));
}

#[tokio::test]
async fn test_field_to_append_builds_metric_names() {
    let outcome = run(
        r#"
        [[metric]]
        context = "activity"
        metricsdesc = { value = "Generic counter." }
        metricstype = { value = "counter" }
        fieldtoappend = "name"
        request = "SELECT 'parse count (total)' as name, 211 as value UNION ALL SELECT 'user commits', 17"
        "#,
        Duration::from_secs(5),
    )
    .await;

    assert!(outcome.errors.is_empty());
    let names: Vec<_> = outcome.samples.iter().map(|s| s.name.as_str()).collect();
    assert!(names.contains(&"oracledb_activity_parse_count_total"));
    assert!(names.contains(&"oracledb_activity_user_commits"));
    assert!(outcome.samples.iter().all(|s| s.labels.is_empty()));
}

#[tokio::test]
async fn test_session_status_as_name_suffix() {
    let outcome = run(
        r#"
        [[metric]]
        context = "sessions"
        metricsdesc = { value = "Count of sessions by status." }
        fieldtoappend = "status"
        request = "SELECT 'ACTIVE' as status, 3 as value UNION ALL SELECT 'INACTIVE', 1"
        "#,
        Duration::from_secs(5),
    )
    .await;

    assert!(outcome.errors.is_empty(), "errors: {:?}", outcome.errors);
    assert_eq!(outcome.samples.len(), 2);

    let active = outcome
        .samples
        .iter()
        .find(|s| s.name == "oracledb_sessions_active")
        .unwrap();
    assert!(active.labels.is_empty());
    assert_eq!(active.value, SampleValue::Gauge(3.0));

    let inactive = outcome
        .samples
        .iter()
        .find(|s| s.name == "oracledb_sessions_inactive")
        .unwrap();
    assert_eq!(inactive.value, SampleValue::Gauge(1.0));
}

#[tokio::test]
async fn test_timeout_fails_only_the_slow_definition() {
    let doc = format!(
        r#"
        [[metric]]
        context = "slow"
        metricsdesc = {{ value = "Never finishes." }}
        request = "{NEVER_ENDING}"

        [[metric]]
        context = "fast"
        metricsdesc = {{ value = "Quick." }}
        request = "SELECT 7 as value"
        "#
    );

    let outcome = run(&doc, Duration::from_millis(200)).await;

    assert_eq!(outcome.samples.len(), 1);
    assert_eq!(outcome.samples[0].name, "oracledb_fast_value");

    assert_eq!(outcome.errors.len(), 1);
    let (context, err) = &outcome.errors[0];
    assert_eq!(context, "slow");
    assert!(matches!(err, Error::QueryTimeout(_)), "got {err:?}");
}

#[tokio::test]
async fn test_zero_rows_is_a_definition_error() {
    let outcome = run(
        r#"
        [[metric]]
        context = "empty"
        metricsdesc = { value = "..." }
        request = "SELECT 1 as value WHERE 0"
        "#,
        Duration::from_secs(5),
    )
    .await;

    assert!(outcome.samples.is_empty());
    assert_eq!(outcome.errors.len(), 1);
    assert!(matches!(outcome.errors[0].1, Error::ZeroResult));
}

#[tokio::test]
async fn test_zero_rows_tolerated_when_opted_in() {
    let outcome = run(
        r#"
        [[metric]]
        context = "empty"
        metricsdesc = { value = "..." }
        request = "SELECT 1 as value WHERE 0"
        ignorezeroresult = true
        "#,
        Duration::from_secs(5),
    )
    .await;

    assert!(outcome.samples.is_empty());
    assert!(outcome.errors.is_empty());
}

#[tokio::test]
async fn test_structurally_incomplete_definitions_are_counted_failures() {
    let outcome = run(
        r#"
        [[metric]]
        context = "no_request"
        metricsdesc = { value = "..." }

        [[metric]]
        context = "no_desc"
        request = "SELECT 1 as value"

        [[metric]]
        context = "ok"
        metricsdesc = { value = "..." }
        request = "SELECT 1 as value"
        "#,
        Duration::from_secs(5),
    )
    .await;

    assert_eq!(outcome.samples.len(), 1);
    assert_eq!(outcome.samples[0].name, "oracledb_ok_value");

    let mut failed: Vec<_> = outcome.errors.iter().map(|(c, _)| c.as_str()).collect();
    failed.sort_unstable();
    assert_eq!(failed, vec!["no_desc", "no_request"]);
    assert!(outcome
        .errors
        .iter()
        .all(|(_, e)| matches!(e, Error::Config(_))));
}

#[tokio::test]
async fn test_invalid_sql_fails_only_its_definition() {
    let outcome = run(
        r#"
        [[metric]]
        context = "broken"
        metricsdesc = { value = "..." }
        request = "SELECT FROM WHERE"

        [[metric]]
        context = "ok"
        metricsdesc = { value = "..." }
        request = "SELECT 2 as value"
        "#,
        Duration::from_secs(5),
    )
    .await;

    assert_eq!(outcome.samples.len(), 1);
    assert_eq!(outcome.samples[0].value, SampleValue::Gauge(2.0));
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].0, "broken");
    assert!(matches!(outcome.errors[0].1, Error::Query(_)));
}

#[tokio::test]
async fn test_null_label_emits_empty_string() {
    let outcome = run(
        r#"
        [[metric]]
        context = "sessions"
        labels = ["status"]
        metricsdesc = { value = "..." }
        request = "SELECT NULL as status, 3 as value"
        "#,
        Duration::from_secs(5),
    )
    .await;

    assert!(outcome.errors.is_empty(), "errors: {:?}", outcome.errors);
    assert_eq!(outcome.samples.len(), 1);
    assert_eq!(
        outcome.samples[0].labels,
        vec![("status".to_string(), String::new())]
    );
    assert_eq!(outcome.samples[0].value, SampleValue::Gauge(3.0));
}

#[tokio::test]
async fn test_null_metric_value_skips_the_column() {
    let outcome = run(
        r#"
        [[metric]]
        context = "sessions"
        labels = ["status"]
        metricsdesc = { value = "..." }
        request = "SELECT 'ACTIVE' as status, 3 as value UNION ALL SELECT 'INACTIVE', NULL"
        "#,
        Duration::from_secs(5),
    )
    .await;

    assert!(outcome.errors.is_empty(), "errors: {:?}", outcome.errors);
    assert_eq!(outcome.samples.len(), 1);
    assert_eq!(
        outcome.samples[0].labels,
        vec![("status".to_string(), "ACTIVE".to_string())]
    );
}

#[tokio::test]
async fn test_all_null_values_hit_the_zero_result_policy() {
    let outcome = run(
        r#"
        [[metric]]
        context = "sessions"
        metricsdesc = { value = "..." }
        request = "SELECT NULL as value"
        "#,
        Duration::from_secs(5),
    )
    .await;

    assert!(outcome.samples.is_empty());
    assert_eq!(outcome.errors.len(), 1);
    assert!(matches!(outcome.errors[0].1, Error::ZeroResult));
}

#[tokio::test]
async fn test_column_names_fold_to_lowercase() {
    let outcome = run(
        r#"
        [[metric]]
        context = "resource"
        labels = ["resource_name"]
        metricsdesc = { current_utilization = "..." }
        request = "SELECT 'processes' as RESOURCE_NAME, 113 as CURRENT_UTILIZATION"
        "#,
        Duration::from_secs(5),
    )
    .await;

    assert!(outcome.errors.is_empty(), "errors: {:?}", outcome.errors);
    assert_eq!(outcome.samples.len(), 1);
    assert_eq!(outcome.samples[0].name, "oracledb_resource_current_utilization");
    assert_eq!(
        outcome.samples[0].labels,
        vec![("resource_name".to_string(), "processes".to_string())]
    );
}
