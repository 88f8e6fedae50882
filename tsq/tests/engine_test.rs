//! End-to-end tests for the engine against a canned transport

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tsq::engine::Resolvers;
use tsq::{
    Config, Error, Key, KeySet, Nested, SeriesQuery, StaticCatalog, Transport, TsdbEngine,
    TsdbModel,
};

/// Returns a fixed response and records every request body
struct CannedTransport {
    response: Value,
    requests: Mutex<Vec<(String, Value)>>,
}

impl CannedTransport {
    fn new(response: Value) -> Arc<Self> {
        Arc::new(Self {
            response,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().unwrap().clone()
    }

    fn last_body(&self) -> Value {
        self.requests().last().unwrap().1.clone()
    }
}

#[async_trait]
impl Transport for CannedTransport {
    async fn post(&self, url: &str, body: &Value) -> tsq::Result<Value> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), body.clone()));
        Ok(self.response.clone())
    }
}

struct FailingTransport;

#[async_trait]
impl Transport for FailingTransport {
    async fn post(&self, _url: &str, _body: &Value) -> tsq::Result<Value> {
        Err(Error::Backend {
            status: 502,
            body: "bad gateway".to_string(),
        })
    }
}

fn catalog() -> StaticCatalog {
    StaticCatalog::default()
        .with_environment(7, "production")
        .with_issue(Key::Int(1), Key::Int(101), vec!["f101".to_string()])
        .with_issue(Key::Int(1), Key::Int(102), vec!["f102".to_string()])
}

fn test_engine(transport: Arc<dyn Transport>) -> TsdbEngine {
    TsdbEngine::new(
        &Config::default(),
        transport,
        Resolvers::shared(Arc::new(catalog())),
    )
}

fn query(model: TsdbModel, keys: KeySet) -> SeriesQuery {
    SeriesQuery::new(
        model,
        keys,
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
    )
}

#[tokio::test]
async fn test_get_range_end_to_end() {
    let transport = CannedTransport::new(json!({
        "meta": [{"name": "issue"}, {"name": "time"}, {"name": "aggregate"}],
        "data": [{"issue": 101, "time": "2024-01-01T00:00:00Z", "aggregate": 5}]
    }));
    let engine = test_engine(transport.clone());

    let result = engine
        .get_range(&query(TsdbModel::Group, KeySet::flat([101i64, 102])))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result[&Key::Int(101)], vec![(1704067200, 5)]);
    assert!(!result.contains_key(&Key::Int(102)));

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, "http://localhost:5000/query");
    let body = &requests[0].1;
    assert_eq!(body["conditions"], json!([["issue", "IN", [101, 102]]]));
    assert_eq!(body["groupby"], json!(["issue", "time"]));
    assert_eq!(body["aggregation"], json!("count"));
    assert_eq!(body["project"], json!([1]));
    assert_eq!(body["issues"], json!([[101, ["f101"]], [102, ["f102"]]]));
}

#[tokio::test]
async fn test_get_range_sorts_by_timestamp() {
    let transport = CannedTransport::new(json!({
        "meta": [{"name": "project_id"}, {"name": "time"}, {"name": "aggregate"}],
        "data": [
            {"project_id": 1, "time": "2024-01-01T02:00:00Z", "aggregate": 3},
            {"project_id": 1, "time": "2024-01-01T00:00:00Z", "aggregate": null},
            {"project_id": 1, "time": "2024-01-01T01:00:00Z", "aggregate": 1},
        ]
    }));
    let engine = test_engine(transport.clone());

    let result = engine
        .get_range(&query(TsdbModel::Project, KeySet::flat([1i64])).rollup(3600))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        result[&Key::Int(1)],
        vec![(1704067200, 0), (1704070800, 1), (1704074400, 3)]
    );
    assert_eq!(transport.last_body()["granularity"], json!(3600));
    assert!(transport.last_body().get("issues").is_none());
}

#[tokio::test]
async fn test_get_sums() {
    let transport = CannedTransport::new(json!({
        "meta": [{"name": "project_id"}, {"name": "time"}, {"name": "aggregate"}],
        "data": [
            {"project_id": 1, "time": 1704067200, "aggregate": 3},
            {"project_id": 1, "time": 1704070800, "aggregate": 4},
            {"project_id": 2, "time": 1704067200, "aggregate": 1},
        ]
    }));
    let engine = test_engine(transport);

    let sums = engine
        .get_sums(&query(TsdbModel::Project, KeySet::flat([1i64, 2])))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sums[&Key::Int(1)], 7);
    assert_eq!(sums[&Key::Int(2)], 1);
}

#[tokio::test]
async fn test_distinct_counts() {
    let transport = CannedTransport::new(json!({
        "meta": [{"name": "issue"}, {"name": "aggregate"}],
        "data": [
            {"issue": 101, "aggregate": 12},
            {"issue": 102, "aggregate": 3},
        ]
    }));
    let engine = test_engine(transport.clone());

    let totals = engine
        .get_distinct_counts_totals(&query(
            TsdbModel::UsersAffectedByGroup,
            KeySet::flat([101i64, 102]),
        ))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(totals[&Key::Int(101)], 12);
    assert_eq!(totals[&Key::Int(102)], 3);

    let body = transport.last_body();
    assert_eq!(body["aggregation"], json!("uniq"));
    assert_eq!(body["aggregateby"], json!("user_id"));
    assert_eq!(body["groupby"], json!(["issue"]));
}

#[tokio::test]
async fn test_distinct_counts_series() {
    let transport = CannedTransport::new(json!({
        "meta": [{"name": "project_id"}, {"name": "time"}, {"name": "aggregate"}],
        "data": [
            {"project_id": 1, "time": "2024-01-01T01:00:00Z", "aggregate": 2},
            {"project_id": 1, "time": "2024-01-01T00:00:00Z", "aggregate": 4},
        ]
    }));
    let engine = test_engine(transport);

    let series = engine
        .get_distinct_counts_series(&query(
            TsdbModel::UsersAffectedByProject,
            KeySet::flat([1i64]),
        ))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(series[&Key::Int(1)], vec![(1704067200, 4), (1704070800, 2)]);
}

#[tokio::test]
async fn test_distinct_counts_union() {
    let transport = CannedTransport::new(json!({
        "meta": [{"name": "aggregate"}],
        "data": [{"aggregate": 42}]
    }));
    let engine = test_engine(transport.clone());

    let union = engine
        .get_distinct_counts_union(&query(
            TsdbModel::UsersAffectedByProject,
            KeySet::flat([1i64, 2]),
        ))
        .await
        .unwrap();
    assert_eq!(union, Some(42));
    assert_eq!(transport.last_body()["groupby"], json!([]));

    let empty = CannedTransport::new(json!({"meta": [{"name": "aggregate"}], "data": []}));
    let union = test_engine(empty)
        .get_distinct_counts_union(&query(
            TsdbModel::UsersAffectedByProject,
            KeySet::flat([1i64]),
        ))
        .await
        .unwrap();
    assert_eq!(union, Some(0));
}

#[tokio::test]
async fn test_most_frequent_scores_ascending() {
    let transport = CannedTransport::new(json!({
        "meta": [{"name": "issue"}, {"name": "aggregate"}],
        "data": [{"issue": 101, "aggregate": ["b", "a"]}]
    }));
    let engine = test_engine(transport.clone());

    let result = engine
        .get_most_frequent(
            &query(TsdbModel::FrequentReleasesByGroup, KeySet::flat([101i64])),
            2,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        result[&Key::Int(101)],
        vec![(Key::from("a"), 1.0), (Key::from("b"), 2.0)]
    );

    let body = transport.last_body();
    assert_eq!(body["aggregation"], json!("topK(2)"));
    assert_eq!(body["aggregateby"], json!("release"));
}

#[tokio::test]
async fn test_most_frequent_series() {
    let transport = CannedTransport::new(json!({
        "meta": [{"name": "issue"}, {"name": "time"}, {"name": "aggregate"}],
        "data": [
            {"issue": 101, "time": "2024-01-01T01:00:00Z", "aggregate": ["production"]},
            {"issue": 101, "time": "2024-01-01T00:00:00Z", "aggregate": ["staging", "production"]},
        ]
    }));
    let engine = test_engine(transport);

    let result = engine
        .get_most_frequent_series(
            &query(TsdbModel::FrequentEnvironmentsByGroup, KeySet::flat([101i64])),
            10,
        )
        .await
        .unwrap()
        .unwrap();

    let mut first = BTreeMap::new();
    first.insert(Key::from("staging"), 2.0);
    first.insert(Key::from("production"), 1.0);
    let mut second = BTreeMap::new();
    second.insert(Key::from("production"), 1.0);

    assert_eq!(
        result[&Key::Int(101)],
        vec![(1704067200, first), (1704070800, second)]
    );
}

#[tokio::test]
async fn test_frequency_series_keeps_nesting_order() {
    let transport = CannedTransport::new(json!({
        "meta": [{"name": "issue"}, {"name": "time"}, {"name": "release"}, {"name": "aggregate"}],
        "data": [
            {"issue": 101, "time": "2024-01-01T01:00:00Z", "release": "1.0", "aggregate": 2},
            {"issue": 101, "time": "2024-01-01T00:00:00Z", "release": "1.0", "aggregate": 1},
            {"issue": 101, "time": "2024-01-01T00:00:00Z", "release": "2.0", "aggregate": 6},
        ]
    }));
    let engine = test_engine(transport.clone());

    let keys = KeySet::from_json(&json!({"101": ["1.0", "2.0"]})).unwrap();
    let result = engine
        .get_frequency_series(&query(TsdbModel::FrequentReleasesByGroup, keys))
        .await
        .unwrap()
        .unwrap();

    let points = &result[&Key::Int(101)];
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].0, 1704070800);
    assert_eq!(points[1].0, 1704067200);
    assert_eq!(
        points[1].1.get(&Key::from("2.0")).unwrap().count().unwrap(),
        6
    );

    let body = transport.last_body();
    assert_eq!(body["groupby"], json!(["issue", "time", "release"]));
    assert!(body.get("aggregateby").is_none());
    assert_eq!(
        body["conditions"],
        json!([["issue", "IN", [101]], ["release", "IN", ["1.0", "2.0"]]])
    );
}

#[tokio::test]
async fn test_frequency_totals() {
    let transport = CannedTransport::new(json!({
        "meta": [{"name": "issue"}, {"name": "environment"}, {"name": "aggregate"}],
        "data": [
            {"issue": 101, "environment": "production", "aggregate": 9},
            {"issue": 101, "environment": "staging", "aggregate": 1},
        ]
    }));
    let engine = test_engine(transport);

    let result = engine
        .get_frequency_totals(&query(
            TsdbModel::FrequentEnvironmentsByGroup,
            KeySet::flat([101i64]),
        ))
        .await
        .unwrap()
        .unwrap();

    let expected = Nested::Groups(vec![
        (Key::from("production"), Nested::Leaf(json!(9))),
        (Key::from("staging"), Nested::Leaf(json!(1))),
    ]);
    assert_eq!(result[&Key::Int(101)], expected);
}

#[tokio::test]
async fn test_environment_filter_on_every_model() {
    let transport = CannedTransport::new(json!({"meta": [], "data": []}));
    let engine = test_engine(transport.clone());

    for model in [
        TsdbModel::Project,
        TsdbModel::Group,
        TsdbModel::Release,
        TsdbModel::UsersAffectedByGroup,
        TsdbModel::FrequentIssuesByProject,
    ] {
        engine
            .get_frequency_totals(&query(model, KeySet::flat([1i64])).environment(7))
            .await
            .unwrap();
        let conditions = transport.last_body()["conditions"].clone();
        assert!(
            conditions
                .as_array()
                .unwrap()
                .contains(&json!(["environment", "=", "production"])),
            "{model}: {conditions}"
        );
    }
}

#[tokio::test]
async fn test_unsupported_model_skips_backend() {
    let transport = CannedTransport::new(json!({}));
    let engine = test_engine(transport.clone());

    let q = query(TsdbModel::ProjectTotalReceived, KeySet::flat([1i64]));
    assert!(engine.get_range(&q).await.unwrap().is_none());
    assert!(engine.get_most_frequent(&q, 5).await.unwrap().is_none());
    assert!(engine.get_distinct_counts_union(&q).await.unwrap().is_none());
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_unexpected_column_aborts() {
    let transport = CannedTransport::new(json!({
        "meta": [{"name": "issue"}, {"name": "user_id"}, {"name": "aggregate"}],
        "data": [{"issue": 101, "user_id": 1, "aggregate": 1}]
    }));
    let engine = test_engine(transport);

    let err = engine
        .get_distinct_counts_totals(&query(TsdbModel::Group, KeySet::flat([101i64])))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnexpectedColumn { .. }));
}

#[tokio::test]
async fn test_transport_failure_is_fatal() {
    let engine = test_engine(Arc::new(FailingTransport));
    let err = engine
        .get_range(&query(TsdbModel::Project, KeySet::flat([1i64])))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Backend { status: 502, .. }));
}

#[tokio::test]
async fn test_unknown_environment_is_fatal() {
    let transport = CannedTransport::new(json!({"meta": [], "data": []}));
    let engine = test_engine(transport.clone());
    let err = engine
        .get_range(&query(TsdbModel::Project, KeySet::flat([1i64])).environment(99))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::EnvironmentNotFound(99)));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_malformed_keys_contribute_no_filter() {
    let transport = CannedTransport::new(json!({"meta": [], "data": []}));
    let engine = test_engine(transport.clone());

    let result = engine
        .get_range(&query(TsdbModel::Project, KeySet::Unsupported))
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_empty());

    let body = transport.last_body();
    assert_eq!(body["conditions"], json!([]));
    assert_eq!(body["project"], json!([]));
}

#[test]
fn test_optimal_rollup_is_finest() {
    let engine = test_engine(CannedTransport::new(json!({})));
    assert_eq!(engine.get_optimal_rollup(Utc::now()), 10);
    assert_eq!(engine.get_rollups().len(), 2);
}

#[tokio::test]
async fn test_range_folds_counted_column_into_buckets() {
    let transport = CannedTransport::new(json!({
        "meta": [
            {"name": "issue"}, {"name": "time"}, {"name": "user_id"}, {"name": "aggregate"}
        ],
        "data": [
            {"issue": 101, "time": "2024-01-01T01:00:00Z", "user_id": 5, "aggregate": 2},
            {"issue": 101, "time": "2024-01-01T00:00:00Z", "user_id": 5, "aggregate": 1},
            {"issue": 101, "time": "2024-01-01T00:00:00Z", "user_id": 9, "aggregate": 4},
        ]
    }));
    let engine = test_engine(transport.clone());
    let q = query(TsdbModel::UsersAffectedByGroup, KeySet::flat([101i64]));

    let range = engine.get_range(&q).await.unwrap().unwrap();
    assert_eq!(
        range[&Key::Int(101)],
        vec![(1704067200, 5), (1704070800, 2)]
    );

    let body = transport.last_body();
    assert_eq!(body["groupby"], json!(["issue", "time", "user_id"]));
    assert!(body.get("aggregateby").is_none());

    let sums = engine.get_sums(&q).await.unwrap().unwrap();
    assert_eq!(sums[&Key::Int(101)], 7);
}

#[tokio::test]
async fn test_issue_aggregate_attaches_fingerprints() {
    let transport = CannedTransport::new(json!({
        "meta": [{"name": "project_id"}, {"name": "aggregate"}],
        "data": [{"project_id": 1, "aggregate": [102, 101]}]
    }));
    let engine = test_engine(transport.clone());

    let result = engine
        .get_most_frequent(
            &query(TsdbModel::FrequentIssuesByProject, KeySet::flat([1i64])),
            3,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        result[&Key::Int(1)],
        vec![(Key::Int(101), 1.0), (Key::Int(102), 2.0)]
    );

    let body = transport.last_body();
    assert_eq!(body["groupby"], json!(["project_id"]));
    assert_eq!(body["conditions"], json!([["project_id", "IN", [1]]]));
    assert_eq!(body["aggregateby"], json!("issue"));
    assert_eq!(body["project"], json!([1]));
    assert_eq!(body["issues"], json!([[101, ["f101"]], [102, ["f102"]]]));
}
