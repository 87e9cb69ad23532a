//! Tests of tristat-http-server.
use reqwest::StatusCode;
use serde_json::{Value, json};
use tristat::{attribute::Attribute, domain::Ring};
use url::Url;

use crate::common::{init_tracing, records, start_servers};

mod common;

const PRIME: Ring = Ring::Prime {
    modulus: 2_305_843_009_213_693_951,
};

async fn compute(url: &Url, kind: &str, body: Value) -> (StatusCode, Value) {
    let resp = reqwest::Client::new()
        .post(url.join(&format!("compute/{kind}")).expect("url join"))
        .json(&body)
        .send()
        .await
        .expect("request failed");
    let status = resp.status();
    (status, resp.json().await.expect("json body"))
}

#[tokio::test(flavor = "multi_thread")]
async fn statistics_over_http() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let data = records(&[
        (Attribute::Gpa, &[10, 20, 30]),
        (Attribute::Age, &[30, 20, 10]),
        (Attribute::FinancialAid, &[5, 5, 5]),
    ]);
    let urls = start_servers(PRIME, &data, dir.path(), &[0, 1, 2]).await;

    let (status, body) = compute(&urls[0], "mean", json!({"statistic": "gpa"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"kind": "mean", "value": 20.0}));

    let (status, body) = compute(&urls[1], "sum", json!({"statistic": "age"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"], 60);

    let (status, body) = compute(&urls[2], "stddev", json!({"statistic": "financial_aid"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"], 0.0);

    let (status, body) = compute(
        &urls[0],
        "correlation",
        json!({"statistic1": "gpa", "statistic2": "age"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let corr = body["value"].as_f64().expect("number");
    assert!((corr + 1.0).abs() < 1e-9, "{corr}");
}

#[tokio::test(flavor = "multi_thread")]
async fn errors_are_classified() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let data = records(&[(Attribute::Gpa, &[1, 2, 3]), (Attribute::Age, &[4, 4, 4])]);
    let urls = start_servers(Ring::Wrapping, &data, dir.path(), &[0, 1, 2]).await;

    let (status, body) = compute(&urls[0], "mean", json!({"statistic": "height"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "Statistic");

    let (status, body) = compute(&urls[0], "median", json!({"statistic": "gpa"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "InvalidRequest");

    let (status, _) = compute(
        &urls[1],
        "correlation",
        json!({"statistic1": "gpa", "statistic2": "age"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_peer_is_bad_gateway() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let data = records(&[(Attribute::Gpa, &[1, 2, 3])]);
    let urls = start_servers(PRIME, &data, dir.path(), &[0, 1]).await;

    let (status, body) = compute(&urls[0], "mean", json!({"statistic": "gpa"})).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let details = body["details"].as_str().expect("error chain");
    assert!(details.contains("party 2 is unavailable"), "{details}");
}

#[tokio::test(flavor = "multi_thread")]
async fn health() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let urls = start_servers(PRIME, &[], dir.path(), &[0]).await;
    let resp = reqwest::get(urls[0].join("health").expect("url join"))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
}
