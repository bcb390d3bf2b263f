use chrono::{TimeZone, Utc};
use farm_adaptor::{run, FarmClient, Forwarded, IngestOptions, RetryPolicy, UpstreamClient};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        base: Duration::from_millis(1),
        cap: Duration::from_millis(5),
    }
}

fn options() -> IngestOptions {
    IngestOptions {
        vendor: "Acme".into(),
        source: "feeder-test".into(),
        from: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        to: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        concurrency: 2,
        retry: fast_retry(),
    }
}

async fn mount_farm(farm: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/users/token"))
        .and(body_string_contains("grant_type=password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok", "token_type": "bearer"})))
        .mount(farm)
        .await;
    Mock::given(method("GET"))
        .and(path("/devices"))
        .and(query_param("vendor", "Acme"))
        .and(header("Authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "devices": [{"id": "dev-1", "tag": "D1", "vendor": "Acme"}],
            "meta": {"count": 1, "limit": 1000, "offset": 0}
        })))
        .mount(farm)
        .await;
    Mock::given(method("GET"))
        .and(path("/sensors"))
        .and(query_param("device", "dev-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sensors": [
                {"id": "sen-t", "device": "dev-1", "measurement": "temperature"},
                {"id": "sen-h", "device": "dev-1", "measurement": "humidity"}
            ],
            "meta": {"count": 2, "limit": 1000, "offset": 0}
        })))
        .mount(farm)
        .await;
}

async fn clients(farm: &MockServer, upstream: &MockServer) -> (UpstreamClient, FarmClient) {
    let http = reqwest::Client::new();
    let farm_client = FarmClient::new(http.clone(), &farm.uri());
    farm_client.login("feeder", "feeder-password").await.unwrap();
    (UpstreamClient::new(http, &upstream.uri(), "key"), farm_client)
}

#[tokio::test]
async fn forwards_readings_and_reports_failures() {
    let farm = MockServer::start().await;
    let upstream = MockServer::start().await;
    mount_farm(&farm).await;

    Mock::given(method("GET"))
        .and(path("/timeseries"))
        .and(header("X-Api-Key", "key"))
        .and(query_param("device", "D1"))
        .and(query_param("measurement", "temperature"))
        .and(query_param("from", "2024-01-01T00:00:00Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [
            {"timestamp": "2024-01-01T01:00:00Z", "value": 20.5},
            {"timestamp": "2024-01-01T02:00:00Z", "value": 21.0, "predicted": true}
        ]})))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/timeseries"))
        .and(query_param("measurement", "humidity"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&upstream)
        .await;

    Mock::given(method("POST"))
        .and(path("/samples"))
        .and(body_partial_json(json!({"timestamp": "2024-01-01T01:00:00Z"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(1)
        .mount(&farm)
        .await;
    Mock::given(method("POST"))
        .and(path("/samples"))
        .and(body_partial_json(json!({
            "timestamp": "2024-01-01T02:00:00Z",
            "predicted": true,
            "meta": {"source": "feeder-test", "sourceId": "D1/temperature/2024-01-01T02:00:00Z"}
        })))
        .respond_with(ResponseTemplate::new(409))
        .expect(1)
        .mount(&farm)
        .await;

    let (upstream_client, farm_client) = clients(&farm, &upstream).await;
    let report = run(upstream_client, farm_client, options()).await.unwrap();

    assert_eq!(report.devices, 1);
    assert_eq!(report.sensors, 2);
    assert_eq!(report.fetched, 2);
    assert_eq!(report.forwarded, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].item, "D1/humidity");
    assert!(!report.is_success());
}

#[tokio::test]
async fn transient_upstream_errors_are_retried() {
    let farm = MockServer::start().await;
    let upstream = MockServer::start().await;
    mount_farm(&farm).await;

    Mock::given(method("GET"))
        .and(path("/timeseries"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/timeseries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&upstream)
        .await;

    let (upstream_client, farm_client) = clients(&farm, &upstream).await;
    let report = run(upstream_client, farm_client, options()).await.unwrap();
    assert!(report.is_success(), "{:?}", report.failures);
    assert_eq!(report.fetched, 0);
}

#[tokio::test]
async fn failed_device_listing_aborts() {
    let farm = MockServer::start().await;
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&farm)
        .await;

    let http = reqwest::Client::new();
    let farm_client = FarmClient::new(http.clone(), &farm.uri());
    let upstream_client = UpstreamClient::new(http, &upstream.uri(), "key");
    let err = run(upstream_client, farm_client, options()).await.unwrap_err();
    assert_eq!(err.status(), Some(reqwest::StatusCode::UNAUTHORIZED));
}

#[tokio::test]
async fn expired_token_is_renewed_once() {
    let farm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "old", "token_type": "bearer"})))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&farm)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "new", "token_type": "bearer"})))
        .mount(&farm)
        .await;
    Mock::given(method("POST"))
        .and(path("/samples"))
        .and(header("Authorization", "Bearer old"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&farm)
        .await;
    Mock::given(method("POST"))
        .and(path("/samples"))
        .and(header("Authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(2)
        .mount(&farm)
        .await;

    let client = FarmClient::new(reqwest::Client::new(), &farm.uri());
    client.login("feeder", "feeder-password").await.unwrap();
    let sample = json!({"timestamp": "2024-01-01T01:00:00Z", "value": 1.0});
    assert_eq!(client.post_sample(&sample).await.unwrap(), Forwarded::Created);
    assert_eq!(client.post_sample(&sample).await.unwrap(), Forwarded::Created);
}

#[tokio::test]
async fn rejected_renewal_is_reported() {
    let farm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok", "token_type": "bearer"})))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&farm)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&farm)
        .await;
    Mock::given(method("POST"))
        .and(path("/samples"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&farm)
        .await;

    let client = FarmClient::new(reqwest::Client::new(), &farm.uri());
    client.login("feeder", "feeder-password").await.unwrap();
    let err = client.post_sample(&json!({})).await.unwrap_err();
    assert_eq!(err.status(), Some(reqwest::StatusCode::UNAUTHORIZED));
}
