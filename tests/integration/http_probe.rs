//! HTTP reachability scanner against a mock server

use std::time::Duration;

use pretty_assertions::assert_eq;
use tcpd::scanners::HttpScanner;
use tcpd::{ExecutionContext, MetricValue, ScanContext, Scanner};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn metric(measurements: &[tcpd::RawMeasurement], id: &str) -> Option<MetricValue> {
    measurements
        .iter()
        .find(|m| m.metric_id == id)
        .map(|m| m.value.clone())
}

#[tokio::test]
async fn test_reachable_and_unreachable_urls() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let mock_url = url::Url::parse(&mock_server.uri()).unwrap();
    let reachable = mock_url.join("/health").unwrap().to_string();
    // nothing listens on the discard port of localhost
    let unreachable = "http://127.0.0.1:9/".to_string();

    let scanner = HttpScanner::new(vec![reachable, unreachable], Duration::from_secs(2));
    let measurements = scanner
        .run(ScanContext::new(ExecutionContext::default()))
        .await
        .unwrap();

    assert_eq!(metric(&measurements, "http_failures"), Some(MetricValue::Number(1.0)));
    assert!(metric(&measurements, "http_latency_ms").is_some());
}

#[tokio::test]
async fn test_error_status_still_counts_as_reached() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let scanner = HttpScanner::new(vec![mock_server.uri()], Duration::from_secs(2));
    let measurements = scanner
        .run(ScanContext::new(ExecutionContext::default()))
        .await
        .unwrap();

    assert_eq!(metric(&measurements, "http_failures"), Some(MetricValue::Number(0.0)));
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&mock_server)
        .await;

    let scanner = HttpScanner::new(vec![mock_server.uri()], Duration::from_millis(200));
    let measurements = scanner
        .run(ScanContext::new(ExecutionContext::default()))
        .await
        .unwrap();

    assert_eq!(metric(&measurements, "http_failures"), Some(MetricValue::Number(1.0)));
    assert_eq!(metric(&measurements, "http_latency_ms"), None);
}
