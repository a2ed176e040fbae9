//! Remote proxy list and broker retrieval.

use plfetch::proxy::ProxyListFetcher;
use plfetch::{ConnectionDescriptor, PoolSource, ProxySource, ProxySourceError, ProxyStrategy};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_fetch_plaintext_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/http.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "# updated hourly\n222.252.194.29:8080\n103.152.112.162:80\nnot-a-proxy\n8.8.4.4:1080:socks5\n",
        ))
        .mount(&server)
        .await;

    let fetcher = ProxyListFetcher::new().unwrap();
    let entries = fetcher
        .fetch_list(&format!("{}/http.txt", server.uri()))
        .await
        .unwrap();

    assert_eq!(
        entries,
        vec![
            ConnectionDescriptor::http("222.252.194.29", 8080),
            ConnectionDescriptor::http("103.152.112.162", 80),
            ConnectionDescriptor::socks5("8.8.4.4", 1080),
        ]
    );
}

#[tokio::test]
async fn test_fetch_broker_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/proxies"))
        .and(header("authorization", "Bearer broker-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"ip": "10.0.0.1", "port": 3128, "protocol": "http"},
                {"ip": "10.0.0.2", "port": "1080", "protocol": "socks5"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = ProxyListFetcher::new().unwrap();
    let entries = fetcher
        .fetch_broker(&format!("{}/v1/proxies", server.uri()), Some("broker-key"))
        .await
        .unwrap();

    assert_eq!(
        entries,
        vec![
            ConnectionDescriptor::http("10.0.0.1", 3128),
            ConnectionDescriptor::socks5("10.0.0.2", 1080),
        ]
    );
}

#[tokio::test]
async fn test_list_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let fetcher = ProxyListFetcher::new().unwrap();
    let err = fetcher
        .fetch_list(&format!("{}/http.txt", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, ProxySourceError::Status { status: 503, .. }));
}

#[tokio::test]
async fn test_resolve_remote_pool_caps_and_shuffles() {
    let server = MockServer::start().await;
    let list: String = (1..=30).map(|i| format!("10.1.0.{}:8080\n", i)).collect();
    Mock::given(method("GET"))
        .and(path("/pool.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(list))
        .mount(&server)
        .await;

    let strategy = ProxyStrategy::Pool(PoolSource::Remote {
        url: format!("{}/pool.txt", server.uri()),
    });
    let drawn: Vec<_> = ProxySource::resolve(&strategy, 5).await.collect();

    assert_eq!(drawn.len(), 5);
    assert!(drawn.iter().all(|d| d.is_proxy()));
}

#[tokio::test]
async fn test_resolve_failing_broker_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let strategy = ProxyStrategy::Pool(PoolSource::Broker {
        url: format!("{}/v1/proxies", server.uri()),
        api_key: None,
    });
    let source = ProxySource::resolve(&strategy, 5).await;

    assert!(source.is_exhausted());
}
