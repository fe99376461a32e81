//! The reqwest transport against a real local HTTP server.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use trawl::fetch::{FetchClient, FetchPolicy, FetchRequest, HttpTransport, RequestPacer};
use trawl::{FetchError, ReqwestTransport, ScrapePolicy};

fn policy() -> ScrapePolicy {
    ScrapePolicy::default().with_user_agent("trawl-test/0.1")
}

fn client(transport: ReqwestTransport, max_retries: u32) -> FetchClient {
    FetchClient::new(
        Arc::new(transport),
        Arc::new(RequestPacer::unpaced()),
        FetchPolicy {
            max_retries,
            backoff_base: Duration::from_millis(5),
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn test_sends_user_agent_and_extra_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .and(header("user-agent", "trawl-test/0.1"))
        .and(header("x-api-key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>hi</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let transport = ReqwestTransport::new(&policy()).unwrap();
    let request = FetchRequest::get(format!("{}/page", server.uri()))
        .with_header("x-api-key", "secret");
    let response = transport.execute(&request).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body, "<html>hi</html>");
}

#[tokio::test]
async fn test_client_retries_5xx_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let fetch_client = client(ReqwestTransport::new(&policy()).unwrap(), 3);
    let result = fetch_client
        .fetch(
            FetchRequest::get(format!("{}/flaky", server.uri())),
            "t",
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.status, 200);
    assert_eq!(result.body, "ok");
}

#[tokio::test]
async fn test_client_gives_up_after_retry_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let fetch_client = client(ReqwestTransport::new(&policy()).unwrap(), 2);
    let err = fetch_client
        .fetch(
            FetchRequest::get(format!("{}/down", server.uri())),
            "t",
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(err.is_exhausted());
}

#[tokio::test]
async fn test_client_does_not_retry_4xx() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(410))
        .expect(1)
        .mount(&server)
        .await;

    let fetch_client = client(ReqwestTransport::new(&policy()).unwrap(), 3);
    let err = fetch_client
        .fetch(
            FetchRequest::get(format!("{}/gone", server.uri())),
            "t",
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Status { status: 410, .. }));
}

#[tokio::test]
async fn test_timeout_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(5))
                .set_body_string("late"),
        )
        .mount(&server)
        .await;

    let fetch_client = client(ReqwestTransport::new(&policy()).unwrap(), 1);
    let err = fetch_client
        .fetch(
            FetchRequest::get(format!("{}/slow", server.uri()))
                .with_timeout(Duration::from_millis(50)),
            "t",
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(err.is_exhausted());
}
