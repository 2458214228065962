//! Fetcher wire-format tests: request shape against a mock server

use pinglun::crawler::{video, BiliFetcher, PageOutcome};
use pinglun::models::SortMode;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn empty_envelope() -> serde_json::Value {
    json!({"code": 0, "data": {"replies": []}})
}

#[tokio::test]
async fn first_page_request_is_signed_and_seeks() {
    let server = MockServer::start().await;

    // The mock only matches when the first-page parameters are all present;
    // the expectation fails the test if the request shape drifts.
    Mock::given(method("GET"))
        .and(path("/x/v2/reply/wbi/main"))
        .and(query_param("oid", "170001"))
        .and(query_param("type", "1"))
        .and(query_param("mode", "3"))
        .and(query_param("plat", "1"))
        .and(query_param("seek_rpid", ""))
        .and(query_param("web_location", "1315875"))
        .and(query_param("pagination_str", r#"{"offset":""}"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_envelope()))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = BiliFetcher::with_base_url(&server.uri(), 100).unwrap();
    let outcome = fetcher.fetch_main_page(170001, SortMode::Hot, "").await.unwrap();
    assert!(matches!(outcome, PageOutcome::EndOfData));

    let requests = server.received_requests().await.unwrap();
    let query = requests[0].url.query().unwrap();
    assert!(query.contains("w_rid="));
    assert!(query.contains("wts="));
}

#[tokio::test]
async fn next_page_request_carries_the_cursor() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/x/v2/reply/wbi/main"))
        .and(query_param("mode", "2"))
        .and(query_param("pagination_str", r#"{"offset":"tok_5"}"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_envelope()))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = BiliFetcher::with_base_url(&server.uri(), 100).unwrap();
    fetcher
        .fetch_main_page(170001, SortMode::Latest, "tok_5")
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let query = requests[0].url.query().unwrap();
    assert!(!query.contains("seek_rpid"));
}

#[tokio::test]
async fn reply_page_request_shape() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/x/v2/reply/reply"))
        .and(query_param("oid", "170001"))
        .and(query_param("root", "111"))
        .and(query_param("ps", "10"))
        .and(query_param("pn", "2"))
        .and(query_param("web_location", "333.788"))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_envelope()))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = BiliFetcher::with_base_url(&server.uri(), 100).unwrap();
    let outcome = fetcher.fetch_reply_page(170001, 111, 2).await.unwrap();
    assert!(matches!(outcome, PageOutcome::EndOfData));
}

#[tokio::test]
async fn video_resolution_over_http() {
    let server = MockServer::start().await;

    let page = r#"<html><head>
        <title data-vue-meta="true">测试视频_哔哩哔哩_bilibili</title>
        </head><body>
        <script>{"aid":170001,"bvid":"BV1xx411c7mD"}</script>
        </body></html>"#;

    Mock::given(method("GET"))
        .and(path("/video/BV1xx411c7mD/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .mount(&server)
        .await;

    let fetcher = BiliFetcher::with_base_url(&server.uri(), 100).unwrap();
    let resolved = video::resolve(&fetcher, "BV1xx411c7mD").await.unwrap();
    assert_eq!(resolved.oid, 170001);
    assert_eq!(resolved.title, "测试视频_哔哩哔哩_bilibili");
}

#[tokio::test]
async fn server_error_is_surfaced() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(412))
        .mount(&server)
        .await;

    let fetcher = BiliFetcher::with_base_url(&server.uri(), 100).unwrap();
    let err = fetcher.fetch_main_page(1, SortMode::Hot, "").await.unwrap_err();
    assert!(err.to_string().contains("412"));
}
