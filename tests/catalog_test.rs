use chrono::NaiveDate;
use ftw_runner::core::catalog::{select_best_images, CloudLadder, StacCatalog};
use ftw_runner::core::windows::calculate_window_dates;
use ftw_runner::domain::model::{GeoPoint, Region};
use ftw_runner::domain::ports::ImageryCatalog;
use ftw_runner::FtwError;
use httpmock::prelude::*;
use serde_json::json;
use std::time::Duration;

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn kigali() -> Region {
    Region::new(GeoPoint::new(30.0, -1.9), GeoPoint::new(30.2, -2.1))
}

fn catalog(server: &MockServer) -> StacCatalog {
    StacCatalog::new(&server.base_url(), "sentinel-2-l2a", Duration::from_secs(5)).unwrap()
}

fn item(id: &str, cloud: f64) -> serde_json::Value {
    json!({
        "type": "Feature",
        "id": id,
        "properties": { "datetime": "2024-06-01T08:00:00Z", "eo:cloud_cover": cloud }
    })
}

#[tokio::test]
async fn test_search_sends_stac_query() {
    let server = MockServer::start_async().await;
    let search = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/search")
                .body_contains(r#""collections":["sentinel-2-l2a"]"#)
                .body_contains(r#""datetime":"2024-05-17/2024-06-16""#)
                .body_contains(r#""eo:cloud_cover":{"lt":20}"#)
                .body_contains(r#""type":"Polygon""#);
            then.status(200).json_body(json!({
                "type": "FeatureCollection",
                "features": [item("S2A_CLEAR", 3.5), item("S2B_HAZY", 12.0)],
                "links": []
            }));
        })
        .await;

    let scenes = catalog(&server)
        .search(&kigali(), date("2024-05-17"), date("2024-06-16"), 20)
        .await
        .unwrap();

    search.assert_async().await;
    assert_eq!(scenes.len(), 2);
    assert_eq!(scenes[0].id, "S2A_CLEAR");
    assert_eq!(scenes[0].cloud_cover, Some(3.5));
    assert_eq!(scenes[1].datetime.as_deref(), Some("2024-06-01T08:00:00Z"));
}

#[tokio::test]
async fn test_search_follows_next_links() {
    let server = MockServer::start_async().await;
    let first = server
        .mock_async(|when, then| {
            when.method(POST).path("/search");
            then.status(200).json_body(json!({
                "features": [item("PAGE1", 10.0)],
                "links": [{
                    "rel": "next",
                    "href": server.url("/search/next"),
                    "method": "POST",
                    "body": { "token": "page-2" },
                    "merge": true
                }]
            }));
        })
        .await;
    // merged body keeps the first query and adds the token
    let second = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/search/next")
                .body_contains(r#""token":"page-2""#)
                .body_contains(r#""datetime":"2024-05-17/2024-06-16""#);
            then.status(200).json_body(json!({
                "features": [item("PAGE2", 5.0)],
                "links": [{ "rel": "next", "href": server.url("/search/page3") }]
            }));
        })
        .await;
    let third = server
        .mock_async(|when, then| {
            when.method(GET).path("/search/page3");
            then.status(200).json_body(json!({ "features": [item("PAGE3", 1.0)], "links": [] }));
        })
        .await;

    let scenes = catalog(&server)
        .search(&kigali(), date("2024-05-17"), date("2024-06-16"), 20)
        .await
        .unwrap();

    first.assert_async().await;
    second.assert_async().await;
    third.assert_async().await;
    let ids: Vec<&str> = scenes.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["PAGE1", "PAGE2", "PAGE3"]);
}

#[tokio::test]
async fn test_search_stops_at_page_limit() {
    let server = MockServer::start_async().await;
    let looping = server
        .mock_async(|when, then| {
            when.method(POST).path("/search");
            then.status(200).json_body(json!({
                "features": [item("AGAIN", 10.0)],
                "links": [{ "rel": "next", "href": server.url("/search"), "method": "POST" }]
            }));
        })
        .await;

    let scenes = catalog(&server)
        .with_paging(10, 3)
        .search(&kigali(), date("2024-05-17"), date("2024-06-16"), 20)
        .await
        .unwrap();

    looping.assert_hits_async(3).await;
    assert_eq!(scenes.len(), 3);
}

#[tokio::test]
async fn test_http_error_is_catalog_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/search");
            then.status(503).body("service unavailable");
        })
        .await;

    let result = catalog(&server)
        .search(&kigali(), date("2024-05-17"), date("2024-06-16"), 20)
        .await;

    match result {
        Err(FtwError::CatalogError { message }) => {
            assert!(message.contains("503"));
            assert!(message.contains("service unavailable"));
        }
        other => panic!("expected catalog error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_ladder_relaxes_only_unresolved_window() {
    let server = MockServer::start_async().await;
    let windows = calculate_window_dates(date("2024-06-01"), date("2024-11-30"));

    let a_strict = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/search")
                .body_contains(r#""datetime":"2024-05-17/2024-06-16""#)
                .body_contains(r#""lt":20"#);
            then.status(200).json_body(json!({ "features": [item("WIN_A", 8.0)], "links": [] }));
        })
        .await;
    let b_strict = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/search")
                .body_contains(r#""datetime":"2024-10-31/2024-11-30""#)
                .body_contains(r#""lt":20"#);
            then.status(200).json_body(json!({ "features": [], "links": [] }));
        })
        .await;
    let b_relaxed = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/search")
                .body_contains(r#""datetime":"2024-10-31/2024-11-30""#)
                .body_contains(r#""lt":50"#);
            then.status(200).json_body(json!({
                "features": [item("WIN_B_CLOUDY", 45.0), item("WIN_B", 31.0)],
                "links": []
            }));
        })
        .await;

    let best = select_best_images(
        &catalog(&server),
        &kigali(),
        &windows,
        &CloudLadder::new(20, &[50, 70, 100]).unwrap(),
    )
    .await
    .unwrap();

    a_strict.assert_hits_async(1).await;
    b_strict.assert_hits_async(1).await;
    b_relaxed.assert_hits_async(1).await;
    assert_eq!(best.win_a.id, "WIN_A");
    assert_eq!(best.win_b.id, "WIN_B");
    assert_eq!(best.bbox, [30.0, -2.1, 30.2, -1.9]);
}
