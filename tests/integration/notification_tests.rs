use std::sync::Arc;

use olx_watcher::plugins::{DiscordNotifier, Notifier};
use olx_watcher::{AppError, FilterRule};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;

async fn mock_channel(server: &MockServer, id: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/channels/{}", id)))
        .and(header("Authorization", "Bot test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": id.to_string(), "name": "oferty" })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_scan_posts_embed_to_discord_channel() {
    let server = MockServer::start().await;
    mock_channel(&server, 42).await;
    Mock::given(method("POST"))
        .and(path("/channels/42/messages"))
        .and(header("Authorization", "Bot test-token"))
        .and(body_partial_json(json!({
            "embeds": [{
                "title": "iPhone 13 128GB",
                "url": "https://www.olx.pl/d/oferta/iphone-13-IDxyz123.html",
                "color": 0x2ecc71,
                "footer": { "text": "OLX Bot" }
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "1001" })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let notifier = Arc::new(DiscordNotifier::new(test_discord_config(&server.uri())).unwrap());
    let page = Arc::new(FakePage::new(listing_page(&[listing_card(
        "iPhone 13 128GB",
        "1 200 zł",
        "/d/oferta/iphone-13-IDxyz123.html",
        "Gdańsk - Dzisiaj o 14:05",
    )])));
    let mut scan_loop = build_scan_loop(
        page,
        notifier,
        vec![FilterRule::new("iphone", 42, 1000)],
        &dir.path().join("sent_offers.txt"),
        today_at(14, 10),
    )
    .await;

    let report = scan_loop.run_guarded_cycle().await.unwrap();
    assert_eq!(report.dispatched, 1);

    // Already sent, so the mock's single expected call is not exceeded
    let report = scan_loop.run_guarded_cycle().await.unwrap();
    assert_eq!(report.dispatched, 0);
}

#[tokio::test]
async fn test_missing_channel_is_counted_and_offer_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channels/404"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Unknown Channel" })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let notifier = Arc::new(DiscordNotifier::new(test_discord_config(&server.uri())).unwrap());
    let page = Arc::new(FakePage::new(listing_page(&[listing_card(
        "iPhone 13",
        "900 zł",
        "/d/oferta/iphone-13-IDabc777.html",
        "Dzisiaj o 14:08",
    )])));
    let mut scan_loop = build_scan_loop(
        page,
        notifier,
        vec![FilterRule::new("iphone", 404, 0)],
        &dir.path().join("sent_offers.txt"),
        today_at(14, 10),
    )
    .await;

    let report = scan_loop.run_guarded_cycle().await.unwrap();
    assert_eq!(report.failed_sends, 1);
    assert_eq!(report.recorded, 1);
}

#[tokio::test]
async fn test_rejected_login_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/@me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "401: Unauthorized" })))
        .mount(&server)
        .await;

    let notifier = DiscordNotifier::new(test_discord_config(&server.uri())).unwrap();
    let err = notifier.connect().await.unwrap_err();

    assert!(matches!(err, AppError::FatalInit(_)));
    assert!(err.is_fatal());
}
