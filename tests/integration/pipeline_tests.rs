use std::sync::Arc;

use olx_watcher::{DedupStore, FileDedupStore, FilterRule};
use tokio_test::assert_ok;

use super::*;

fn fresh_iphone_page() -> String {
    listing_page(&[listing_card(
        "Apple iPhone 13 128GB",
        "1 200 zł",
        "/d/oferta/iphone-13-IDxyz123.html",
        "Gdańsk - Dzisiaj o 14:05",
    )])
}

#[tokio::test]
async fn test_second_cycle_does_not_resend() {
    let dir = tempfile::tempdir().unwrap();
    let page = Arc::new(FakePage::new(fresh_iphone_page()));
    let notifier = Arc::new(FakeNotifier::default());
    let rules = vec![FilterRule::new("iphone 13", 42, 1000)];
    let mut scan_loop =
        build_scan_loop(page, notifier.clone(), rules, &dir.path().join("sent_offers.txt"), today_at(14, 10)).await;

    let first = scan_loop.run_guarded_cycle().await.unwrap();
    assert_eq!(first.dispatched, 1);

    let second = scan_loop.run_guarded_cycle().await.unwrap();
    assert_eq!(second.offers_found, 1);
    assert_eq!(second.already_seen, 1);
    assert_eq!(second.dispatched, 0);

    assert_eq!(notifier.destinations(), vec![42]);
    assert_eq!(scan_loop.stats().cycles_completed, 2);
}

#[tokio::test]
async fn test_offer_fans_out_to_every_matching_rule() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sent_offers.txt");
    let page = Arc::new(FakePage::new(fresh_iphone_page()));
    let notifier = Arc::new(FakeNotifier::default());
    let rules = vec![
        FilterRule::new("iphone", 1, 0),
        FilterRule::new("iPhone 13", 2, 500),
        FilterRule::new("samsung", 3, 0),
    ];
    let mut scan_loop = build_scan_loop(page, notifier.clone(), rules, &path, today_at(14, 10)).await;

    let report = scan_loop.run_guarded_cycle().await.unwrap();
    assert_eq!(report.dispatched, 2);
    assert_eq!(report.recorded, 1);
    assert_eq!(notifier.destinations(), vec![1, 2]);

    // Recorded once, not once per destination
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "xyz123\n");
}

#[tokio::test]
async fn test_unmatched_offer_is_still_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sent_offers.txt");
    let page = Arc::new(FakePage::new(fresh_iphone_page()));
    let notifier = Arc::new(FakeNotifier::default());
    let rules = vec![FilterRule::new("pixel", 7, 0)];
    let mut scan_loop = build_scan_loop(page, notifier.clone(), rules, &path, today_at(14, 10)).await;

    let report = scan_loop.run_guarded_cycle().await.unwrap();
    assert_eq!(report.dispatched, 0);
    assert_eq!(report.recorded, 1);
    assert!(notifier.destinations().is_empty());
    assert!(scan_loop.dedup().has("xyz123"));
}

#[tokio::test]
async fn test_below_minimum_price_is_recorded_without_send() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sent_offers.txt");
    let page = Arc::new(FakePage::new(fresh_iphone_page()));
    let notifier = Arc::new(FakeNotifier::default());
    let rules = vec![FilterRule::new("iphone 13", 42, 1500)];
    let mut scan_loop = build_scan_loop(page, notifier.clone(), rules, &path, today_at(14, 10)).await;

    let report = scan_loop.run_guarded_cycle().await.unwrap();
    assert_eq!(report.dispatched, 0);
    assert_eq!(report.recorded, 1);
    assert!(notifier.destinations().is_empty());
}

#[tokio::test]
async fn test_unknown_destination_does_not_block_recording() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sent_offers.txt");
    let page = Arc::new(FakePage::new(fresh_iphone_page()));
    let notifier = Arc::new(FakeNotifier::with_unknown(vec![99]));
    let rules = vec![FilterRule::new("iphone", 99, 0), FilterRule::new("iphone", 42, 0)];
    let mut scan_loop = build_scan_loop(page, notifier.clone(), rules, &path, today_at(14, 10)).await;

    let report = scan_loop.run_guarded_cycle().await.unwrap();
    assert_eq!(report.failed_sends, 1);
    assert_eq!(report.dispatched, 1);
    assert_eq!(report.recorded, 1);

    // The failed destination is not retried
    let report = scan_loop.run_guarded_cycle().await.unwrap();
    assert_eq!(report.failed_sends, 0);
    assert_eq!(notifier.destinations(), vec![42]);
}

#[tokio::test]
async fn test_restart_keeps_sent_offers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sent_offers.txt");
    let rules = vec![FilterRule::new("iphone", 42, 0)];

    let first_notifier = Arc::new(FakeNotifier::default());
    let mut first = build_scan_loop(
        Arc::new(FakePage::new(fresh_iphone_page())),
        first_notifier.clone(),
        rules.clone(),
        &path,
        today_at(14, 10),
    )
    .await;
    assert_ok!(first.run_guarded_cycle().await);
    assert_eq!(first_notifier.destinations(), vec![42]);
    drop(first);

    let second_notifier = Arc::new(FakeNotifier::default());
    let mut second = build_scan_loop(
        Arc::new(FakePage::new(fresh_iphone_page())),
        second_notifier.clone(),
        rules,
        &path,
        today_at(14, 12),
    )
    .await;
    let report = second.run_guarded_cycle().await.unwrap();
    assert_eq!(report.already_seen, 1);
    assert!(second_notifier.destinations().is_empty());

    let reloaded = FileDedupStore::open(&path).await.unwrap();
    assert_eq!(reloaded.len(), 1);
}

#[tokio::test]
async fn test_offer_ages_out_of_window() {
    let dir = tempfile::tempdir().unwrap();
    let rules = vec![FilterRule::new("iphone", 42, 0)];

    let on_time = Arc::new(FakeNotifier::default());
    let mut scan_loop = build_scan_loop(
        Arc::new(FakePage::new(fresh_iphone_page())),
        on_time.clone(),
        rules.clone(),
        &dir.path().join("on_time.txt"),
        today_at(14, 10),
    )
    .await;
    assert_eq!(scan_loop.run_guarded_cycle().await.unwrap().dispatched, 1);

    let late = Arc::new(FakeNotifier::default());
    let mut scan_loop = build_scan_loop(
        Arc::new(FakePage::new(fresh_iphone_page())),
        late.clone(),
        rules,
        &dir.path().join("late.txt"),
        today_at(14, 20),
    )
    .await;
    let report = scan_loop.run_guarded_cycle().await.unwrap();
    assert_eq!(report.offers_found, 0);
    assert!(late.destinations().is_empty());
    assert!(!dir.path().join("late.txt").exists());
}

#[tokio::test]
async fn test_link_without_id_is_never_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sent_offers.txt");
    let page = Arc::new(FakePage::new(listing_page(&[listing_card(
        "iPhone 13",
        "1 000 zł",
        "/d/oferta/iphone-13-bez-numeru",
        "Dzisiaj o 14:05",
    )])));
    let notifier = Arc::new(FakeNotifier::default());
    let mut scan_loop =
        build_scan_loop(page, notifier.clone(), vec![FilterRule::new("iphone", 42, 0)], &path, today_at(14, 10)).await;

    for _ in 0..2 {
        let report = scan_loop.run_guarded_cycle().await.unwrap();
        assert_eq!(report.offers_found, 1);
        assert_eq!(report.without_id, 1);
        assert_eq!(report.recorded, 0);
    }
    assert!(notifier.destinations().is_empty());
    assert!(!path.exists());
}

#[tokio::test]
async fn test_failed_record_is_reconsidered_next_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sent_offers.txt");
    let page = Arc::new(FakePage::new(fresh_iphone_page()));
    let notifier = Arc::new(FakeNotifier::default());
    let mut scan_loop =
        build_scan_loop(page, notifier.clone(), vec![FilterRule::new("iphone", 42, 0)], &path, today_at(14, 10)).await;

    // A directory in place of the log makes the append fail
    std::fs::create_dir(&path).unwrap();
    let report = scan_loop.run_guarded_cycle().await.unwrap();
    assert_eq!(report.dispatched, 1);
    assert_eq!(report.record_failures, 1);
    assert!(!scan_loop.dedup().has("xyz123"));

    std::fs::remove_dir(&path).unwrap();
    let report = scan_loop.run_guarded_cycle().await.unwrap();
    assert_eq!(report.dispatched, 1);
    assert_eq!(report.recorded, 1);

    assert_eq!(notifier.destinations(), vec![42, 42]);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "xyz123\n");
}

#[tokio::test]
async fn test_new_listing_picked_up_on_later_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let page = Arc::new(FakePage::new(fresh_iphone_page()));
    let notifier = Arc::new(FakeNotifier::default());
    let mut scan_loop = build_scan_loop(
        page.clone(),
        notifier.clone(),
        vec![FilterRule::new("iphone", 42, 0)],
        &dir.path().join("sent_offers.txt"),
        today_at(14, 10),
    )
    .await;

    assert_ok!(scan_loop.run_guarded_cycle().await);

    page.set_html(listing_page(&[
        listing_card("Apple iPhone 13 128GB", "1 200 zł", "/d/oferta/iphone-13-IDxyz123.html", "Dzisiaj o 14:05"),
        listing_card("iPhone 14 Pro", "3 100 zł", "/d/oferta/iphone-14-IDnew456.html", "Dzisiaj o 14:09"),
    ]));
    let report = scan_loop.run_guarded_cycle().await.unwrap();
    assert_eq!(report.already_seen, 1);
    assert_eq!(report.dispatched, 1);

    let sent = notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].1.title, "iPhone 14 Pro");
    assert_eq!(*page.fetches.lock().unwrap(), 2);
}
