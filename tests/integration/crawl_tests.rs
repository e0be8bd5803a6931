//! Integration tests for the scraper
//!
//! These tests use wiremock to stand in for the marketplace API and run the
//! full scrape cycle end-to-end against in-memory stores.

use crate_digger::auth::{CredentialStore, MemoryCredentialStore};
use crate_digger::config::{ApiConfig, Config, CrawlerConfig, OAuthConfig};
use crate_digger::ledger::{InventoryLedger, MemoryLedger};
use crate_digger::{AuthStage, Coordinator, Credential, DiggerError};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const INVENTORY_PATH: &str = "/users/shop/inventory";
const PER_PAGE: u32 = 3;
const PAGES: u64 = 5;

/// Creates a test configuration pointing at the mock server
fn create_test_config(base_url: &str) -> Config {
    Config {
        api: ApiConfig {
            base_url: base_url.to_string(),
            request_timeout_secs: 30,
            probe_username: "shop".to_string(),
        },
        oauth: OAuthConfig {
            consumer_key: "ck".to_string(),
            consumer_secret: "cs".to_string(),
            request_token_url: format!("{}/oauth/request_token", base_url),
            authorize_url: format!("{}/oauth/authorize", base_url),
            access_token_url: format!("{}/oauth/access_token", base_url),
            ..Default::default()
        },
        crawler: CrawlerConfig {
            max_pages: 5,
            per_page: PER_PAGE,
            fetch_concurrency: 1,
            max_consecutive_failures: 3,
        },
        ..Default::default()
    }
}

/// Inventory entry; IDs divisible by 3 are CDs and never qualify
fn entry(id: u64) -> Value {
    let format = if id % 3 == 0 { "CD, Album" } else { "LP, Album" };
    json!({
        "id": id,
        "condition": "Very Good Plus (VG+)",
        "sleeve_condition": "Very Good (VG)",
        "price": {"value": 20.0 + id as f64, "currency": "USD"},
        "seller": {"username": "shop"},
        "release": {
            "id": 1000 + id,
            "artist": "Artist",
            "title": format!("Record {}", id),
            "format": format,
            "label": "Label",
            "stats": {"community": {"in_wantlist": 50, "in_collection": 10}}
        }
    })
}

/// Page `n` of a 15-item inventory listed newest first (15, 14, 13 on page 1)
fn page_body(n: u64) -> Value {
    let first = (PAGES - n + 1) * u64::from(PER_PAGE);
    let listings: Vec<Value> = (0..u64::from(PER_PAGE)).map(|i| entry(first - i)).collect();
    json!({
        "pagination": {"page": n, "pages": PAGES, "per_page": PER_PAGE, "items": 15},
        "listings": listings
    })
}

async fn mount_discovery(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(INVENTORY_PATH))
        .and(query_param("per_page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "pagination": {"page": 1, "pages": 15, "per_page": 1, "items": 15},
            "listings": [entry(15)]
        })))
        .mount(server)
        .await;
}

fn page_mock(n: u64) -> wiremock::MockBuilder {
    Mock::given(method("GET"))
        .and(path(INVENTORY_PATH))
        .and(query_param("page", n.to_string()))
        .and(query_param("per_page", PER_PAGE.to_string()))
}

async fn mount_pages(server: &MockServer) {
    for n in 1..=PAGES {
        page_mock(n)
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(n)))
            .mount(server)
            .await;
    }
}

fn stored_credential() -> Arc<MemoryCredentialStore> {
    Arc::new(MemoryCredentialStore::with_credential(Credential::new(
        "token", "secret",
    )))
}

fn listing_ids(result: &crate_digger::ScrapeResult) -> Vec<u64> {
    result.listings.iter().map(|l| l.listing_id).collect()
}

#[tokio::test]
async fn test_full_scrape_discovers_pages_and_filters() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(INVENTORY_PATH))
        .and(query_param("per_page", "1"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "pagination": {"page": 1, "pages": 15, "per_page": 1, "items": 15},
            "listings": [entry(15)]
        })))
        .expect(1)
        .mount(&server)
        .await;

    for n in 1..=PAGES {
        page_mock(n)
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(n)))
            .expect(1)
            .mount(&server)
            .await;
    }

    let ledger = Arc::new(MemoryLedger::default());
    let coordinator = Coordinator::new(
        create_test_config(&server.uri()),
        stored_credential(),
        ledger.clone(),
    )
    .unwrap();

    let result = coordinator.run("shop").await.unwrap();

    assert!(result.success);
    assert_eq!(result.error_detail, None);
    assert_eq!(listing_ids(&result), vec![14, 13, 11, 10, 8, 7, 5, 4, 2, 1]);
    assert_eq!(result.total_qualifying, 10);
    assert_eq!(result.new_qualifying, 10);
    assert_eq!(result.listings[0].release_id, 1014);

    let snapshot = ledger.get("shop").unwrap();
    assert_eq!(snapshot.known_item_ids, (1..=15).rev().collect::<Vec<u64>>());
    assert!(snapshot.last_seen_date.is_some());
}

#[tokio::test]
async fn test_stops_at_first_known_listing() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;

    for n in 1..=2 {
        page_mock(n)
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(n)))
            .expect(1)
            .mount(&server)
            .await;
    }
    for n in 3..=PAGES {
        page_mock(n)
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(n)))
            .expect(0)
            .mount(&server)
            .await;
    }

    // Third entry of page 2 was seen on an earlier run
    let ledger = Arc::new(MemoryLedger::default());
    ledger.update("shop", &[10, 5]).unwrap();

    let coordinator = Coordinator::new(
        create_test_config(&server.uri()),
        stored_credential(),
        ledger.clone(),
    )
    .unwrap();

    let result = coordinator.run("shop").await.unwrap();

    assert!(result.success);
    assert_eq!(listing_ids(&result), vec![14, 13, 11]);
    assert_eq!(result.new_qualifying, 3);

    let snapshot = ledger.get("shop").unwrap();
    assert_eq!(snapshot.known_item_ids, vec![15, 14, 13, 12, 11, 10, 5]);
}

#[tokio::test]
async fn test_concurrent_fetches_keep_page_order() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;

    // Page 1 arrives last, after page 2 already holds the known listing
    page_mock(1)
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page_body(1))
                .set_delay(Duration::from_millis(500)),
        )
        .expect(1)
        .mount(&server)
        .await;
    page_mock(2)
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(2)))
        .expect(1)
        .mount(&server)
        .await;
    page_mock(3)
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(3)))
        .expect(1)
        .mount(&server)
        .await;
    page_mock(4)
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(4)))
        .mount(&server)
        .await;
    page_mock(5)
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(5)))
        .expect(0)
        .mount(&server)
        .await;

    let ledger = Arc::new(MemoryLedger::default());
    ledger.update("shop", &[10, 5]).unwrap();

    let mut config = create_test_config(&server.uri());
    config.crawler.fetch_concurrency = 3;

    let coordinator = Coordinator::new(config, stored_credential(), ledger.clone()).unwrap();

    let result = coordinator.run("shop").await.unwrap();

    assert!(result.success);
    assert_eq!(listing_ids(&result), vec![14, 13, 11]);

    // Nothing from the in-flight page 3 reaches the ledger
    let snapshot = ledger.get("shop").unwrap();
    assert_eq!(snapshot.known_item_ids, vec![15, 14, 13, 12, 11, 10, 5]);
}

#[tokio::test]
async fn test_failed_pages_are_skipped() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;

    for n in [1, 2, 5] {
        page_mock(n)
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(n)))
            .mount(&server)
            .await;
    }
    page_mock(3)
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    page_mock(4)
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let ledger = Arc::new(MemoryLedger::default());
    let coordinator = Coordinator::new(
        create_test_config(&server.uri()),
        stored_credential(),
        ledger.clone(),
    )
    .unwrap();

    let result = coordinator.run("shop").await.unwrap();

    assert!(result.success);
    assert_eq!(listing_ids(&result), vec![14, 13, 11, 10, 2, 1]);

    let snapshot = ledger.get("shop").unwrap();
    assert_eq!(snapshot.known_item_ids, vec![15, 14, 13, 12, 11, 10, 3, 2, 1]);
}

#[tokio::test]
async fn test_slow_page_times_out_and_is_skipped() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;

    for n in [1, 2, 4, 5] {
        page_mock(n)
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(n)))
            .mount(&server)
            .await;
    }
    page_mock(3)
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page_body(3))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let mut config = create_test_config(&server.uri());
    config.api.request_timeout_secs = 1;

    let coordinator =
        Coordinator::new(config, stored_credential(), Arc::new(MemoryLedger::default())).unwrap();

    let result = coordinator.run("shop").await.unwrap();

    assert!(result.success);
    assert_eq!(listing_ids(&result), vec![14, 13, 11, 10, 5, 4, 2, 1]);
}

#[tokio::test]
async fn test_rescrape_reports_nothing_new() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    mount_pages(&server).await;

    let ledger = Arc::new(MemoryLedger::default());
    let coordinator = Coordinator::new(
        create_test_config(&server.uri()),
        stored_credential(),
        ledger.clone(),
    )
    .unwrap();

    let first = coordinator.run("shop").await.unwrap();
    assert_eq!(first.new_qualifying, 10);

    let second = coordinator.run("shop").await.unwrap();
    assert!(second.success);
    assert_eq!(second.total_qualifying, 0);
    assert_eq!(second.new_qualifying, 0);

    assert_eq!(ledger.get("shop").unwrap().known_item_ids.len(), 15);
}

#[tokio::test]
async fn test_empty_inventory_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(INVENTORY_PATH))
        .and(query_param("per_page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "pagination": {"page": 1, "pages": 0, "per_page": 1, "items": 0},
            "listings": []
        })))
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(
        create_test_config(&server.uri()),
        stored_credential(),
        Arc::new(MemoryLedger::default()),
    )
    .unwrap();

    let result = coordinator.run("shop").await.unwrap();

    assert!(result.success);
    assert!(result.listings.is_empty());
}

#[tokio::test]
async fn test_failed_discovery_leaves_ledger_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(INVENTORY_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let ledger = Arc::new(MemoryLedger::default());
    let coordinator = Coordinator::new(
        create_test_config(&server.uri()),
        stored_credential(),
        ledger.clone(),
    )
    .unwrap();

    let result = coordinator.run("shop").await.unwrap();

    assert!(!result.success);
    assert!(result
        .error_detail
        .as_deref()
        .unwrap()
        .starts_with("could not read pagination"));
    assert!(ledger.get("shop").unwrap().is_cold_start());
}

#[tokio::test]
async fn test_sustained_401_escalates_and_clears_credential() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;

    for n in 1..=3 {
        page_mock(n)
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
    }
    for n in 4..=PAGES {
        page_mock(n)
            .respond_with(ResponseTemplate::new(401))
            .expect(0)
            .mount(&server)
            .await;
    }

    let store = stored_credential();
    let ledger = Arc::new(MemoryLedger::default());
    let coordinator = Coordinator::new(
        create_test_config(&server.uri()),
        store.clone(),
        ledger.clone(),
    )
    .unwrap();

    let result = coordinator.run("shop").await.unwrap();

    assert!(!result.success);
    assert!(result.error_detail.as_deref().unwrap().contains("HTTP 401"));
    assert_eq!(store.load().unwrap(), None);
    assert!(ledger.get("shop").unwrap().is_cold_start());

    // Nothing left to authenticate with and no prompt configured
    let err = coordinator.run("shop").await.unwrap_err();
    assert!(matches!(
        err,
        DiggerError::Auth {
            stage: AuthStage::Acquire,
            ..
        }
    ));
}

#[tokio::test]
async fn test_sustained_server_errors_escalate() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    for n in 1..=PAGES {
        page_mock(n)
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
    }

    let store = stored_credential();
    let coordinator = Coordinator::new(
        create_test_config(&server.uri()),
        store.clone(),
        Arc::new(MemoryLedger::default()),
    )
    .unwrap();

    let result = coordinator.run("shop").await.unwrap();

    assert!(!result.success);
    assert!(result
        .error_detail
        .as_deref()
        .unwrap()
        .contains("3 consecutive upstream failures"));
    // Server errors say nothing about the token
    assert!(store.load().unwrap().is_some());
}

#[tokio::test]
async fn test_cancellation_keeps_ledger_untouched() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;

    page_mock(1)
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(1)))
        .mount(&server)
        .await;
    for n in 2..=PAGES {
        page_mock(n)
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(page_body(n))
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;
    }

    let ledger = Arc::new(MemoryLedger::default());
    let coordinator = Coordinator::new(
        create_test_config(&server.uri()),
        stored_credential(),
        ledger.clone(),
    )
    .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let result = coordinator
        .run_with_cancellation("shop", &cancel)
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.error_detail.as_deref(), Some("scrape cancelled"));
    assert_eq!(listing_ids(&result), vec![14, 13]);
    assert!(ledger.get("shop").unwrap().is_cold_start());
}

#[tokio::test]
async fn test_interactive_authorization_stores_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/oauth/request_token"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "oauth_token=req-token&oauth_token_secret=req-secret&oauth_callback_confirmed=true",
        ))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth/access_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("oauth_token=access-token&oauth_token_secret=access-secret"),
        )
        .expect(1)
        .mount(&server)
        .await;

    mount_discovery(&server).await;
    mount_pages(&server).await;

    let shown_url = Arc::new(Mutex::new(None::<String>));
    let seen = shown_url.clone();
    let prompt = move |url: &str| -> std::io::Result<String> {
        *seen.lock() = Some(url.to_string());
        Ok("verifier".to_string())
    };

    let store = Arc::new(MemoryCredentialStore::new());
    let coordinator = Coordinator::new(
        create_test_config(&server.uri()),
        store.clone(),
        Arc::new(MemoryLedger::default()),
    )
    .unwrap()
    .with_prompt(Arc::new(prompt));

    let result = coordinator.run("shop").await.unwrap();
    assert!(result.success);

    assert_eq!(
        store.load().unwrap(),
        Some(Credential::new("access-token", "access-secret"))
    );
    let url = shown_url.lock().clone().unwrap();
    assert!(url.starts_with(&format!("{}/oauth/authorize", server.uri())));
    assert!(url.ends_with("oauth_token=req-token"));
}

#[tokio::test]
async fn test_rejected_request_token_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oauth/request_token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid consumer"))
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(
        create_test_config(&server.uri()),
        Arc::new(MemoryCredentialStore::new()),
        Arc::new(MemoryLedger::default()),
    )
    .unwrap()
    .with_prompt(Arc::new(|_url: &str| -> std::io::Result<String> {
        Ok("verifier".to_string())
    }));

    let err = coordinator.run("shop").await.unwrap_err();
    assert!(matches!(
        err,
        DiggerError::Auth {
            stage: AuthStage::RequestToken,
            ..
        }
    ));
}

#[tokio::test]
async fn test_injected_credential_wins_and_survives_revocation() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    for n in 1..=PAGES {
        page_mock(n)
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
    }

    let mut config = create_test_config(&server.uri());
    config.oauth.access_token = Some("injected".to_string());
    config.oauth.token_secret = Some("injected-secret".to_string());

    let store = stored_credential();
    let coordinator =
        Coordinator::new(config, store.clone(), Arc::new(MemoryLedger::default())).unwrap();

    let result = coordinator.run("shop").await.unwrap();
    assert!(!result.success);

    // The store was never consulted, so it is left alone
    assert_eq!(store.load().unwrap(), Some(Credential::new("token", "secret")));
}

#[tokio::test]
async fn test_connection_check_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(INVENTORY_PATH))
        .and(query_param("page", "1"))
        .and(query_param("per_page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "pagination": {"page": 1, "pages": 1, "per_page": 1, "items": 1},
            "listings": [entry(1)]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(
        create_test_config(&server.uri()),
        stored_credential(),
        Arc::new(MemoryLedger::default()),
    )
    .unwrap();

    coordinator.test_connection().await.unwrap();

    let stats = coordinator.stats().unwrap();
    assert_eq!(stats.current_request_rate, 1);
}

#[tokio::test]
async fn test_connection_check_reports_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(INVENTORY_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(
        create_test_config(&server.uri()),
        stored_credential(),
        Arc::new(MemoryLedger::default()),
    )
    .unwrap();

    let err = coordinator.test_connection().await.unwrap_err();
    assert!(matches!(err, DiggerError::Upstream { status: 500, .. }));
}
