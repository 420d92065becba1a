//! API integration tests against a running server backed by Postgres.
//!
//! Seed one available book and one patron, then run with e.g.
//! `LENDING_TEST_BOOK_ID=1 LENDING_TEST_PATRON_ID=1 cargo test --test api_tests -- --ignored`

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

const BASE_URL: &str = "http://localhost:8080/api/v1";

fn seeded_id(var: &str) -> i64 {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1)
}

async fn borrow(client: &Client, book_id: i64, patron_id: i64) -> reqwest::Response {
    client
        .post(format!("{}/borrowings/borrow", BASE_URL))
        .json(&json!({ "book_id": book_id, "patron_id": patron_id }))
        .send()
        .await
        .expect("Failed to send borrow request")
}

async fn give_back(client: &Client, book_id: i64, patron_id: i64) -> reqwest::Response {
    client
        .put(format!("{}/borrowings/return/{}/patron/{}", BASE_URL, book_id, patron_id))
        .send()
        .await
        .expect("Failed to send return request")
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_readiness_reaches_database() {
    let client = Client::new();

    let response = client
        .get(format!("{}/ready", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore]
async fn test_borrow_unknown_book() {
    let client = Client::new();

    let response = borrow(&client, i64::MAX, seeded_id("LENDING_TEST_PATRON_ID")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore]
async fn test_concurrent_borrows_over_postgres() {
    let client = Client::new();
    let book_id = seeded_id("LENDING_TEST_BOOK_ID");
    let patron_id = seeded_id("LENDING_TEST_PATRON_ID");

    let requests = (0..16).map(|_| {
        let client = client.clone();
        tokio::spawn(async move { borrow(&client, book_id, patron_id).await.status() })
    });
    let mut statuses = Vec::new();
    for handle in requests.collect::<Vec<_>>() {
        statuses.push(handle.await.expect("task panicked"));
    }

    let winners = statuses.iter().filter(|s| **s == StatusCode::OK).count();
    let conflicts = statuses.iter().filter(|s| **s == StatusCode::CONFLICT).count();
    assert_eq!(winners, 1, "statuses: {:?}", statuses);
    assert_eq!(conflicts, 15, "statuses: {:?}", statuses);

    let response = give_back(&client, book_id, patron_id).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["return_date"].is_string());

    let response = give_back(&client, book_id, patron_id).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
