//! Integration tests for the storefront JSON API.
//!
//! These tests require a running storefront (see the crate docs).
//!
//! Run with: cargo test -p aqs-integration-tests -- --ignored

use aqs_integration_tests::TestShopper;
use reqwest::Method;
use serde_json::{Value, json};

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_health_endpoints() {
    let shopper = TestShopper::new();
    for path in ["/health", "/health/ready"] {
        let resp = shopper
            .client
            .get(shopper.url(path))
            .send()
            .await
            .expect("Failed to reach storefront");
        assert_eq!(resp.status(), 200, "{path}");
        assert!(resp.headers().contains_key("x-request-id"));
    }
}

// ============================================================================
// Cart
// ============================================================================

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_new_session_gets_empty_guest_cart() {
    let shopper = TestShopper::new();
    let (status, cart) = shopper.get_json("/api/cart").await.expect("cart request");
    assert_eq!(status, 200);
    assert!(cart["identity"].as_str().expect("identity").starts_with("guest_"));
    assert_eq!(cart["totalItems"], 0);
    assert_eq!(cart["loaded"], true);
}

#[tokio::test]
#[ignore = "Requires running storefront server with a seeded catalog"]
async fn test_cart_survives_across_requests() {
    let shopper = TestShopper::new();
    let (_, listing) = shopper.get_json("/api/perfumes").await.expect("listing");
    let perfume_id = listing["perfumes"][0]["id"]
        .as_str()
        .expect("seed the catalog first (aqs-cli seed)")
        .to_string();

    let (status, cart) = shopper
        .send_json(Method::POST, "/api/cart/items", &json!({"perfumeId": perfume_id}))
        .await
        .expect("add");
    assert_eq!(status, 200);
    assert_eq!(cart["totalItems"], 1);

    let path = format!("/api/cart/items/{perfume_id}");
    let (_, cart) = shopper
        .send_json(Method::PUT, &path, &json!({"quantity": 3.7}))
        .await
        .expect("set quantity");
    assert_eq!(cart["totalItems"], 3);

    let (_, cart) = shopper.get_json("/api/cart").await.expect("reload");
    assert_eq!(cart["items"][0]["quantity"], 3);

    // Clean up
    let resp = shopper
        .client
        .delete(shopper.url(&path))
        .send()
        .await
        .expect("remove");
    let cart: Value = resp.json().await.expect("cart body");
    assert_eq!(cart["totalItems"], 0);
}

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_sessions_are_isolated() {
    let a = TestShopper::new();
    let b = TestShopper::new();
    let (_, cart_a) = a.get_json("/api/cart").await.expect("cart a");
    let (_, cart_b) = b.get_json("/api/cart").await.expect("cart b");
    assert_ne!(cart_a["identity"], cart_b["identity"]);
}

// ============================================================================
// Checkout
// ============================================================================

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_checkout_validation() {
    let shopper = TestShopper::new();
    let (status, state) = shopper
        .send_json(
            Method::PATCH,
            "/api/checkout/contact",
            &json!({"email": "not-an-email", "shippingAddress": "short"}),
        )
        .await
        .expect("update contact");
    assert_eq!(status, 200);
    assert_eq!(state["validation"]["emailOk"], false);
    assert_eq!(state["validation"]["addressOk"], false);
    assert_eq!(state["canPay"], false);

    let (status, body) = shopper
        .send_json(Method::POST, "/api/checkout/pay", &json!({"method": "paypal"}))
        .await
        .expect("pay");
    assert_eq!(status, 422);
    assert!(body["validation"].is_object());
}

// ============================================================================
// Newsletter & auth
// ============================================================================

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_newsletter_rejects_invalid_address() {
    let shopper = TestShopper::new();
    let (status, body) = shopper
        .send_json(Method::POST, "/api/newsletter", &json!({"email": "nope"}))
        .await
        .expect("subscribe");
    assert_eq!(status, 422);
    assert_eq!(body["error"], "Please enter a valid email address.");
}

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_sign_in_rejects_garbage_token() {
    let shopper = TestShopper::new();
    let (status, _) = shopper
        .send_json(Method::POST, "/api/auth/session", &json!({"idToken": "garbage"}))
        .await
        .expect("sign in");
    assert!(status == 401 || status == 503, "unexpected status {status}");
}
