//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                          - Liveness check
//! GET    /health/ready                    - Readiness check (probes the document store)
//!
//! # Catalog
//! GET    /api/perfumes                    - Perfume listing
//! GET    /api/perfumes/{id}               - Perfume detail with note tiers
//!
//! # News
//! GET    /api/news                        - Feed, newest first, with featured post
//! GET    /api/news/{id}                   - Single post
//!
//! # Newsletter
//! POST   /api/newsletter                  - Subscribe an address
//!
//! # Cart (per session)
//! GET    /api/cart                        - Current cart snapshot
//! POST   /api/cart/items                  - Add one unit ({"perfumeId"})
//! PUT    /api/cart/items/{id}             - Set quantity ({"quantity"})
//! DELETE /api/cart/items/{id}             - Remove line
//! POST   /api/cart/items/{id}/increase    - One more unit
//! POST   /api/cart/items/{id}/decrease    - One less unit
//!
//! # Checkout (per session)
//! GET    /api/checkout                    - Form state, validation and totals
//! PATCH  /api/checkout/contact            - Update contact fields (debounced save)
//! POST   /api/checkout/contact            - Save contact fields now
//! POST   /api/checkout/pay                - Start a payment session ({"method"})
//!
//! # Auth
//! GET    /api/auth/session                - Current user and cart
//! POST   /api/auth/session                - Sign in with an ID token ({"idToken"})
//! DELETE /api/auth/session                - Sign out
//! ```

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod news;
pub mod newsletter;

use axum::{
    Router,
    extract::State,
    http::{Request, StatusCode},
    middleware::from_fn,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::middleware::{create_session_layer, request_id_middleware};
use crate::state::AppState;
use crate::store::DocumentStore;

/// Create the catalog routes router.
pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(catalog::index))
        .route("/{id}", get(catalog::show))
}

/// Create the news routes router.
pub fn news_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(news::index))
        .route("/{id}", get(news::show))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/items", post(cart::add))
        .route(
            "/items/{id}",
            axum::routing::put(cart::set_quantity).delete(cart::remove),
        )
        .route("/items/{id}/increase", post(cart::increase))
        .route("/items/{id}/decrease", post(cart::decrease))
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(checkout::show))
        .route(
            "/contact",
            axum::routing::patch(checkout::update_contact).post(checkout::save_contact),
        )
        .route("/pay", post(checkout::pay))
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new().route(
        "/session",
        get(auth::show).post(auth::sign_in).delete(auth::sign_out),
    )
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/api/perfumes", catalog_routes())
        .nest("/api/news", news_routes())
        .route("/api/newsletter", post(newsletter::create))
        .nest("/api/cart", cart_routes())
        .nest("/api/checkout", checkout_routes())
        .nest("/api/auth", auth_routes())
}

/// The routes with sessions, request IDs and tracing applied.
pub fn app(state: AppState) -> Router {
    let session_layer = create_session_layer(state.config());

    routes()
        .layer(session_layer)
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<axum::body::Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Reads one document to verify the store is reachable.
/// Returns 503 Service Unavailable if it is not.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store().get("health", "ready").await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use aqs_core::{AuthUser, CurrencyCode, PERFUMES_COLLECTION, UserId};
    use axum::body::Body;
    use axum::http::{Method, Response, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::{AnyVerifier, StaticVerifier};
    use crate::catalog::LIST_ERROR;
    use crate::config::{
        CartSyncConfig, PaymentsConfig, StoreBackend, StoreConfig, StorefrontConfig,
    };
    use crate::middleware::request_id::REQUEST_ID_HEADER;
    use crate::payments::PaymentClient;
    use crate::store::{AnyStore, MemoryStore};

    fn test_config() -> StorefrontConfig {
        StorefrontConfig {
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            store: StoreConfig {
                backend: StoreBackend::Memory,
                firestore: None,
            },
            payments: PaymentsConfig {
                base_url: "http://127.0.0.1:9".to_string(),
                currency: CurrencyCode::BHD,
            },
            cart: CartSyncConfig::default(),
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    fn test_app(store: &MemoryStore, verifier: StaticVerifier) -> Router {
        let config = test_config();
        let payments = PaymentClient::new(&config.payments);
        app(AppState::with_parts(
            config,
            AnyStore::Memory(store.clone()),
            AnyVerifier::Static(verifier),
            payments,
        ))
    }

    fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert(
            PERFUMES_COLLECTION,
            "oud",
            json!({"name": "Royal Oud", "price": 20, "notes": ["Saffron", "Rose", "Oud, Amber"]}),
        );
        store
    }

    fn request(method: Method, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    fn session_cookie(response: &Response<Body>) -> Option<String> {
        response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(String::from)
    }

    async fn json_body(response: Response<Body>) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app(&MemoryStore::new(), StaticVerifier::new());
        let response = app
            .clone()
            .oneshot(request(Method::GET, "/health", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));

        let response = app
            .oneshot(request(Method::GET, "/health/ready", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readiness_fails_when_store_is_down() {
        let store = MemoryStore::new();
        store.fail_reads(true);
        let response = test_app(&store, StaticVerifier::new())
            .oneshot(request(Method::GET, "/health/ready", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_cart_flow_across_requests() {
        let store = seeded_store();
        let app = test_app(&store, StaticVerifier::new());

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/api/cart", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = session_cookie(&response).unwrap();
        let cart = json_body(response).await;
        assert!(cart["identity"].as_str().unwrap().starts_with("guest_"));
        assert_eq!(cart["totalItems"], 0);
        assert_eq!(cart["loaded"], true);

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/api/cart/items",
                Some(&cookie),
                Some(json!({"perfumeId": "oud"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["totalItems"], 1);

        let response = app
            .clone()
            .oneshot(request(Method::POST, "/api/cart/items/oud/increase", Some(&cookie), None))
            .await
            .unwrap();
        let cart = json_body(response).await;
        assert_eq!(cart["totalItems"], 2);
        assert_eq!(cart["items"][0]["quantity"], 2);

        let response = app
            .clone()
            .oneshot(request(
                Method::PUT,
                "/api/cart/items/oud",
                Some(&cookie),
                Some(json!({"quantity": -4})),
            ))
            .await
            .unwrap();
        let cart = json_body(response).await;
        assert_eq!(cart["totalItems"], 0);
        assert!(cart["items"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_unknown_perfume_is_not_found() {
        let app = test_app(&seeded_store(), StaticVerifier::new());
        let response = app
            .oneshot(request(
                Method::POST,
                "/api/cart/items",
                None,
                Some(json!({"perfumeId": "missing"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "Not found: perfume missing");
    }

    #[tokio::test]
    async fn test_pay_rejects_invalid_contact() {
        let app = test_app(&seeded_store(), StaticVerifier::new());
        let response = app
            .oneshot(request(
                Method::POST,
                "/api/checkout/pay",
                None,
                Some(json!({"method": "benefitpay"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert!(body["validation"].is_object());
    }

    #[tokio::test]
    async fn test_pay_rejects_empty_cart() {
        let app = test_app(&seeded_store(), StaticVerifier::new());
        let response = app
            .clone()
            .oneshot(request(
                Method::PATCH,
                "/api/checkout/contact",
                None,
                Some(json!({"email": "fan@example.com", "shippingAddress": "Road 1, Block 2, Manama"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = session_cookie(&response).unwrap();
        let state = json_body(response).await;
        assert_eq!(state["canPay"], false);

        let response = app
            .oneshot(request(Method::POST, "/api/checkout/pay", Some(&cookie), Some(json!({}))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(response).await["error"], "Your cart is empty.");
    }

    #[tokio::test]
    async fn test_sign_in_moves_to_user_cart() {
        let store = seeded_store();
        let verifier = StaticVerifier::new();
        verifier.insert(
            "good-token",
            AuthUser {
                id: UserId::new("u1"),
                email: None,
            },
        );
        let app = test_app(&store, verifier);

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/api/auth/session",
                None,
                Some(json!({"idToken": "good-token"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = session_cookie(&response).unwrap();
        let body = json_body(response).await;
        assert_eq!(body["user"]["id"], "u1");
        assert_eq!(body["cart"]["identity"], "user_u1");

        let response = app
            .oneshot(request(Method::DELETE, "/api/auth/session", Some(&cookie), None))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert!(body["user"].is_null());
        assert!(body["cart"]["identity"].as_str().unwrap().starts_with("guest_"));
    }

    #[tokio::test]
    async fn test_sign_in_with_bad_token() {
        let verifier = StaticVerifier::new();
        verifier.insert(
            "good-token",
            AuthUser {
                id: UserId::new("u1"),
                email: None,
            },
        );
        let response = test_app(&MemoryStore::new(), verifier)
            .oneshot(request(
                Method::POST,
                "/api/auth/session",
                None,
                Some(json!({"idToken": "forged"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_catalog_routes() {
        let app = test_app(&seeded_store(), StaticVerifier::new());
        let response = app
            .clone()
            .oneshot(request(Method::GET, "/api/perfumes", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["perfumes"][0]["id"], "oud");
        assert!(body.get("error").is_none());

        let response = app
            .oneshot(request(Method::GET, "/api/perfumes/oud", None, None))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["noteTiers"]["base"], json!(["Oud", "Amber"]));
    }

    #[tokio::test]
    async fn test_catalog_failure_is_an_inline_error() {
        let store = MemoryStore::new();
        store.fail_reads(true);
        let response = test_app(&store, StaticVerifier::new())
            .oneshot(request(Method::GET, "/api/perfumes", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["error"], LIST_ERROR);
        assert_eq!(body["perfumes"], json!([]));
    }

    #[tokio::test]
    async fn test_newsletter() {
        let store = MemoryStore::new();
        let app = test_app(&store, StaticVerifier::new());

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/api/newsletter",
                None,
                Some(json!({"email": "nope"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            json_body(response).await["error"],
            "Please enter a valid email address."
        );

        let response = app
            .oneshot(request(
                Method::POST,
                "/api/newsletter",
                None,
                Some(json!({"email": " Fan@Example.com"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(json_body(response).await["email"], "fan@example.com");
    }
}
