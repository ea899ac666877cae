//! API Integration Tests
//!
//! Full HTTP round trips over the in-memory store: provisioning,
//! quoting, transfers with ownership checks and idempotency, lookup
//! and history.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    middleware, Router,
};
use rust_decimal_macros::dec;
use serde_json::Value;
use tower::util::ServiceExt;
use uuid::Uuid;

use remesa::api::{
    self,
    routes::{CreateAccountRequest, QuoteRequest, TransferApiRequest},
    AppState,
};
use remesa::domain::Currency;

mod common;

fn test_app(state: AppState) -> Router {
    api::create_router()
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::middleware::auth_middleware,
        ))
        .with_state(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_account_provisioning() {
    let (state, _) = common::test_state();
    let app = test_app(state);
    let user_id = Uuid::new_v4();

    let create = |currency: Currency| {
        Request::builder()
            .method("POST")
            .uri("/accounts")
            .header("content-type", "application/json")
            .header("X-API-Key", common::TEST_API_KEY)
            .body(Body::from(
                serde_json::to_string(&CreateAccountRequest {
                    user_id,
                    holder_name: "Ana Lopez".to_string(),
                    currency,
                })
                .unwrap(),
            ))
            .unwrap()
    };

    let response = app.clone().oneshot(create(Currency::Eur)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["currency"], "EUR");
    assert_eq!(json["balance"], "0");
    let account_id = json["account_id"].as_str().unwrap().to_string();

    // A second EUR account for the same user is rejected
    let response = app.clone().oneshot(create(Currency::Eur)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert_eq!(json["error_code"], "account_exists");

    // A different currency is fine
    let response = app.clone().oneshot(create(Currency::Hnl)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // The provisioned account is readable
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/accounts/{}", account_id))
                .header("X-API-Key", common::TEST_API_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Both accounts show under the user's balances
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/users/{}/balances", user_id))
                .header("X-API-Key", common::TEST_API_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["accounts"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_missing_api_key_is_unauthorized() {
    let (state, _) = common::test_state();
    let app = test_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/users/{}/balances", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_quote_preview() {
    let (state, _) = common::test_state();
    let app = test_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/transfers/quote")
                .header("content-type", "application/json")
                .header("X-API-Key", common::TEST_API_KEY)
                .body(Body::from(
                    serde_json::to_string(&QuoteRequest {
                        amount: "100".to_string(),
                        source_currency: Currency::Eur,
                        target_currency: Currency::Hnl,
                    })
                    .unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["target_amount"], "2388.75");
    assert_eq!(json["customer_rate"], "23.8875");
    assert_eq!(json["platform_fee"], "0.99");
    assert_eq!(json["total_deducted"], "100.99");
}

#[tokio::test]
async fn test_transfer_flow_e2e() {
    let (state, store) = common::test_state();
    let app = test_app(state);

    let sender_user = Uuid::new_v4();
    let recipient_user = Uuid::new_v4();
    let sender_account = common::seed_account(
        &store,
        sender_user,
        "Ana",
        Currency::Eur,
        dec!(1000),
        "RMEUR000000000000000A",
    )
    .await;
    common::seed_account(
        &store,
        recipient_user,
        "Maria",
        Currency::Hnl,
        dec!(0),
        "RMHNL000000000000000B",
    )
    .await;

    let transfer_body = serde_json::to_string(&TransferApiRequest {
        sender_account_id: sender_account,
        recipient_routing: "rmhnl 0000 0000 0000 000b".to_string(),
        amount: "100".to_string(),
        description: Some("Rent".to_string()),
    })
    .unwrap();

    let build_transfer = |user: Uuid| {
        Request::builder()
            .method("POST")
            .uri("/transfers")
            .header("content-type", "application/json")
            .header("X-API-Key", common::TEST_API_KEY)
            .header("X-Request-User-Id", user.to_string())
            .header("Idempotency-Key", "RM-20260830-APIFLOW001")
            .body(Body::from(transfer_body.clone()))
            .unwrap()
    };

    // Without X-Request-User-Id the transfer is refused outright
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/transfers")
                .header("content-type", "application/json")
                .header("X-API-Key", common::TEST_API_KEY)
                .body(Body::from(transfer_body.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // A user who does not own the sender account is forbidden
    let response = app
        .clone()
        .oneshot(build_transfer(recipient_user))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // The owner's transfer goes through; routing normalization matches
    // the grouped lowercase identifier
    let response = app
        .clone()
        .oneshot(build_transfer(sender_user))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["reference"], "RM-20260830-APIFLOW001");
    assert_eq!(json["status"], "completed");
    assert_eq!(json["debited_amount"], "100.99");
    assert_eq!(json["credited_amount"], "2388.75");

    // Replaying the same idempotency key changes nothing
    let response = app
        .clone()
        .oneshot(build_transfer(sender_user))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let sender_after = store.account_snapshot(sender_account).await.unwrap();
    assert_eq!(sender_after.balance.value(), dec!(899.01));

    // Transfer lookup returns both legs
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/transfers/RM-20260830-APIFLOW001")
                .header("X-API-Key", common::TEST_API_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["debited_currency"], "EUR");
    assert_eq!(json["credited_currency"], "HNL");
    assert!(json["exchange"].is_object());

    // History shows the sender's outbound leg with a negative amount
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/users/{}/transactions?offset=0&limit=10", sender_user))
                .header("X-API-Key", common::TEST_API_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let entries = json["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["amount"], "-100.99");
    assert!(entries[0]["exchange"].is_object());
}

#[tokio::test]
async fn test_external_recipient_is_unprocessable() {
    let (state, store) = common::test_state();
    let app = test_app(state);

    let sender_user = Uuid::new_v4();
    let sender_account = common::seed_account(
        &store,
        sender_user,
        "Ana",
        Currency::Eur,
        dec!(1000),
        "RMEUR000000000000000A",
    )
    .await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/transfers")
                .header("content-type", "application/json")
                .header("X-API-Key", common::TEST_API_KEY)
                .header("X-Request-User-Id", sender_user.to_string())
                .body(Body::from(
                    serde_json::to_string(&TransferApiRequest {
                        sender_account_id: sender_account,
                        recipient_routing: "HN99SOMEOTHERBANK001".to_string(),
                        amount: "100".to_string(),
                        description: None,
                    })
                    .unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(response).await;
    assert_eq!(json["error_code"], "external_recipient");
}

#[tokio::test]
async fn test_unknown_transfer_is_not_found() {
    let (state, _) = common::test_state();
    let app = test_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/transfers/RM-20260830-MISSING001")
                .header("X-API-Key", common::TEST_API_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
