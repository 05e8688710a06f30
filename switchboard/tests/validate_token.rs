use std::sync::Arc;

use switchboard::{Gateway, GatewayError, RequestContext, TokenStatus};
use switchboard_mock::{ManualClock, MockStore, fixtures};

const KEY: &str = "abcdefghijklmnopqrstuvwxyz0123456789abcdefghijkl";

fn gateway_at(store: Arc<MockStore>, epoch: i64) -> Gateway {
    Gateway::builder()
        .with_store(store)
        .clock(Arc::new(ManualClock::at(epoch)))
        .build()
        .unwrap()
}

#[tokio::test]
async fn empty_key_is_rejected_without_a_lookup() {
    let store = Arc::new(MockStore::new());
    let gateway = gateway_at(Arc::clone(&store), 1_000);

    let rejection = gateway
        .validate_token(&RequestContext::new(), "")
        .await
        .unwrap_err();
    assert!(matches!(rejection.error, GatewayError::BadArgument(_)));
    assert!(rejection.snapshot.is_none());
    assert_eq!(store.find_token_calls(), 0);
}

#[tokio::test]
async fn unknown_key_is_missing() {
    let store = Arc::new(MockStore::new());
    let gateway = gateway_at(store, 1_000);

    let rejection = gateway
        .validate_token(&RequestContext::new(), "no-such-key")
        .await
        .unwrap_err();
    assert!(matches!(rejection.error, GatewayError::TokenMissing));
    assert!(rejection.snapshot.is_none());
}

#[tokio::test]
async fn disabled_token_is_rejected_with_its_snapshot() {
    let mut token = fixtures::token(1, KEY);
    token.status = TokenStatus::Disabled;
    let store = Arc::new(MockStore::new().with_tokens(vec![token]));
    let gateway = gateway_at(store, 1_000);

    let rejection = gateway
        .validate_token(&RequestContext::new(), KEY)
        .await
        .unwrap_err();
    assert!(matches!(rejection.error, GatewayError::TokenDisabled));
    assert_eq!(rejection.snapshot.unwrap().id, 1);
}

#[tokio::test]
async fn drained_quota_transitions_to_exhausted_and_persists() {
    let mut token = fixtures::token(1, KEY);
    token.remain_quota = 0;
    let store = Arc::new(MockStore::new().with_tokens(vec![token]));
    let gateway = gateway_at(Arc::clone(&store), 1_000);

    let rejection = gateway
        .validate_token(&RequestContext::new(), KEY)
        .await
        .unwrap_err();
    match &rejection.error {
        GatewayError::TokenExhausted { key_hint } => {
            assert_eq!(key_hint, "abc***jkl");
        }
        other => panic!("expected TokenExhausted, got {other}"),
    }
    assert_eq!(rejection.snapshot.unwrap().status, TokenStatus::Exhausted);
    assert_eq!(store.token(1).unwrap().status, TokenStatus::Exhausted);
}

#[tokio::test]
async fn unlimited_quota_ignores_the_balance() {
    let mut token = fixtures::token(1, KEY);
    token.remain_quota = 0;
    token.unlimited_quota = true;
    let store = Arc::new(MockStore::new().with_tokens(vec![token]));
    let gateway = gateway_at(store, 1_000);

    let token = gateway
        .validate_token(&RequestContext::new(), KEY)
        .await
        .unwrap();
    assert_eq!(token.id, 1);
}

#[tokio::test]
async fn past_expiry_transitions_to_expired_and_persists() {
    let mut token = fixtures::token(1, KEY);
    token.expired_time = 900;
    let store = Arc::new(MockStore::new().with_tokens(vec![token]));
    let gateway = gateway_at(Arc::clone(&store), 1_000);

    let rejection = gateway
        .validate_token(&RequestContext::new(), KEY)
        .await
        .unwrap_err();
    assert!(matches!(rejection.error, GatewayError::TokenExpired));
    assert_eq!(store.token(1).unwrap().status, TokenStatus::Expired);

    // A second presentation hits the stored status directly.
    let rejection = gateway
        .validate_token(&RequestContext::new(), KEY)
        .await
        .unwrap_err();
    assert!(matches!(rejection.error, GatewayError::TokenExpired));
}

#[tokio::test]
async fn future_expiry_and_never_expiring_tokens_pass() {
    let mut expiring = fixtures::token(1, KEY);
    expiring.expired_time = 2_000;
    let store = Arc::new(MockStore::new().with_tokens(vec![expiring]));
    let gateway = gateway_at(store, 1_000);

    assert!(gateway.validate_token(&RequestContext::new(), KEY).await.is_ok());
}

#[tokio::test]
async fn lifetime_call_cap_rejects_with_limit_and_used() {
    let mut token = fixtures::token(1, KEY);
    token.total_usage_limit = Some(5);
    token.total_usage_count = 5;
    let store = Arc::new(MockStore::new().with_tokens(vec![token]));
    let gateway = gateway_at(store, 1_000);

    let rejection = gateway
        .validate_token(&RequestContext::new(), KEY)
        .await
        .unwrap_err();
    match rejection.error {
        GatewayError::CapExceeded { limit, used } => {
            assert_eq!(limit, 5);
            assert_eq!(used, 5);
        }
        other => panic!("expected CapExceeded, got {other}"),
    }
}

#[tokio::test]
async fn store_failures_surface_as_backend_errors() {
    let store = Arc::new(MockStore::new().with_tokens(vec![fixtures::token(1, KEY)]));
    store.fail_all("connection refused");
    let gateway = gateway_at(store, 1_000);

    let rejection = gateway
        .validate_token(&RequestContext::new(), KEY)
        .await
        .unwrap_err();
    match rejection.error {
        GatewayError::Backend(cause) => assert!(cause.contains("connection refused")),
        other => panic!("expected Backend, got {other}"),
    }
}
