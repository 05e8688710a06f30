use std::time::Duration;

use switchboard::{GatewayError, RequestContext, with_deadline};

#[tokio::test]
async fn unbounded_contexts_never_time_out() {
    let ctx = RequestContext::new();
    assert!(ctx.remaining().is_none());

    let value = with_deadline(&ctx, "op", async { Ok::<_, GatewayError>(7) })
        .await
        .unwrap();
    assert_eq!(value, 7);
}

#[tokio::test]
async fn elapsed_deadlines_abort_pending_work() {
    let ctx = RequestContext::with_deadline(Duration::from_millis(20));

    let err = with_deadline(&ctx, "candidate query", async {
        std::future::pending::<Result<(), GatewayError>>().await
    })
    .await
    .unwrap_err();
    match err {
        GatewayError::DeadlineExceeded { operation } => {
            assert_eq!(operation, "candidate query");
        }
        other => panic!("expected DeadlineExceeded, got {other}"),
    }

    // Once elapsed, the remaining budget clamps at zero.
    assert_eq!(ctx.remaining(), Some(Duration::ZERO));
}

#[tokio::test]
async fn fast_work_completes_within_the_deadline() {
    let ctx = RequestContext::with_deadline(Duration::from_secs(5));
    let value = with_deadline(&ctx, "op", async { Ok::<_, GatewayError>("done") })
        .await
        .unwrap();
    assert_eq!(value, "done");
}
