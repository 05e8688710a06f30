//! End-to-end request flow against the in-memory mock store: validate a
//! token, select a channel, and account the completion.

use std::sync::Arc;

use switchboard::{CompletionRecord, Gateway, RequestContext};
use switchboard_mock::{MockStore, fixtures};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let store = Arc::new(
        MockStore::new()
            .with_channels(vec![
                fixtures::channel(1, "default", "gpt-4,gpt-4o", 10, 1),
                fixtures::channel(2, "default", "gpt-4", 10, 9),
                fixtures::channel(3, "default", "gpt-4", 5, 0),
            ])
            .with_tokens(vec![fixtures::token(7, "sk-example-key-000000000000000000000000000007")]),
    );

    let gateway = Arc::new(Gateway::builder().with_store(store).build()?);
    gateway.refresh().await?;

    let ctx = RequestContext::with_deadline(std::time::Duration::from_secs(5));
    let token = gateway
        .validate_token(&ctx, "sk-example-key-000000000000000000000000000007")
        .await
        .map_err(|rejection| rejection.error)?;
    println!("token #{} ({}) authorized", token.id, token.name);

    let (channel, group) = gateway
        .select_channel(&ctx, &token.group, "gpt-4", 0, token.channel_tag())
        .await?;
    println!("dispatching to channel #{} ({}) in group {group}", channel.id, channel.name);

    gateway
        .record_completion(
            &ctx,
            &CompletionRecord {
                token_id: token.id,
                token_name: token.name.clone(),
                model: "gpt-4".to_string(),
                prompt_tokens: 128,
                completion_tokens: 64,
                quota: 3,
                success: true,
            },
        )
        .await?;
    println!("completion recorded");

    Ok(())
}
