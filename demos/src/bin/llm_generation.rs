//! LLM analytics demo.
//!
//! Records `$ai_generation` events for a short conversation with a stand-in
//! model. Swap `fake_completion` for a real provider call; ambit only needs the
//! request, the response and the timing.
//!
//! # Running
//!
//! ```bash
//! export POSTHOG_API_KEY="phc_..."
//! cargo run -p ambit-demos --bin llm_generation
//! ```

use std::time::Duration;

use ambit::ai::Generation;
use ambit::prelude::*;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

/// A model reply with the token usage a provider would report.
struct Completion {
    text: String,
    input_tokens: u64,
    output_tokens: u64,
    status: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env()?;
    let client = Client::from_settings(&settings).await?;

    // All generations of one conversation share a trace id.
    let trace_id = format!("conversation-{}", std::process::id());

    client
        .scoped(|ctx| async move {
            ctx.identify("user-42");
            ctx.tag("feature", "support-chat");

            let mut messages = vec![json!({"role": "system", "content": "You answer burrito questions."})];
            for question in ["Which filling is the spiciest?", "Is carnitas gluten free?", ""] {
                messages.push(json!({"role": "user", "content": question}));

                let (completion, latency) = Generation::time(fake_completion(&messages)).await;

                Generation::new("demo-provider", "burrito-bot-1")
                    .trace_id(trace_id.clone())
                    .base_url("https://llm.example.com/v1")
                    .input(Value::Array(messages.clone()))
                    .output_choices(json!([{"role": "assistant", "content": completion.text}]))
                    .input_tokens(completion.input_tokens)
                    .output_tokens(completion.output_tokens)
                    .http_status(completion.status)
                    .latency(latency)
                    .capture(&ctx);

                if completion.status >= 400 {
                    tracing::warn!(status = completion.status, "model call failed");
                    continue;
                }
                println!("> {question}\n{}\n", completion.text);
                messages.push(json!({"role": "assistant", "content": completion.text}));
            }
        })
        .await;

    client.shutdown().await;
    println!("delivered {} events", client.stats().sent);
    Ok(())
}

/// Pretends to call a model; empty questions are rejected like a provider 400.
async fn fake_completion(messages: &[Value]) -> Completion {
    tokio::time::sleep(Duration::from_millis(120)).await;

    let question = messages
        .last()
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default();
    let input_tokens = messages
        .iter()
        .filter_map(|m| m["content"].as_str())
        .map(|c| c.split_whitespace().count() as u64)
        .sum();

    if question.is_empty() {
        return Completion {
            text: String::new(),
            input_tokens,
            output_tokens: 0,
            status: 400,
        };
    }

    let text = if question.contains("spiciest") {
        "Chorizo with habanero salsa."
    } else {
        "Carnitas is usually gluten free; check the tortilla."
    };
    Completion {
        text: text.to_string(),
        input_tokens,
        output_tokens: text.split_whitespace().count() as u64,
        status: 200,
    }
}
