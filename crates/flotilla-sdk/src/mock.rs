// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::{
    client::MessageStream, ContentBlock, QueryOptions, ResultInfo, SdkMessage, Usage,
};

/// Deterministic mock client for tests.  Echoes the prompt back as a single
/// assistant text block followed by a result message.
#[derive(Default)]
pub struct MockClient;

#[async_trait]
impl crate::InferenceClient for MockClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn query(&self, prompt: &str, _options: QueryOptions) -> anyhow::Result<MessageStream> {
        let messages: Vec<anyhow::Result<SdkMessage>> = vec![
            Ok(SdkMessage::assistant_text(format!("MOCK: {prompt}"))),
            Ok(SdkMessage::Result(ResultInfo {
                usage: Usage {
                    input_tokens: 10,
                    output_tokens: 10,
                    ..Default::default()
                },
                total_cost_usd: 0.001,
                session_id: "mock-session".into(),
                duration_ms: 1,
                num_turns: 1,
                is_error: false,
                result: None,
            })),
        ];
        Ok(Box::pin(stream::iter(messages)))
    }
}

/// A pre-scripted mock client.  Each call to `query` pops the next script
/// from the front of the queue.  This lets tests specify exact message
/// sequences – including tool use blocks and mid-stream errors – without
/// network access.
pub struct ScriptedClient {
    scripts: Arc<Mutex<Vec<Vec<Result<SdkMessage, String>>>>>,
    /// The last `(prompt, options)` seen by this client.
    /// Written on each `query` call so tests can inspect what was sent.
    pub last_query: Arc<Mutex<Option<(String, QueryOptions)>>>,
}

impl ScriptedClient {
    /// Build a client from a list of scripts.  The outer `Vec` is the ordered
    /// list of calls; the inner `Vec` is the message sequence for that call.
    /// An `Err(msg)` item becomes a stream error at that position.
    pub fn new(scripts: Vec<Vec<Result<SdkMessage, String>>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            last_query: Arc::new(Mutex::new(None)),
        }
    }

    /// Convenience: a script that replies with one text block and a clean
    /// result message carrying the given usage numbers.
    pub fn text_script(text: impl Into<String>, cost: f64) -> Vec<Result<SdkMessage, String>> {
        vec![
            Ok(SdkMessage::assistant_text(text.into())),
            Ok(Self::result_message(cost)),
        ]
    }

    /// Convenience: a script that fails mid-stream after a text block.
    pub fn failing_script(error: impl Into<String>) -> Vec<Result<SdkMessage, String>> {
        vec![
            Ok(SdkMessage::assistant_text("partial output")),
            Err(error.into()),
        ]
    }

    /// Convenience: a script exercising tool tracking — tool use and result
    /// blocks interleaved with text, ending in a clean result message.
    pub fn tool_script(blocks: Vec<ContentBlock>) -> Vec<Result<SdkMessage, String>> {
        vec![
            Ok(SdkMessage::Assistant { content: blocks }),
            Ok(Self::result_message(0.01)),
        ]
    }

    /// A terminal result message with fixed token counts and the given cost.
    pub fn result_message(cost: f64) -> SdkMessage {
        SdkMessage::Result(ResultInfo {
            usage: Usage {
                input_tokens: 100,
                output_tokens: 50,
                cache_creation_input_tokens: 20,
                cache_read_input_tokens: 30,
            },
            total_cost_usd: cost,
            session_id: "scripted-session".into(),
            duration_ms: 5,
            num_turns: 1,
            is_error: false,
            result: None,
        })
    }

    /// Convenience: a client that always answers with the same text.
    pub fn always_text(text: impl Into<String>) -> Self {
        let t = text.into();
        Self::new(vec![Self::text_script(t, 0.001)])
    }
}

#[async_trait]
impl crate::InferenceClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted-mock"
    }

    async fn query(&self, prompt: &str, options: QueryOptions) -> anyhow::Result<MessageStream> {
        *self.last_query.lock().unwrap() = Some((prompt.to_string(), options));
        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                // Default fallback when all scripts are consumed
                Self::text_script("[no more scripts]", 0.0)
            } else {
                scripts.remove(0)
            }
        };
        let wrapped: Vec<anyhow::Result<SdkMessage>> = script
            .into_iter()
            .map(|item| item.map_err(anyhow::Error::msg))
            .collect();
        Ok(Box::pin(stream::iter(wrapped)))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
