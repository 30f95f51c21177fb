// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::{QueryOptions, SdkMessage};

pub type MessageStream = Pin<Box<dyn Stream<Item = anyhow::Result<SdkMessage>> + Send>>;

/// One inference conversation provider.
///
/// A single `query` call runs one full agent turn: the returned stream yields
/// assistant/user/system messages in arrival order and terminates with a
/// `Result` message.  Stream errors are surfaced as `Err` items; consumers
/// decide whether to abort or keep reading.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Human-readable client name for status display.
    fn name(&self) -> &str;

    /// Open a streaming conversation turn.
    async fn query(&self, prompt: &str, options: QueryOptions) -> anyhow::Result<MessageStream>;
}
