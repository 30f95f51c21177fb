// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The inference-SDK boundary.
//!
//! Everything above this crate treats the SDK as an opaque streaming RPC:
//! `query(prompt, options)` returns a stream of [`SdkMessage`]s that ends
//! with a [`SdkMessage::Result`] carrying usage and cost.  Authentication is
//! environmental (the underlying CLI's own login); no keys flow through here.

mod cli_client;
mod client;
mod mock;
mod types;

pub use cli_client::CliClient;
pub use client::{InferenceClient, MessageStream};
pub use mock::{MockClient, ScriptedClient};
pub use types::{ContentBlock, PermissionMode, QueryOptions, ResultInfo, SdkMessage, Usage};
