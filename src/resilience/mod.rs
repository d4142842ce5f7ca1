// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry policies for index engine calls.

pub mod retry;

pub use retry::{retry, retry_if, RetryConfig};
