// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Index engine client interface.
//!
//! The HTTP client itself lives outside this crate; anything implementing
//! [`IndexClient`] can be driven. [`InMemoryIndexClient`] models the engine's
//! refresh visibility for tests and demos.

pub mod memory;
pub mod traits;

pub use memory::InMemoryIndexClient;
pub use traits::{ClientError, IndexClient};
