// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod gateway;
mod types;

pub use gateway::{ChunkStream, GatewayClient};
pub use types::*;
