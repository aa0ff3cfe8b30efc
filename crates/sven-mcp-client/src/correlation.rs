// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::Error;

pub type Slot = oneshot::Sender<Result<Value, Error>>;

/// Per-connection request-id allocator and response-correlation map.
///
/// Ids are assigned monotonically and never reused within the connection's
/// lifetime. Each in-flight id owns exactly one single-shot slot; it is
/// removed from the map and fulfilled atomically when a matching response
/// arrives, or drained with an error when the connection is disposed.
#[derive(Default)]
pub struct CorrelationMap {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, Slot>>,
}

impl CorrelationMap {
    pub fn new() -> Self {
        Self { next_id: AtomicU64::new(1), pending: Mutex::new(HashMap::new()) }
    }

    /// Allocate a fresh request id and register a slot for it.
    pub fn register(&self) -> (u64, oneshot::Receiver<Result<Value, Error>>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);
        (id, rx)
    }

    /// Fulfil the slot for `id`, if still pending. Returns false if there was
    /// no matching in-flight request (a late or duplicate response).
    pub fn fulfill(&self, id: u64, result: Result<Value, Error>) -> bool {
        let slot = self.pending.lock().unwrap().remove(&id);
        match slot {
            Some(tx) => {
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    /// Fail every pending slot with the same error, e.g. when the transport
    /// has closed. Leaves the map empty.
    pub fn drain_with_error(&self, make_err: impl Fn() -> Error) {
        let mut pending = self.pending.lock().unwrap();
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(make_err()));
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}
