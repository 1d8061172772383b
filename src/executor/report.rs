//! Short, stable error codes for fatal flow failures.
//!
//! Operators correlate failures across nodes and releases by code rather
//! than by message text, so the derivation must not depend on process
//! state, hash seeds or the order in which an error chain is walked.

use crate::core::stable_hash;
use std::collections::BTreeSet;
use std::error::Error;

/// Derives a short identifier for an error.
pub trait ErrorCodeDeriver: Send + Sync {
    fn derive(&self, error: &(dyn Error + 'static)) -> String;
}

/// Hashes the messages of an error and its `source()` chain.
///
/// Messages are collected into a sorted set before hashing, so the code
/// only depends on which messages occur. The walk stops at `max_depth` or
/// at the first message already seen, which also ends cyclic chains.
#[derive(Debug, Clone, Copy)]
pub struct ChainHashCodeDeriver {
    pub max_depth: usize,
}

impl ChainHashCodeDeriver {
    pub const DEFAULT_MAX_DEPTH: usize = 16;

    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }
}

impl Default for ChainHashCodeDeriver {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_DEPTH)
    }
}

impl ErrorCodeDeriver for ChainHashCodeDeriver {
    fn derive(&self, error: &(dyn Error + 'static)) -> String {
        let mut messages = BTreeSet::new();
        let mut current = Some(error);

        while let Some(e) = current {
            if messages.len() >= self.max_depth || !messages.insert(e.to_string()) {
                break;
            }
            current = e.source();
        }

        let joined = messages.into_iter().collect::<Vec<_>>().join("\n");
        base36(stable_hash(joined.as_bytes()))
    }
}

fn base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    // Only ASCII digits were pushed
    String::from_utf8_lossy(&out).into_owned()
}
