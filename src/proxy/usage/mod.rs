//! Per-credential, per-model, and global usage accounting.
//!
//! Global counters are plain atomics. The two indexed maps sit behind a
//! reader-writer lock with atomic fields per entry, so steady-state recording
//! only ever takes the read side; the write side is touched once per new key
//! (double-checked creation).

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
pub struct Counters {
    input: AtomicU64,
    output: AtomicU64,
    requests: AtomicU64,
}

impl Counters {
    fn add(&self, input_tokens: u64, output_tokens: u64) {
        self.input.fetch_add(input_tokens, Ordering::Relaxed);
        self.output.fetch_add(output_tokens, Ordering::Relaxed);
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            input_tokens: self.input.load(Ordering::Relaxed),
            output_tokens: self.output.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub requests: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    pub global: CounterSnapshot,
    pub by_credential: HashMap<String, CounterSnapshot>,
    pub by_model: HashMap<String, CounterSnapshot>,
}

#[derive(Debug, Default)]
pub struct UsageStats {
    global: Counters,
    by_credential: RwLock<HashMap<String, Arc<Counters>>>,
    by_model: RwLock<HashMap<String, Arc<Counters>>>,
}

impl UsageStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, cred_id: &str, model: &str, input_tokens: u64, output_tokens: u64) {
        self.global.add(input_tokens, output_tokens);
        Self::get_or_create(&self.by_credential, cred_id).add(input_tokens, output_tokens);
        Self::get_or_create(&self.by_model, model).add(input_tokens, output_tokens);
    }

    fn get_or_create(map: &RwLock<HashMap<String, Arc<Counters>>>, key: &str) -> Arc<Counters> {
        if let Ok(guard) = map.read() {
            if let Some(counters) = guard.get(key) {
                return Arc::clone(counters);
            }
        }

        let mut guard = match map.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(
            guard
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Counters::default())),
        )
    }

    pub fn summary(&self) -> UsageSummary {
        let by_credential = match self.by_credential.read() {
            Ok(guard) => guard
                .iter()
                .map(|(k, v)| (k.clone(), v.snapshot()))
                .collect(),
            Err(_) => HashMap::new(),
        };
        let by_model = match self.by_model.read() {
            Ok(guard) => guard
                .iter()
                .map(|(k, v)| (k.clone(), v.snapshot()))
                .collect(),
            Err(_) => HashMap::new(),
        };

        UsageSummary {
            global: self.global.snapshot(),
            by_credential,
            by_model,
        }
    }
}

/// Rough input-token estimate: four characters per token plus a flat charge
/// per image, never below one.
pub fn estimate_input_tokens(text: &str, image_count: usize) -> u64 {
    let tokens = text.len() / 4 + image_count * 300;
    tokens.max(1) as u64
}
