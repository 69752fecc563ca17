//! Identity and egress rotation
//!
//! `IdentityRotator` cycles the declared client identity across requests;
//! `EgressRotator` keeps a working/failed partition of alternate egress
//! endpoints and hands out the next working one per attempt.

use std::sync::Mutex;

use rand::Rng;

use crate::config::RotationMode;

/// Default identity pool: common desktop browser user agents
pub const DEFAULT_IDENTITIES: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:89.0) Gecko/20100101 Firefox/89.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:89.0) Gecko/20100101 Firefox/89.0",
    "Mozilla/5.0 (X11; Linux x86_64; rv:89.0) Gecko/20100101 Firefox/89.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36 Edg/91.0.864.59",
];

/// Cycles an outbound identity string across requests
#[derive(Debug)]
pub struct IdentityRotator {
    identities: Vec<String>,
    mode: RotationMode,
    cursor: Mutex<usize>,
}

impl IdentityRotator {
    /// Create a rotator over the given pool; an empty pool falls back to
    /// the default identities
    pub fn new(identities: Vec<String>, mode: RotationMode) -> Self {
        let identities = if identities.is_empty() {
            DEFAULT_IDENTITIES.iter().map(|s| s.to_string()).collect()
        } else {
            identities
        };
        Self {
            identities,
            mode,
            cursor: Mutex::new(0),
        }
    }

    pub fn with_defaults(mode: RotationMode) -> Self {
        Self::new(Vec::new(), mode)
    }

    /// Next identity per the configured mode. Sequential mode is
    /// deterministic and exhaustive across the pool before repeating.
    pub fn get_next(&self) -> String {
        match self.mode {
            RotationMode::Sequential => {
                let mut cursor = self.cursor.lock().unwrap();
                let identity = self.identities[*cursor].clone();
                *cursor = (*cursor + 1) % self.identities.len();
                identity
            }
            RotationMode::Random => {
                let index = rand::thread_rng().gen_range(0..self.identities.len());
                self.identities[index].clone()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

#[derive(Debug)]
struct EgressState {
    working: Vec<String>,
    failed: Vec<String>,
    cursor: usize,
}

/// Maintains the working/failed partition of alternate egress endpoints
#[derive(Debug)]
pub struct EgressRotator {
    state: Mutex<EgressState>,
}

impl EgressRotator {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            state: Mutex::new(EgressState {
                working: endpoints,
                failed: Vec::new(),
                cursor: 0,
            }),
        }
    }

    /// Next working endpoint by round-robin, or None if all have failed
    pub fn get_next(&self) -> Option<String> {
        let mut state = self.state.lock().unwrap();
        if state.working.is_empty() {
            return None;
        }
        state.cursor %= state.working.len();
        let endpoint = state.working[state.cursor].clone();
        state.cursor = (state.cursor + 1) % state.working.len();
        Some(endpoint)
    }

    /// Move an endpoint to the failed set; idempotent
    pub fn mark_failed(&self, endpoint: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(pos) = state.working.iter().position(|e| e == endpoint) {
            let removed = state.working.remove(pos);
            // keep the cursor pointing at the same successor
            if state.cursor > pos {
                state.cursor -= 1;
            }
            state.failed.push(removed);
        }
    }

    /// Move every failed endpoint back into rotation
    pub fn reset_failed(&self) {
        let mut state = self.state.lock().unwrap();
        let failed = std::mem::take(&mut state.failed);
        state.working.extend(failed);
    }

    pub fn working_count(&self) -> usize {
        self.state.lock().unwrap().working.len()
    }

    pub fn failed_count(&self) -> usize {
        self.state.lock().unwrap().failed.len()
    }
}
