//! Dangerous-command confirmation gate.
//!
//! The first submission of a flagged command arms a pending token keyed
//! by a SHA-1 fingerprint of (actor, command); resubmitting the identical
//! command inside the window consumes the token and lets execution
//! proceed. Expired or missing tokens re-arm and warn again, so a stale
//! resubmission is never mistaken for consent.
//!
//! This is the only mutable state in the gateway. The map is touched
//! solely on dangerous submissions and only under a short lock, never
//! across an await point.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha1::{Digest, Sha1};

/// Outcome of submitting a dangerous command to the gate.
#[derive(Debug, PartialEq, Eq)]
pub enum Confirmation {
    /// First sighting: a token was armed, the actor must resubmit.
    Armed,
    /// A live token matched and was consumed: proceed.
    Confirmed,
}

pub struct ConfirmationGate {
    window: Duration,
    pending: Mutex<HashMap<String, Instant>>,
}

impl ConfirmationGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Records or resolves a pending confirmation for this actor+command
    /// pair. Expired tokens are swept on every call, so the map stays
    /// bounded by the number of recently warned actors.
    pub fn submit(&self, actor_id: &str, command: &str) -> Confirmation {
        let key = fingerprint(actor_id, command);
        let mut pending = self.pending.lock().expect("confirmation lock poisoned");

        pending.retain(|_, armed_at| armed_at.elapsed() < self.window);

        if pending.remove(&key).is_some() {
            Confirmation::Confirmed
        } else {
            pending.insert(key, Instant::now());
            Confirmation::Armed
        }
    }
}

/// Keyed on actor and exact command text, NUL-separated so the pair
/// cannot be forged by embedding one field in the other.
fn fingerprint(actor_id: &str, command: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(actor_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(command.as_bytes());
    hex::encode(hasher.finalize())
}
