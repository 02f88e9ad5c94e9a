use rand::Rng;
use tracing::{error, warn};

use crate::error::DispatchError;
use crate::models::order::TrackingId;
use crate::observability::metrics::Metrics;

const LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LETTER_COUNT: usize = 3;
const DIGIT_COUNT: usize = 5;

/// Produces `<prefix><3 uppercase letters><5 digits>` codes, probing for collisions.
#[derive(Debug, Clone)]
pub struct TrackingIdGenerator {
    prefix: String,
    max_attempts: u32,
}

impl TrackingIdGenerator {
    pub fn new(prefix: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            prefix: prefix.into(),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// One random candidate, without any uniqueness check.
    pub fn candidate<R: Rng + ?Sized>(&self, rng: &mut R) -> TrackingId {
        let mut code = String::with_capacity(self.prefix.len() + LETTER_COUNT + DIGIT_COUNT);
        code.push_str(&self.prefix);
        for _ in 0..LETTER_COUNT {
            code.push(LETTERS[rng.gen_range(0..LETTERS.len())] as char);
        }
        for _ in 0..DIGIT_COUNT {
            code.push(char::from(b'0' + rng.gen_range(0..10u8)));
        }
        TrackingId::new_unchecked(code)
    }

    /// Draws ids and hands each free one to `claim` until a claim sticks.
    pub fn claim<T>(
        &self,
        exists: impl FnMut(&TrackingId) -> bool,
        claim: impl FnMut(TrackingId) -> Result<Option<T>, DispatchError>,
        metrics: &Metrics,
    ) -> Result<T, DispatchError> {
        self.claim_with(&mut rand::thread_rng(), exists, claim, metrics)
    }

    /// `claim` returns `Ok(None)` when the id was taken between the probe and the write.
    /// Probe hits and lost claims draw from the same budget of `max_attempts`.
    pub fn claim_with<R: Rng + ?Sized, T>(
        &self,
        rng: &mut R,
        mut exists: impl FnMut(&TrackingId) -> bool,
        mut claim: impl FnMut(TrackingId) -> Result<Option<T>, DispatchError>,
        metrics: &Metrics,
    ) -> Result<T, DispatchError> {
        for attempt in 1..=self.max_attempts {
            let candidate = self.candidate(rng);
            if exists(&candidate) {
                metrics.tracking_id_collisions_total.inc();
                warn!(attempt, tracking_id = %candidate, "tracking id collision");
                continue;
            }

            let tracking_id = candidate.clone();
            match claim(candidate)? {
                Some(claimed) => return Ok(claimed),
                None => {
                    metrics.tracking_id_collisions_total.inc();
                    warn!(attempt, tracking_id = %tracking_id, "tracking id taken at write");
                }
            }
        }

        error!(attempts = self.max_attempts, "tracking id generation exhausted");
        Err(DispatchError::TrackingIdExhausted {
            attempts: self.max_attempts,
        })
    }

    /// Draws candidates until one is free, giving up after `max_attempts`.
    pub fn generate_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        exists: impl FnMut(&TrackingId) -> bool,
        metrics: &Metrics,
    ) -> Result<TrackingId, DispatchError> {
        self.claim_with(rng, exists, |candidate| Ok(Some(candidate)), metrics)
    }
}
