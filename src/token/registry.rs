use super::clock::{Clock, SystemClock};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// Token issuance settings as given by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    /// Number of concurrently valid tokens. Zero disables token checking.
    pub max_tokens: usize,
    /// Uses allowed per token before rotation. Zero means unlimited.
    pub max_uses: usize,
    /// Lifetime of a token. Zero means tokens never expire by time.
    pub ttl: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            max_tokens: 1,
            max_uses: 0,
            ttl: Duration::ZERO,
        }
    }
}

impl TokenPolicy {
    pub fn is_enabled(&self) -> bool {
        self.max_tokens > 0
    }

    /// Build the registry, or `None` when token checking is disabled.
    pub fn registry(&self) -> Option<TokenRegistry> {
        NonZeroUsize::new(self.max_tokens)
            .map(|count| TokenRegistry::new(count, self.max_uses, self.ttl))
    }
}

#[derive(Debug)]
struct Token {
    secret: String,
    uses: usize,
    /// `None` when the token never expires by time.
    expires_at: Option<Instant>,
}

impl Token {
    fn fresh(now: Instant, ttl: Duration) -> Self {
        Self {
            secret: Uuid::new_v4().to_string(),
            uses: 0,
            expires_at: expiry(now, ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }
}

fn expiry(now: Instant, ttl: Duration) -> Option<Instant> {
    if ttl.is_zero() {
        None
    } else {
        now.checked_add(ttl)
    }
}

#[derive(Debug)]
struct Slots {
    tokens: Vec<Token>,
    cursor: usize,
}

/// Fixed-size pool of rotating tokens.
///
/// Expiry and use budgets are enforced lazily: only [`get`](Self::get)
/// replaces a slot, and only when the rotation cursor reaches it.
/// [`check`](Self::check) accepts any secret currently held by a slot,
/// including one that is past its expiry but has not been rotated yet.
pub struct TokenRegistry {
    slots: Mutex<Slots>,
    max_uses: usize,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRegistry")
            .field("capacity", &self.capacity())
            .field("max_uses", &self.max_uses)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenRegistry {
    pub fn new(max_count: NonZeroUsize, max_uses: usize, ttl: Duration) -> Self {
        Self::with_clock(max_count, max_uses, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(
        max_count: NonZeroUsize,
        max_uses: usize,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        let tokens = (0..max_count.get())
            .map(|_| Token::fresh(now, ttl))
            .collect();

        Self {
            slots: Mutex::new(Slots { tokens, cursor: 0 }),
            max_uses: if max_uses == 0 { usize::MAX } else { max_uses },
            ttl,
            clock,
        }
    }

    pub fn capacity(&self) -> usize {
        self.lock().tokens.len()
    }

    pub fn max_uses(&self) -> usize {
        self.max_uses
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue the token under the rotation cursor and advance the cursor.
    ///
    /// The slot is regenerated first if it has expired or has used up its
    /// budget; the issuing call then counts as its first use.
    pub fn get(&self) -> String {
        let mut slots = self.lock();
        let now = self.clock.now();
        let cursor = slots.cursor;
        let len = slots.tokens.len();

        let token = &mut slots.tokens[cursor];
        token.uses = token.uses.saturating_add(1);
        if token.is_expired(now) || token.uses > self.max_uses {
            *token = Token::fresh(now, self.ttl);
            token.uses = 1;
            debug!(slot = cursor, "rotated token");
        }
        let secret = token.secret.clone();

        slots.cursor = (cursor + 1) % len;
        secret
    }

    /// Report whether `secret` is held by any slot, counting a match as a use.
    ///
    /// Expiry is not consulted here.
    pub fn check(&self, secret: &str) -> bool {
        let mut slots = self.lock();
        match slots
            .tokens
            .iter_mut()
            .find(|token| secrets_match(&token.secret, secret))
        {
            Some(token) => {
                token.uses = token.uses.saturating_add(1);
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Constant-time comparison so a probe cannot learn a prefix by timing.
fn secrets_match(expected: &str, provided: &str) -> bool {
    expected.len() == provided.len()
        && expected
            .as_bytes()
            .iter()
            .zip(provided.as_bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}
