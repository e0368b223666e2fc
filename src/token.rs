//! Credential pool with per-token health tracking.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::error::ErrorKind;
use crate::runtime::Runtime;

/// Environment variable prefix for pool members: `PAT_1`, `PAT_2`, ...
pub const TOKEN_ENV_PREFIX: &str = "PAT_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    /// Never used, or recovered from a rate limit.
    Unknown,
    /// Last request with this token succeeded.
    Good,
    /// Rate limited. May recover once the cooldown has elapsed.
    Exhausted,
    /// Rejected by the upstream. Never handed out again.
    Invalid,
}

impl TokenStatus {
    fn is_usable(&self) -> bool {
        matches!(self, TokenStatus::Unknown | TokenStatus::Good)
    }
}

/// An opaque credential with a human label used in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    label: String,
    secret: String,
}

impl Token {
    pub fn new(label: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            secret: secret.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// The secret with everything but its edges hidden, e.g. `ghp_****1234`.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.secret.chars().collect();
        if chars.len() < 12 {
            return "*".repeat(chars.len());
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}****{}", head, tail)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("label", &self.label)
            .field("secret", &self.masked())
            .finish()
    }
}

struct Slot {
    token: Token,
    status: TokenStatus,
    exhausted_at: Option<Instant>,
}

/// The shared credential pool.
///
/// Status transitions are serialized by an internal mutex, so one source can
/// back any number of overlapping rotations. "Used this run" markers live in
/// each [`TokenRun`], not here.
pub struct TokenSource {
    slots: Mutex<Vec<Slot>>,
    cooldown: Option<Duration>,
}

impl TokenSource {
    pub fn new(tokens: Vec<Token>) -> Self {
        let slots = tokens
            .into_iter()
            .map(|token| Slot {
                token,
                status: TokenStatus::Unknown,
                exhausted_at: None,
            })
            .collect();
        Self {
            slots: Mutex::new(slots),
            cooldown: None,
        }
    }

    /// Builds a pool labelled `PAT_1..PAT_n` in iteration order.
    pub fn from_secrets<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens = secrets
            .into_iter()
            .enumerate()
            .map(|(i, secret)| Token::new(format!("{}{}", TOKEN_ENV_PREFIX, i + 1), secret))
            .collect();
        Self::new(tokens)
    }

    /// Reads `PAT_1`, `PAT_2`, ... until the first unset or blank variable.
    #[tracing::instrument(skip(runtime))]
    pub fn from_env<R: Runtime>(runtime: &R) -> Self {
        let mut tokens = Vec::new();
        for n in 1.. {
            let key = format!("{}{}", TOKEN_ENV_PREFIX, n);
            match runtime.env_var(&key) {
                Ok(value) if !value.trim().is_empty() => {
                    let token = Token::new(key, value.trim());
                    debug!("Found {} ({})", token.label(), token.masked());
                    tokens.push(token);
                }
                _ => break,
            }
        }
        info!("Loaded {} token(s) from the environment", tokens.len());
        Self::new(tokens)
    }

    /// Lets rate-limited tokens back into rotation once `cooldown` has passed
    /// since they were exhausted. Without a cooldown, exhaustion is permanent.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts a rotation: recovers cooled-down tokens and returns a cursor
    /// that hands out each usable token at most once.
    pub fn reset(&self) -> TokenRun<'_> {
        if let Some(cooldown) = self.cooldown {
            let now = Instant::now();
            for slot in self.lock().iter_mut() {
                let recovered = slot.status == TokenStatus::Exhausted
                    && slot
                        .exhausted_at
                        .is_some_and(|at| now.duration_since(at) >= cooldown);
                if recovered {
                    debug!("{} cooled down, back in rotation", slot.token.label());
                    slot.status = TokenStatus::Unknown;
                    slot.exhausted_at = None;
                }
            }
        }

        TokenRun {
            source: self,
            used: HashSet::new(),
        }
    }

    /// Records a credential failure. Rate limits exhaust the token,
    /// rejections invalidate it; other kinds leave it untouched.
    pub fn mark_bad(&self, token: &Token, kind: ErrorKind) {
        let status = match kind {
            ErrorKind::RateLimited => TokenStatus::Exhausted,
            ErrorKind::TokenInvalid => TokenStatus::Invalid,
            _ => return,
        };

        let mut slots = self.lock();
        if let Some(slot) = slots.iter_mut().find(|slot| slot.token == *token) {
            // A concurrent rejection is final; don't downgrade it to a rate limit.
            if slot.status == TokenStatus::Invalid {
                return;
            }
            slot.status = status;
            slot.exhausted_at = (status == TokenStatus::Exhausted).then(Instant::now);
        }
    }

    pub fn mark_good(&self, token: &Token) {
        let mut slots = self.lock();
        if let Some(slot) = slots.iter_mut().find(|slot| slot.token == *token) {
            if slot.status.is_usable() {
                slot.status = TokenStatus::Good;
            }
        }
    }

    pub fn status(&self, token: &Token) -> Option<TokenStatus> {
        self.lock()
            .iter()
            .find(|slot| slot.token == *token)
            .map(|slot| slot.status)
    }

    /// Snapshot of `(label, status)` in pool order.
    pub fn statuses(&self) -> Vec<(String, TokenStatus)> {
        self.lock()
            .iter()
            .map(|slot| (slot.token.label().to_string(), slot.status))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Slot>> {
        // Slots hold plain data, a panicking holder cannot leave them half-written.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One rotation over a [`TokenSource`].
pub struct TokenRun<'a> {
    source: &'a TokenSource,
    used: HashSet<usize>,
}

impl TokenRun<'_> {
    /// Number of tokens handed out so far.
    pub fn attempted(&self) -> usize {
        self.used.len()
    }
}

impl Iterator for TokenRun<'_> {
    type Item = Token;

    /// The next usable token not yet handed out by this run.
    fn next(&mut self) -> Option<Token> {
        let source = self.source;
        let slots = source.lock();
        let (index, slot) = slots
            .iter()
            .enumerate()
            .find(|(i, slot)| !self.used.contains(i) && slot.status.is_usable())?;
        self.used.insert(index);
        Some(slot.token.clone())
    }
}
