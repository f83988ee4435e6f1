//! Token streaming with pacing.
//!
//! Text is split into runs of non-whitespace and runs of whitespace, so
//! concatenating the tokens gives back the original string exactly. A
//! spawned pacing task feeds them into a bounded channel; the outward
//! writer drains it at its own speed.

use std::sync::LazyLock;
use std::time::Duration;

use regex_lite::Regex;
use tokio::sync::mpsc;

static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S+|\s+").expect("Invalid token regex"));

/// Split `text` into word and whitespace tokens.
pub fn tokenize(text: &str) -> Vec<&str> {
    TOKEN_PATTERN.find_iter(text).map(|m| m.as_str()).collect()
}

/// Emits tokens of a string through a bounded channel with a fixed delay.
#[derive(Debug, Clone)]
pub struct TokenStreamer {
    delay: Duration,
    capacity: usize,
}

impl TokenStreamer {
    pub fn new(delay: Duration, capacity: usize) -> Self {
        Self {
            delay,
            capacity: capacity.max(1),
        }
    }

    /// No delay between tokens.
    pub fn unpaced() -> Self {
        Self::new(Duration::ZERO, 64)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Start a pacing task for `text` and return the receiving end.
    ///
    /// The task stops early if the receiver is dropped.
    pub fn spawn(&self, text: String) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let delay = self.delay;

        tokio::spawn(async move {
            for token in tokenize(&text) {
                if tx.send(token.to_string()).await.is_err() {
                    return;
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        });

        rx
    }
}
