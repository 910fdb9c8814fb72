//! Typewriter playback: paces already-received text out to the UI.
//!
//! Network chunks land in a growing target string; a fixed-interval
//! ticker reveals a few characters at a time after an initial
//! minimum-latency gate. The revealed text is always a prefix of the
//! target and only ever grows; on cancellation the full arrived target
//! is handed back so partial output is preserved.

use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Minimum time the caller's loading state is shown before typing
    /// starts, measured from the start of the request.
    pub min_loader: Duration,
    pub tick: Duration,
    pub chars_per_tick: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            min_loader: Duration::from_millis(500),
            tick: Duration::from_millis(30),
            chars_per_tick: 3,
        }
    }
}

/// Mutable per-stream playback state. `revealed` is a byte offset that
/// always lands on a char boundary, so the revealed slice is a valid
/// prefix of the target.
#[derive(Debug, Default)]
pub struct PlaybackBuffer {
    target: String,
    revealed: usize,
}

impl PlaybackBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) {
        self.target.push_str(chunk);
    }

    /// Advance the revealed prefix by up to `max_chars` characters and
    /// return it.
    pub fn advance(&mut self, max_chars: usize) -> &str {
        let mut end = self.revealed;
        for (offset, ch) in self.target[self.revealed..].char_indices().take(max_chars) {
            end = self.revealed + offset + ch.len_utf8();
        }
        self.revealed = end;
        &self.target[..self.revealed]
    }

    pub fn revealed(&self) -> &str {
        &self.target[..self.revealed]
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn is_drained(&self) -> bool {
        self.revealed == self.target.len()
    }

    pub fn into_target(self) -> String {
        self.target
    }
}

/// How a playback run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEnd {
    /// Upstream finished and every character was revealed.
    Drained,
    /// Cancellation fired; timers were stopped immediately.
    Cancelled,
}

/// Final target for a cancelled run. Cancellation races chunk arrival,
/// so anything still queued in the channel has already "arrived" and
/// belongs in the committed text; drain it before handing back.
fn cancelled_target(mut buffer: PlaybackBuffer, rx: &mut UnboundedReceiver<String>) -> String {
    while let Ok(chunk) = rx.try_recv() {
        buffer.push(&chunk);
    }
    buffer.into_target()
}

/// Drive playback until the upstream channel closes and the buffer
/// drains, or cancellation fires. Returns the full arrived target text
/// along with how the run ended; `on_reveal` receives the growing
/// revealed prefix.
pub async fn run_typewriter(
    mut rx: UnboundedReceiver<String>,
    request_started: Instant,
    config: &PlaybackConfig,
    mut on_reveal: impl FnMut(&str),
    cancel: &CancellationToken,
) -> (String, PlaybackEnd) {
    let mut buffer = PlaybackBuffer::new();

    // Wait for the first chunk; an upstream that closes without one
    // (errors, empty responses) ends playback with nothing to show.
    let first = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return (cancelled_target(buffer, &mut rx), PlaybackEnd::Cancelled);
        }
        chunk = rx.recv() => chunk,
    };
    let Some(first) = first else {
        return (buffer.into_target(), PlaybackEnd::Drained);
    };
    buffer.push(&first);

    // Minimum-latency gate: keep buffering while it runs.
    let gate = config.min_loader.saturating_sub(request_started.elapsed());
    let gate_sleep = tokio::time::sleep(gate);
    tokio::pin!(gate_sleep);
    let mut upstream_done = false;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return (cancelled_target(buffer, &mut rx), PlaybackEnd::Cancelled);
            }
            _ = &mut gate_sleep => break,
            chunk = rx.recv(), if !upstream_done => match chunk {
                Some(chunk) => buffer.push(&chunk),
                None => upstream_done = true,
            },
        }
    }

    // Reveal phase: the ticker always advances toward the current
    // target, which may still be growing.
    let mut ticker = tokio::time::interval(config.tick);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return (cancelled_target(buffer, &mut rx), PlaybackEnd::Cancelled);
            }
            chunk = rx.recv(), if !upstream_done => match chunk {
                Some(chunk) => buffer.push(&chunk),
                None => upstream_done = true,
            },
            _ = ticker.tick() => {
                if !buffer.is_drained() {
                    on_reveal(buffer.advance(config.chars_per_tick));
                } else if upstream_done {
                    return (buffer.into_target(), PlaybackEnd::Drained);
                }
            }
        }
    }
}
