use std::time::{Duration, Instant};

/// Idle time after the last keystroke before a burst counts as finished.
pub const TYPING_TIMEOUT: Duration = Duration::from_secs(3);

/// What the debouncer wants sent over the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    Start,
    Stop,
}

/// Turns raw keystrokes into start/stop typing signals.
///
/// The first keystroke after idle emits `Start`; each further keystroke
/// pushes the deadline back; `poll` emits `Stop` once the deadline passes
/// with no new keystroke. Time is passed in so callers drive it from a
/// tokio timer and tests drive it by hand.
#[derive(Debug, Clone)]
pub struct TypingDebouncer {
    timeout: Duration,
    last_keystroke: Option<Instant>,
}

impl Default for TypingDebouncer {
    fn default() -> Self {
        Self::new(TYPING_TIMEOUT)
    }
}

impl TypingDebouncer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_keystroke: None,
        }
    }

    pub fn is_typing(&self) -> bool {
        self.last_keystroke.is_some()
    }

    pub fn keystroke(&mut self, now: Instant) -> Option<TypingSignal> {
        let was_typing = self.is_typing();
        self.last_keystroke = Some(now);
        (!was_typing).then_some(TypingSignal::Start)
    }

    /// When `poll` should next be called, if a burst is in progress.
    pub fn deadline(&self) -> Option<Instant> {
        self.last_keystroke.map(|t| t + self.timeout)
    }

    pub fn poll(&mut self, now: Instant) -> Option<TypingSignal> {
        match self.deadline() {
            Some(deadline) if now >= deadline => {
                self.last_keystroke = None;
                Some(TypingSignal::Stop)
            }
            _ => None,
        }
    }

    /// End the burst right away, e.g. when the message is sent.
    pub fn stop(&mut self) -> Option<TypingSignal> {
        self.last_keystroke.take().map(|_| TypingSignal::Stop)
    }
}
