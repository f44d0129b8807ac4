use tracing::warn;

/// Phase of the single snapshot writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePhase {
    /// No write in flight.
    Idle,
    /// One write in flight.
    Writing,
    /// One write in flight and another requested meanwhile.
    WritingWithPending,
}

/// What the caller must do after reporting an event to the [`WriteScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDecision {
    /// Take a fresh snapshot and start writing it.
    Start,
    /// A write is already in flight; the request was recorded as pending.
    Deferred,
    /// Nothing left to write.
    Done,
}

/// Coalescing bookkeeping for debounced, single-writer snapshot persistence.
///
/// The scheduler itself performs no I/O: callers arm a debounce timer when
/// [`WriteScheduler::request`] says so, report when it fires and when a write completes, and
/// start a write whenever the scheduler answers [`WriteDecision::Start`].
#[derive(Debug, Clone)]
pub struct WriteScheduler {
    phase: WritePhase,
    debounce_armed: bool,
    closed: bool,
}

impl Default for WriteScheduler {
    fn default() -> Self {
        Self {
            phase: WritePhase::Idle,
            debounce_armed: false,
            closed: false,
        }
    }
}

impl WriteScheduler {
    /// Create an idle scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current writer phase.
    pub fn phase(&self) -> WritePhase {
        self.phase
    }

    /// Whether a debounce timer is currently armed.
    pub fn debounce_armed(&self) -> bool {
        self.debounce_armed
    }

    /// Record that the state changed. Returns `true` when the caller must arm the debounce timer.
    pub fn request(&mut self) -> bool {
        if self.closed || self.debounce_armed {
            return false;
        }
        self.debounce_armed = true;
        true
    }

    /// The debounce timer fired.
    pub fn debounce_elapsed(&mut self) -> WriteDecision {
        self.debounce_armed = false;
        if self.closed {
            return WriteDecision::Done;
        }
        match self.phase {
            WritePhase::Idle => {
                self.phase = WritePhase::Writing;
                WriteDecision::Start
            }
            WritePhase::Writing | WritePhase::WritingWithPending => {
                self.phase = WritePhase::WritingWithPending;
                WriteDecision::Deferred
            }
        }
    }

    /// The in-flight write completed, successfully or not.
    pub fn write_finished(&mut self) -> WriteDecision {
        match self.phase {
            WritePhase::WritingWithPending if !self.closed => {
                self.phase = WritePhase::Writing;
                WriteDecision::Start
            }
            WritePhase::Writing | WritePhase::WritingWithPending => {
                self.phase = WritePhase::Idle;
                WriteDecision::Done
            }
            WritePhase::Idle => {
                warn!("write completion reported while no write was in flight");
                WriteDecision::Done
            }
        }
    }

    /// Stop accepting requests ahead of the final flush. Returns whether a debounce timer was
    /// armed and must be cancelled.
    pub fn close(&mut self) -> bool {
        self.closed = true;
        std::mem::take(&mut self.debounce_armed)
    }
}
