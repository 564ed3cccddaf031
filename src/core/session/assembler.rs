//! Reassembly of streamed reply fragments into spoken turns.
//!
//! Generation providers stream replies as small text deltas and do not
//! reliably signal completion, so completion is inferred from quiet: the
//! owner restarts an inactivity timer on every delta and calls [`settle`]
//! when it expires. Callers therefore tolerate one settle window of tail
//! latency per spoken turn.
//!
//! [`settle`]: ReplyAssembler::settle

/// Accumulates reply deltas in arrival order until a quiet period closes
/// the turn.
#[derive(Debug, Default)]
pub struct ReplyAssembler {
    buffer: String,
}

impl ReplyAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one delta. The owner restarts the settle timer after each push.
    pub fn push(&mut self, delta: &str) {
        self.buffer.push_str(delta);
    }

    /// Settle-timer expiry path.
    ///
    /// Returns the accumulated reply when it has visible content, clearing
    /// the buffer either way. Whitespace-only accumulations are discarded
    /// rather than surfaced as a spoken turn.
    pub fn settle(&mut self) -> Option<String> {
        if self.buffer.trim().is_empty() {
            self.buffer.clear();
            return None;
        }
        Some(std::mem::take(&mut self.buffer))
    }

    /// Drop any partial accumulation, e.g. after a failed generation call.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deltas_join_in_arrival_order() {
        let mut assembler = ReplyAssembler::new();
        assembler.push("Hola");
        assembler.push(" mundo");
        assert_eq!(assembler.settle().as_deref(), Some("Hola mundo"));
    }

    #[test]
    fn settle_fires_once_per_accumulation() {
        let mut assembler = ReplyAssembler::new();
        assembler.push("Hola");
        assert!(assembler.settle().is_some());
        assert_eq!(assembler.settle(), None);
    }

    #[test]
    fn empty_buffer_never_settles() {
        let mut assembler = ReplyAssembler::new();
        assert_eq!(assembler.settle(), None);
    }

    #[test]
    fn whitespace_only_is_discarded() {
        let mut assembler = ReplyAssembler::new();
        assembler.push("  \n ");
        assert_eq!(assembler.settle(), None);
        assert!(assembler.is_empty());
    }

    #[test]
    fn clear_drops_partial_reply() {
        let mut assembler = ReplyAssembler::new();
        assembler.push("a medias");
        assembler.clear();
        assert!(assembler.is_empty());
        assert_eq!(assembler.settle(), None);
    }

    #[test]
    fn accumulation_resumes_after_settle() {
        let mut assembler = ReplyAssembler::new();
        assembler.push("primera");
        assert_eq!(assembler.settle().as_deref(), Some("primera"));

        assembler.push("segunda");
        assert_eq!(assembler.settle().as_deref(), Some("segunda"));
    }
}
