//! Transcript aggregation into finalized user utterances.
//!
//! The recognition provider streams interim and finalized transcript
//! segments. This component buffers finalized segments until the provider
//! signals an utterance boundary, and tells its owner when to arm the
//! forced-finalization timer for providers that under-report end of speech.

use tracing::debug;

use crate::core::recognition::RecognitionEvent;

/// What the owner should do with the utterance flush timer after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTimer {
    /// Leave the timer as it is.
    Unchanged,
    /// Cancel a pending timer.
    Cancel,
    /// Cancel a pending timer and arm a fresh one.
    Restart,
}

/// Result of feeding one recognition event through the aggregator.
#[derive(Debug, PartialEq, Eq)]
pub struct TranscriptOutcome {
    /// A finalized utterance ready to be dispatched, if one completed.
    pub utterance: Option<String>,
    /// Non-empty user speech was observed in this event. While the agent is
    /// speaking this is the trigger for an interruption request.
    pub voiced: bool,
    /// Flush-timer command for the owner.
    pub flush_timer: FlushTimer,
}

impl TranscriptOutcome {
    fn quiet() -> Self {
        Self {
            utterance: None,
            voiced: false,
            flush_timer: FlushTimer::Unchanged,
        }
    }
}

/// Buffers finalized transcript segments into one user utterance.
///
/// Segments are joined in arrival order with a trailing space each, matching
/// how the provider's finals read when concatenated. The buffer is non-empty
/// only between the first final of a turn and the flush that closes it.
#[derive(Debug, Default)]
pub struct TranscriptAggregator {
    pending: String,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one recognition event; purely synchronous state transition.
    pub fn on_event(&mut self, event: &RecognitionEvent) -> TranscriptOutcome {
        match event {
            // Onset notification only; the segment text arrives separately.
            RecognitionEvent::SpeechStarted => TranscriptOutcome::quiet(),

            RecognitionEvent::Interim { text } => TranscriptOutcome {
                utterance: None,
                voiced: !text.trim().is_empty(),
                flush_timer: FlushTimer::Unchanged,
            },

            RecognitionEvent::Final {
                text,
                is_end_of_speech,
            } => {
                let voiced = !text.trim().is_empty();
                if voiced {
                    self.pending.push_str(text);
                    self.pending.push(' ');
                }

                if *is_end_of_speech {
                    let utterance = self.drain();
                    TranscriptOutcome {
                        utterance,
                        voiced,
                        flush_timer: FlushTimer::Cancel,
                    }
                } else if !self.pending.is_empty() {
                    TranscriptOutcome {
                        utterance: None,
                        voiced,
                        flush_timer: FlushTimer::Restart,
                    }
                } else {
                    TranscriptOutcome {
                        utterance: None,
                        voiced,
                        flush_timer: FlushTimer::Cancel,
                    }
                }
            }
        }
    }

    /// Flush-timer expiry path: emit whatever accumulated, if anything.
    ///
    /// This is the forced-finalization fallback for providers that never
    /// send the end-of-speech boundary for a turn.
    pub fn force_flush(&mut self) -> Option<String> {
        let utterance = self.drain();
        if utterance.is_some() {
            debug!("transcript: forced utterance flush");
        }
        utterance
    }

    /// Discard any accumulated segments, e.g. when the agent begins a fresh
    /// speaking turn.
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn drain(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}
