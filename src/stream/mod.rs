//! Stream emitter: extracts the answer block from a token stream.
//!
//! A small state machine looks for `ANSWER_START`, emits the content that
//! follows in ordered, rate-limited chunks, and stops at `ANSWER_END`.
//! Buffering flushes on size or time, whichever comes first, and the event
//! count is hard-capped.

use std::time::Instant;

use crate::config::StreamSettings;
use crate::llm::overflow::{ANSWER_END, ANSWER_START};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Seeking,
    Emitting,
    Done,
}

/// Fallback text emitted once when the stream finishes without a marker.
const NO_ANSWER_FALLBACK: &str = "No answer block was produced.";

/// Incremental extractor of the `ANSWER_START`/`ANSWER_END` block.
pub struct AnswerStreamEmitter {
    config: StreamSettings,
    state: State,
    /// Text seen while seeking the start marker
    seek_buffer: String,
    /// Emitted-content buffer awaiting flush
    out_buffer: String,
    /// Tail held back to avoid splitting the end marker
    hold_back: String,
    events_emitted: usize,
    last_flush: Instant,
    found_start: bool,
}

impl AnswerStreamEmitter {
    pub fn new(config: StreamSettings) -> Self {
        Self {
            config,
            state: State::Seeking,
            seek_buffer: String::new(),
            out_buffer: String::new(),
            hold_back: String::new(),
            events_emitted: 0,
            last_flush: Instant::now(),
            found_start: false,
        }
    }

    /// Feed a token chunk; returns any chunks ready to emit, in order.
    pub fn push(&mut self, tokens: &str) -> Vec<String> {
        let mut out = Vec::new();
        if self.state == State::Done {
            return out;
        }

        let mut incoming = tokens;
        if self.state == State::Seeking {
            self.seek_buffer.push_str(incoming);
            if let Some(pos) = self.seek_buffer.find(ANSWER_START) {
                let after = self.seek_buffer[pos + ANSWER_START.len()..].to_string();
                self.seek_buffer.clear();
                self.state = State::Emitting;
                self.found_start = true;
                self.hold_back = after;
                incoming = "";
            } else {
                // Keep only enough tail to detect a split marker.
                let keep = ANSWER_START.len().saturating_sub(1);
                if self.seek_buffer.len() > keep * 4 {
                    let mut cut = self.seek_buffer.len() - keep;
                    while cut > 0 && !self.seek_buffer.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    self.seek_buffer.drain(..cut);
                }
                return out;
            }
        }

        if self.state == State::Emitting {
            self.hold_back.push_str(incoming);
            if let Some(pos) = self.hold_back.find(ANSWER_END) {
                let content: String = self.hold_back[..pos].to_string();
                self.out_buffer.push_str(&content);
                self.hold_back.clear();
                self.state = State::Done;
                self.drain_into(&mut out, true);
                return out;
            }
            // Move all but a marker-sized tail into the out buffer.
            let keep = ANSWER_END.len().saturating_sub(1);
            if self.hold_back.len() > keep {
                let mut cut = self.hold_back.len() - keep;
                while cut > 0 && !self.hold_back.is_char_boundary(cut) {
                    cut -= 1;
                }
                let ready: String = self.hold_back.drain(..cut).collect();
                self.out_buffer.push_str(&ready);
            }
            self.drain_into(&mut out, false);
        }
        out
    }

    /// Finish the stream. Flushes pending content; when no start marker was
    /// ever seen, emits the fallback once.
    pub fn finalize(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        match self.state {
            State::Done => {}
            State::Emitting => {
                self.out_buffer.push_str(&self.hold_back);
                self.hold_back.clear();
                self.state = State::Done;
                self.drain_into(&mut out, true);
            }
            State::Seeking => {
                self.state = State::Done;
                if !self.found_start && self.events_emitted < self.config.max_events {
                    out.push(NO_ANSWER_FALLBACK.to_string());
                    self.events_emitted += 1;
                }
            }
        }
        out
    }

    /// True once the end marker was consumed or the stream finalized.
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    fn drain_into(&mut self, out: &mut Vec<String>, force: bool) {
        loop {
            if self.events_emitted >= self.config.max_events {
                self.out_buffer.clear();
                return;
            }
            let due = force
                || self.out_buffer.len() >= self.config.chunk_max_chars
                || self.last_flush.elapsed().as_millis() as u64 >= self.config.flush_ms;
            if !due || self.out_buffer.is_empty() {
                return;
            }
            let take = self.out_buffer.len().min(self.config.chunk_max_chars);
            // Respect char boundaries.
            let mut cut = take;
            while cut < self.out_buffer.len() && !self.out_buffer.is_char_boundary(cut) {
                cut += 1;
            }
            let chunk: String = self.out_buffer.drain(..cut).collect();
            out.push(chunk);
            self.events_emitted += 1;
            self.last_flush = Instant::now();
            if !force {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(chunk_max: usize, max_events: usize) -> StreamSettings {
        StreamSettings {
            chunk_max_chars: chunk_max,
            flush_ms: 0,
            max_events,
        }
    }

    #[test]
    fn extracts_block_across_chunk_boundaries() {
        let mut emitter = AnswerStreamEmitter::new(settings(1024, 64));
        let mut got = String::new();
        for part in ["preamble ANSWER_ST", "ART\nHello, ", "world\nANSW", "ER_END trailing"] {
            for chunk in emitter.push(part) {
                got.push_str(&chunk);
            }
        }
        for chunk in emitter.finalize() {
            got.push_str(&chunk);
        }
        assert_eq!(got.trim(), "Hello, world");
        assert!(emitter.is_done());
    }

    #[test]
    fn chunks_are_emitted_in_order() {
        let mut emitter = AnswerStreamEmitter::new(settings(4, 64));
        let mut chunks = Vec::new();
        chunks.extend(emitter.push("ANSWER_START0123456789ANSWER_END"));
        chunks.extend(emitter.finalize());
        let joined = chunks.concat();
        assert_eq!(joined, "0123456789");
    }

    #[test]
    fn event_cap_stops_emission() {
        let mut emitter = AnswerStreamEmitter::new(settings(1, 3));
        let mut chunks = Vec::new();
        chunks.extend(emitter.push("ANSWER_STARTabcdefghANSWER_END"));
        chunks.extend(emitter.finalize());
        assert!(chunks.len() <= 3);
    }

    #[test]
    fn fallback_emitted_once_without_marker() {
        let mut emitter = AnswerStreamEmitter::new(settings(16, 8));
        assert!(emitter.push("no markers here at all").is_empty());
        let final_chunks = emitter.finalize();
        assert_eq!(final_chunks, vec![NO_ANSWER_FALLBACK.to_string()]);
        assert!(emitter.finalize().is_empty());
    }

    #[test]
    fn missing_end_marker_flushes_on_finalize() {
        let mut emitter = AnswerStreamEmitter::new(settings(1024, 8));
        emitter.push("ANSWER_STARTpartial content");
        let chunks = emitter.finalize();
        assert_eq!(chunks.concat(), "partial content");
    }
}
