//! Storage for the NMEA text datagrams interleaved with the sample data.
//!
//! The sentences are kept verbatim with their millisecond UTC timestamps;
//! assembling multi-sentence messages or interpreting talkers is left to
//! consumers.

/// An append-only buffer of `(timestamp, sentence)` pairs in ingestion
/// order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NmeaBuffer {
    times: Vec<i64>,
    sentences: Vec<String>,
}

impl NmeaBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one sentence with its millisecond UTC timestamp.
    pub fn add_datagram(&mut self, timestamp: i64, sentence: &str) {
        self.times.push(timestamp);
        self.sentences.push(sentence.to_string());
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[i64] {
        &self.times
    }

    pub fn sentences(&self) -> &[String] {
        &self.sentences
    }

    /// Get one entry by position.
    pub fn get(&self, idx: usize) -> Option<(i64, &str)> {
        let time = self.times.get(idx)?;
        let sentence = self.sentences.get(idx)?;
        Some((*time, sentence))
    }

    /// Release any over-allocated capacity after reading finishes.
    pub fn trim(&mut self) {
        self.times.shrink_to_fit();
        self.sentences.shrink_to_fit();
    }
}
