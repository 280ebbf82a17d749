//! Streaming UTF-8 validation for WebSocket text messages (RFC 6455).
//!
//! Uses a Björn Höhrmann-style DFA over raw bytes. The state survives
//! across fragment boundaries, so a multi-byte sequence split between
//! frames validates without buffering partial sequences. Codepoints are
//! never decoded.

/// DFA state: all input so far is a complete, valid UTF-8 sequence.
pub const UTF8_ACCEPT: u8 = 0;

/// DFA state: the input can never become valid UTF-8.
pub const UTF8_REJECT: u8 = 1;

/// Maps each byte to its character class.
#[rustfmt::skip]
static UTF8_CLASS: [u8; 256] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 00..0f
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 10..1f
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 20..2f
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 30..3f
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 40..4f
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 50..5f
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 60..6f
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 70..7f
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, // 80..8f
    9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, // 90..9f
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, // a0..af
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, // b0..bf
    8, 8, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, // c0..cf
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, // d0..df
   10, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 4, 3, 3, // e0..ef
   11, 6, 6, 6, 5, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, // f0..ff
];

/// Transition table: `state * 12 + class` yields the next state.
///
/// State 0 is ACCEPT, state 1 is REJECT, states 2..=8 track partially
/// consumed multi-byte sequences (including the E0/ED/F0/F4 rows that
/// exclude overlong encodings and surrogates).
#[rustfmt::skip]
static UTF8_TRANSITION: [u8; 108] = [
    0, 1, 2, 3, 5, 8, 7, 1, 1, 1, 4, 6, // state 0: accept
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, // state 1: reject
    1, 0, 1, 1, 1, 1, 1, 0, 1, 0, 1, 1, // state 2: one continuation left
    1, 2, 1, 1, 1, 1, 1, 2, 1, 2, 1, 1, // state 3: two continuations left
    1, 1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, // state 4: after E0 (A0..BF only)
    1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, 1, // state 5: after ED (80..9F only)
    1, 1, 1, 1, 1, 1, 1, 3, 1, 3, 1, 1, // state 6: after F0 (90..BF only)
    1, 3, 1, 1, 1, 1, 1, 3, 1, 3, 1, 1, // state 7: after F1..F3
    1, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, // state 8: after F4 (80..8F only)
];

/// Incremental UTF-8 validator for fragmented WebSocket messages.
///
/// The validator starts in [`UTF8_ACCEPT`]; a text message is valid iff
/// the state equals [`UTF8_ACCEPT`] again once the FIN-bearing fragment
/// has been fed through [`advance`](Self::advance).
#[derive(Debug, Clone)]
pub struct Utf8Validator {
    state: u8,
}

impl Default for Utf8Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Utf8Validator {
    /// Create a new validator in the ACCEPT state.
    #[must_use]
    pub fn new() -> Self {
        Self { state: UTF8_ACCEPT }
    }

    /// Feed a slice of payload bytes through the DFA.
    ///
    /// Returns the resulting state. Once [`UTF8_REJECT`] is reached the
    /// validator stays rejected until [`reset`](Self::reset).
    pub fn advance(&mut self, data: &[u8]) -> u8 {
        let mut state = self.state;
        for &byte in data {
            state = UTF8_TRANSITION[state as usize * 12 + UTF8_CLASS[byte as usize] as usize];
            if state == UTF8_REJECT {
                break;
            }
        }
        self.state = state;
        state
    }

    /// Current DFA state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> u8 {
        self.state
    }

    /// All bytes consumed so far form complete, valid sequences.
    #[inline]
    #[must_use]
    pub fn is_accept(&self) -> bool {
        self.state == UTF8_ACCEPT
    }

    /// The input is irrecoverably invalid.
    #[inline]
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.state == UTF8_REJECT
    }

    /// Reset to the ACCEPT state, discarding any partial sequence.
    pub fn reset(&mut self) {
        self.state = UTF8_ACCEPT;
    }
}

/// Validate that a complete byte slice is valid UTF-8.
#[must_use]
pub fn validate_utf8(data: &[u8]) -> bool {
    let mut validator = Utf8Validator::new();
    validator.advance(data);
    validator.is_accept()
}
