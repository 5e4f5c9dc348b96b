//! Incremental UTF-8 decoding for streamed response bodies.
//!
//! Network chunks do not respect character boundaries: a multi-byte character
//! can arrive split across two reads. [`Utf8StreamDecoder`] keeps the
//! incomplete tail of one chunk and completes it with the head of the next.
//!
//! Invalid byte sequences are replaced with U+FFFD, the same way a
//! non-fatal WHATWG `TextDecoder` behaves in streaming mode.

/// Stateful UTF-8 decoder fed one chunk at a time.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    /// Create a decoder with nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes`, more data may follow.
    ///
    /// Returns every character completed so far. An incomplete sequence at
    /// the end of the input is held back until the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut out = String::with_capacity(self.pending.len());
        let mut start = 0;

        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(text) => {
                    out.push_str(text);
                    start = self.pending.len();
                    break;
                }
                Err(err) => {
                    let valid_end = start + err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[start..valid_end]));

                    match err.error_len() {
                        Some(invalid_len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + invalid_len;
                        }
                        None => {
                            // Truncated sequence; wait for more bytes.
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..start);
        out
    }

    /// Flush the decoder at end of stream.
    ///
    /// A dangling incomplete sequence becomes one U+FFFD. The decoder can be
    /// reused afterwards.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        self.pending.clear();
        char::REPLACEMENT_CHARACTER.to_string()
    }

    /// Number of bytes held back waiting for the rest of a character.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn decode_chunks(chunks: &[&[u8]]) -> String {
        let mut decoder = Utf8StreamDecoder::new();
        let mut out = String::new();
        for chunk in chunks {
            out.push_str(&decoder.feed(chunk));
        }
        out.push_str(&decoder.finish());
        out
    }

    #[test]
    fn test_ascii_passes_through() {
        let mut decoder = Utf8StreamDecoder::new();
        assert_eq!(decoder.feed(b"Hel"), "Hel");
        assert_eq!(decoder.feed(b"lo"), "lo");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_multibyte_split_at_chunk_boundary() {
        let text = "café 👋";
        let bytes = text.as_bytes();
        // 'é' is two bytes starting at index 3
        let (a, b) = bytes.split_at(4);

        let mut decoder = Utf8StreamDecoder::new();
        assert_eq!(decoder.feed(a), "caf");
        assert_eq!(decoder.pending_len(), 1);
        assert_eq!(decoder.feed(b), "é 👋");
        assert_eq!(decoder.finish(), "");

        assert_eq!(decode_chunks(&[a, b]), decode_chunks(&[bytes]));
    }

    #[test]
    fn test_four_byte_char_one_byte_at_a_time() {
        let bytes = "👋".as_bytes();
        let mut decoder = Utf8StreamDecoder::new();
        assert_eq!(decoder.feed(&bytes[..1]), "");
        assert_eq!(decoder.feed(&bytes[1..2]), "");
        assert_eq!(decoder.feed(&bytes[2..3]), "");
        assert_eq!(decoder.feed(&bytes[3..]), "👋");
    }

    #[test]
    fn test_invalid_bytes_are_replaced() {
        assert_eq!(decode_chunks(&[b"a\xffb"]), "a\u{FFFD}b");
    }

    #[test]
    fn test_truncated_tail_flushes_as_replacement() {
        let bytes = "é".as_bytes();
        let mut decoder = Utf8StreamDecoder::new();
        assert_eq!(decoder.feed(&bytes[..1]), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
        // reusable after finish
        assert_eq!(decoder.feed(b"ok"), "ok");
    }

    proptest! {
        #[test]
        fn split_anywhere_decodes_identically(text in "\\PC{0,40}", cut in 0usize..200) {
            let bytes = text.as_bytes();
            let cut = cut.min(bytes.len());
            let (a, b) = bytes.split_at(cut);
            prop_assert_eq!(decode_chunks(&[a, b]), text.clone());
        }

        #[test]
        fn byte_by_byte_decodes_identically(text in "\\PC{0,40}") {
            let chunks: Vec<&[u8]> = text.as_bytes().chunks(1).collect();
            prop_assert_eq!(decode_chunks(&chunks), text.clone());
        }
    }
}
