use std::char::REPLACEMENT_CHARACTER;

/// Incremental UTF-8 decoder for chunked response bodies.
///
/// A multi-byte character split across two segments is held back until the
/// rest of its bytes arrive, so every returned fragment is whole text.
/// Malformed sequences decode to U+FFFD instead of failing the stream.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, segment: &[u8]) -> String {
        let input = if self.pending.is_empty() {
            segment.to_vec()
        } else {
            let mut input = std::mem::take(&mut self.pending);
            input.extend_from_slice(segment);
            input
        };

        let mut output = String::with_capacity(input.len());
        let mut rest = input.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    output.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, invalid) = rest.split_at(err.valid_up_to());
                    output.push_str(&String::from_utf8_lossy(valid));

                    match err.error_len() {
                        Some(len) => {
                            output.push(REPLACEMENT_CHARACTER);
                            rest = &invalid[len..];
                        }
                        None => {
                            // truncated sequence at the end of the segment
                            self.pending.extend_from_slice(invalid);
                            break;
                        }
                    }
                }
            }
        }

        output
    }

    /// Flushes a dangling partial sequence left by the final segment.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            REPLACEMENT_CHARACTER.to_string()
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
