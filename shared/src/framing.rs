// Newline-delimited framing over a TCP byte stream.
//
// TCP does not preserve message boundaries: one read may return half a
// message or several messages glued together. Every payload is therefore
// written with a trailing `\n`, and the receiving side feeds whatever it read
// into a `FrameDecoder`, which hands back complete frames only.
//
// `MAX_FRAME_LEN` bounds how much undelimited data is buffered. The largest
// legitimate payload is `CLIENT_DISCONNECTING` or two i32s, so anything close
// to the limit is garbage.

use crate::error::SessionError;
use crate::protocol::Message;

pub const FRAME_DELIMITER: u8 = b'\n';

/// Upper bound on buffered bytes without a delimiter.
pub const MAX_FRAME_LEN: usize = 1024;

/// Encodes a message as a single frame: payload followed by `\n`.
pub fn encode_frame(message: &Message) -> Vec<u8> {
    let mut frame = message.encode().into_bytes();
    frame.push(FRAME_DELIMITER);
    frame
}

/// Reassembles frames from arbitrarily split stream chunks.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_frame_len: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_frame_len(MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_len,
        }
    }

    /// Appends freshly received bytes.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Pops the next complete frame, if any.
    ///
    /// Empty frames are skipped and a trailing `\r` is stripped. Non-ASCII
    /// bytes are replaced rather than rejected; the protocol layer will refuse
    /// the payload anyway.
    pub fn next_frame(&mut self) -> Result<Option<String>, SessionError> {
        loop {
            let Some(end) = self.buffer.iter().position(|b| *b == FRAME_DELIMITER) else {
                if self.buffer.len() > self.max_frame_len {
                    return Err(SessionError::FrameTooLong {
                        max: self.max_frame_len,
                    });
                }
                return Ok(None);
            };

            let mut frame: Vec<u8> = self.buffer.drain(..=end).collect();
            frame.pop();
            if frame.last() == Some(&b'\r') {
                frame.pop();
            }

            if frame.len() > self.max_frame_len {
                return Err(SessionError::FrameTooLong {
                    max: self.max_frame_len,
                });
            }
            if frame.is_empty() {
                continue;
            }

            return Ok(Some(String::from_utf8_lossy(&frame).into_owned()));
        }
    }

    /// Number of buffered bytes not yet returned as a frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Position;

    fn drain(decoder: &mut FrameDecoder) -> Vec<String> {
        let mut frames = Vec::new();
        while let Some(frame) = decoder.next_frame().unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_encode_frame_appends_delimiter() {
        let frame = encode_frame(&Message::Position(Position::new(30, 20)));
        assert_eq!(frame, b"30,20\n".to_vec());
    }

    #[test]
    fn test_partial_frame_is_held_back() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"30,");
        assert_eq!(decoder.next_frame().unwrap(), None);
        assert_eq!(decoder.pending(), 3);

        decoder.extend(b"20\n");
        assert_eq!(drain(&mut decoder), vec!["30,20"]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_coalesced_frames_are_split() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"30,20\nHEARTBEAT\n40,20\nCLIENT_");
        assert_eq!(drain(&mut decoder), vec!["30,20", "HEARTBEAT", "40,20"]);

        decoder.extend(b"CONNECTED\r\n");
        assert_eq!(drain(&mut decoder), vec!["CLIENT_CONNECTED"]);
    }

    #[test]
    fn test_empty_frames_are_skipped() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"\n\r\n\nHEARTBEAT\n\n");
        assert_eq!(drain(&mut decoder), vec!["HEARTBEAT"]);
    }

    #[test]
    fn test_oversized_frame_is_rejected() {
        let mut decoder = FrameDecoder::with_max_frame_len(8);
        decoder.extend(b"123456789");
        assert!(matches!(
            decoder.next_frame(),
            Err(SessionError::FrameTooLong { max: 8 })
        ));

        let mut decoder = FrameDecoder::with_max_frame_len(8);
        decoder.extend(b"0123456789\n");
        assert!(decoder.next_frame().is_err());
    }
}
