//! Re-framing of the upstream SSE body into a flat text stream.
//!
//! The work is split in three layers so each one can be tested alone:
//! [`Utf8Decoder`] turns arbitrarily cut byte chunks into text, [`LineBuffer`]
//! turns that text into complete lines, and [`parse_line`] maps one line to a
//! [`Frame`]. [`reframe`] wires them to a live byte stream.

use crate::llm::chat::{ BoxError, ByteStream };
use axum::body::Bytes;
use futures::{ Stream, StreamExt };
use log::{ debug, warn };
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub const DATA_PREFIX: &str = "data: ";
pub const DONE_SENTINEL: &str = "[DONE]";
/// Upper bound on a buffered line that has not seen its newline yet.
pub const MAX_PARTIAL_LINE: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Non-empty text to forward as-is.
    Delta(String),
    /// Upstream signalled the end of the completion.
    Done,
    /// Comment, keep-alive, empty delta or malformed payload.
    Skip,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Option<Vec<StreamChoice>>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

pub fn parse_line(line: &str) -> Frame {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Frame::Skip;
    };

    if payload == DONE_SENTINEL {
        return Frame::Done;
    }

    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) =>
            chunk.choices
                .and_then(|choices| choices.into_iter().next())
                .and_then(|choice| choice.delta)
                .and_then(|delta| delta.content)
                .filter(|content| !content.is_empty())
                .map(Frame::Delta)
                .unwrap_or(Frame::Skip),
        Err(e) => {
            debug!("Skipping unparseable frame ({}): {}", e, payload);
            Frame::Skip
        }
    }
}

/// Incremental UTF-8 decoder. Bytes of a character cut at a chunk boundary
/// are held back until the next chunk completes them.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut start = 0;
        loop {
            match std::str::from_utf8(&bytes[start..]) {
                Ok(text) => {
                    out.push_str(text);
                    start = bytes.len();
                    break;
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&bytes[start..valid_end]));
                    match e.error_len() {
                        Some(invalid_len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + invalid_len;
                        }
                        None => {
                            // incomplete sequence at the end, wait for more bytes
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = bytes[start..].to_vec();
        out
    }

    /// Flushes a dangling partial character as U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }
}

/// Holds the trailing partial line between chunks, so a frame split across
/// two network reads is reassembled instead of dropped.
#[derive(Debug, Default)]
pub struct LineBuffer {
    partial: String,
    // set while skipping the rest of an oversized line
    discarding: bool,
}

impl LineBuffer {
    /// Returns every line completed by `text`, without terminators. A line
    /// longer than [`MAX_PARTIAL_LINE`] is discarded up to its newline.
    pub fn push(&mut self, mut text: &str) -> Vec<String> {
        if self.discarding {
            let Some(newline) = text.find('\n') else {
                return Vec::new();
            };
            self.discarding = false;
            text = &text[newline + 1..];
        }

        let Some(last_newline) = text.rfind('\n') else {
            if self.partial.len() + text.len() > MAX_PARTIAL_LINE {
                warn!("Dropping unterminated upstream line over {} bytes", MAX_PARTIAL_LINE);
                self.partial.clear();
                self.discarding = true;
            } else {
                self.partial.push_str(text);
            }
            return Vec::new();
        };

        let split_at = self.partial.len() + last_newline + 1;
        self.partial.push_str(text);
        let rest = self.partial.split_off(split_at);
        let complete = std::mem::replace(&mut self.partial, rest);
        complete.lines().map(str::to_string).collect()
    }

    pub fn finish(&mut self) -> Option<String> {
        self.discarding = false;
        if self.partial.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.partial))
        }
    }
}

/// Synchronous core of [`reframe`]: bytes in, frames out.
#[derive(Debug, Default)]
pub struct Reframer {
    decoder: Utf8Decoder,
    lines: LineBuffer,
    done: bool,
}

impl Reframer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames completed by `chunk`. After a [`Frame::Done`] nothing else is
    /// returned, for this chunk or any later one.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        if self.done {
            return Vec::new();
        }
        let text = self.decoder.decode(chunk);
        let lines = self.lines.push(&text);
        self.collect(lines)
    }

    /// Frames left over when upstream ends without a final newline.
    pub fn finish(&mut self) -> Vec<Frame> {
        if self.done {
            return Vec::new();
        }
        let tail = self.decoder.finish();
        let mut lines = self.lines.push(&tail);
        lines.extend(self.lines.finish());
        self.collect(lines)
    }

    fn collect(&mut self, lines: Vec<String>) -> Vec<Frame> {
        let mut frames = Vec::new();
        for line in lines {
            match parse_line(&line) {
                Frame::Skip => {}
                Frame::Done => {
                    self.done = true;
                    frames.push(Frame::Done);
                    break;
                }
                delta => frames.push(delta),
            }
        }
        frames
    }
}

/// Re-emits every upstream delta as its own output chunk, ending the output
/// at the sentinel. Upstream read errors are forwarded and end the stream.
pub fn reframe<S, E>(upstream: S) -> ByteStream
    where S: Stream<Item = Result<Bytes, E>> + Send + 'static, E: Into<BoxError> + Send + 'static
{
    let (tx, rx) = mpsc::channel::<Result<Bytes, BoxError>>(32);

    tokio::spawn(async move {
        let mut upstream = Box::pin(upstream);
        let mut reframer = Reframer::new();

        while let Some(chunk) = upstream.next().await {
            let frames = match chunk {
                Ok(bytes) => reframer.feed(&bytes),
                Err(e) => {
                    let _ = tx.send(Err(e.into())).await;
                    return;
                }
            };
            for frame in frames {
                match frame {
                    Frame::Delta(text) => {
                        if tx.send(Ok(Bytes::from(text))).await.is_err() {
                            debug!("Downstream closed, stopping relay pump");
                            return;
                        }
                    }
                    Frame::Done => {
                        return;
                    }
                    Frame::Skip => {}
                }
            }
        }

        for frame in reframer.finish() {
            if let Frame::Delta(text) = frame {
                if tx.send(Ok(Bytes::from(text))).await.is_err() {
                    return;
                }
            }
        }
    });

    Box::pin(ReceiverStream::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn delta_line(text: &str) -> String {
        format!("data: {{\"choices\":[{{\"delta\":{{\"content\":\"{}\"}}}}]}}\n", text)
    }

    async fn collect_output(stream: ByteStream) -> Vec<u8> {
        let chunks: Vec<_> = stream.collect().await;
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    fn upstream(chunks: Vec<Vec<u8>>) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c))))
    }

    #[test]
    fn parse_line_extracts_delta() {
        assert_eq!(
            parse_line(r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#),
            Frame::Delta("Hel".into())
        );
        assert_eq!(parse_line("data: [DONE]"), Frame::Done);
        assert_eq!(parse_line("data: [DONE]\r"), Frame::Done);
    }

    #[test]
    fn parse_line_skips_noise() {
        assert_eq!(parse_line(""), Frame::Skip);
        assert_eq!(parse_line(": OPENROUTER PROCESSING"), Frame::Skip);
        assert_eq!(parse_line("event: message"), Frame::Skip);
        assert_eq!(parse_line("data: {not json}"), Frame::Skip);
        assert_eq!(parse_line("data:[DONE]"), Frame::Skip);
        assert_eq!(parse_line(r#"data: {"choices":[]}"#), Frame::Skip);
        assert_eq!(parse_line(r#"data: {"choices":[{"delta":{}}]}"#), Frame::Skip);
        assert_eq!(parse_line(r#"data: {"choices":[{"delta":{"content":""}}]}"#), Frame::Skip);
        assert_eq!(
            parse_line(r#"data: {"choices":[{"delta":{"role":"assistant","content":null}}]}"#),
            Frame::Skip
        );
    }

    #[test]
    fn parse_line_reads_only_first_choice() {
        let line =
            r#"data: {"id":"gen-1","choices":[{"index":0,"delta":{"content":"a"}},{"index":1,"delta":{"content":"b"}}]}"#;
        assert_eq!(parse_line(line), Frame::Delta("a".into()));
    }

    #[test]
    fn decoder_joins_split_multibyte_char() {
        let bytes = "é".as_bytes();
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(&bytes[..1]), "");
        assert_eq!(decoder.decode(&bytes[1..]), "é");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn decoder_handles_four_byte_char_over_three_chunks() {
        let bytes = "a🌾b".as_bytes();
        let mut decoder = Utf8Decoder::default();
        let mut out = String::new();
        out.push_str(&decoder.decode(&bytes[..2]));
        out.push_str(&decoder.decode(&bytes[2..4]));
        out.push_str(&decoder.decode(&bytes[4..]));
        assert_eq!(out, "a🌾b");
    }

    #[test]
    fn decoder_replaces_invalid_bytes_and_keeps_going() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(&[b'a', 0xff, b'b']), "a\u{FFFD}b");
        assert_eq!(decoder.decode(&[0xe2, 0x82]), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn line_buffer_keeps_partial_line() {
        let mut lines = LineBuffer::default();
        assert!(lines.push("data: {\"cho").is_empty());
        assert_eq!(lines.push("ices\":[]}\ndata: x"), vec!["data: {\"choices\":[]}".to_string()]);
        assert_eq!(lines.push("\r\n\n"), vec!["data: x".to_string(), String::new()]);
        assert_eq!(lines.finish(), None);
        lines.push("tail");
        assert_eq!(lines.finish(), Some("tail".to_string()));
    }

    #[test]
    fn line_buffer_drops_runaway_partial_line() {
        let mut lines = LineBuffer::default();
        let chunk = "x".repeat(MAX_PARTIAL_LINE / 2 + 1);
        assert!(lines.push(&chunk).is_empty());
        assert!(lines.push(&chunk).is_empty());
        assert!(lines.push("still the same line").is_empty());
        assert_eq!(lines.push("end\ndata: [DONE]\n"), vec!["data: [DONE]".to_string()]);
        assert_eq!(lines.finish(), None);
    }

    #[test]
    fn reframer_stops_at_sentinel() {
        let mut reframer = Reframer::new();
        let input = format!("{}data: [DONE]\n{}", delta_line("a"), delta_line("b"));
        assert_eq!(reframer.feed(input.as_bytes()), vec![Frame::Delta("a".into()), Frame::Done]);
        assert!(reframer.feed(delta_line("c").as_bytes()).is_empty());
        assert!(reframer.finish().is_empty());
    }

    #[test]
    fn reframer_flushes_unterminated_last_line() {
        let mut reframer = Reframer::new();
        let line = delta_line("end");
        let unterminated = line.trim_end_matches('\n');
        assert!(reframer.feed(unterminated.as_bytes()).is_empty());
        assert_eq!(reframer.finish(), vec![Frame::Delta("end".into())]);
    }

    #[tokio::test]
    async fn reframe_emits_hello_then_closes() {
        let chunks = vec![
            delta_line("Hel").into_bytes(),
            delta_line("lo").into_bytes(),
            b"data: [DONE]\n".to_vec(),
            delta_line("ignored").into_bytes()
        ];
        let out = collect_output(reframe(upstream(chunks))).await;
        assert_eq!(out, b"Hello");
    }

    #[tokio::test]
    async fn reframe_forwards_each_delta_as_its_own_chunk() {
        let chunks = vec![format!("{}{}", delta_line("Hel"), delta_line("lo")).into_bytes()];
        let pieces: Vec<_> = reframe(upstream(chunks))
            .map(|c| c.unwrap())
            .collect().await;
        assert_eq!(pieces, vec![Bytes::from("Hel"), Bytes::from("lo")]);
    }

    #[tokio::test]
    async fn reframe_skips_malformed_frames() {
        let chunks = vec![
            delta_line("Hel").into_bytes(),
            b"data: {not json}\n".to_vec(),
            b": keep-alive\n\n".to_vec(),
            delta_line("lo").into_bytes(),
            b"data: [DONE]\n".to_vec()
        ];
        let out = collect_output(reframe(upstream(chunks))).await;
        assert_eq!(out, b"Hello");
    }

    #[tokio::test]
    async fn reframe_reassembles_split_frames_and_characters() {
        let full = format!("{}{}data: [DONE]\n", delta_line("Olá"), delta_line(" mundo"));
        let bytes = full.as_bytes();
        // cut inside the two-byte 'á' and inside the second frame
        let cut_char = full.find('á').unwrap() + 1;
        let cut_frame = full.find(" mundo").unwrap();
        let chunks = vec![
            bytes[..cut_char].to_vec(),
            bytes[cut_char..cut_frame].to_vec(),
            bytes[cut_frame..].to_vec()
        ];
        let out = collect_output(reframe(upstream(chunks))).await;
        assert_eq!(String::from_utf8(out).unwrap(), "Olá mundo");
    }

    #[tokio::test]
    async fn reframe_without_sentinel_ends_with_upstream() {
        let chunks = vec![delta_line("partial").into_bytes()];
        let out = collect_output(reframe(upstream(chunks))).await;
        assert_eq!(out, b"partial");
    }

    #[tokio::test]
    async fn reframe_forwards_upstream_errors() {
        let items: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from(delta_line("a"))),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))
        ];
        let results: Vec<_> = reframe(stream::iter(items)).collect().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), &Bytes::from("a"));
        assert!(results[1].is_err());
    }
}
