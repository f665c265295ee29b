//! Line-oriented decoding of streamed HTTP bodies (SSE and NDJSON)

use bytes::{Buf, BytesMut};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;

use crate::error::{Error, Result};

use super::completion::DeltaStream;

/// What a single decoded line means for the delta stream
#[derive(Debug)]
pub enum LineOutcome {
    /// Text to hand to the caller
    Delta(String),
    /// Keep-alive, comment, metadata
    Skip,
    /// Terminator: the completion finished normally
    Done,
    /// Provider reported an error in-band
    Failed(Error),
}

/// Accumulates bytes and yields complete lines
///
/// Network chunks may end mid-line (or mid-UTF-8 sequence); only bytes up to
/// the last newline are decoded.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: BytesMut,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete line
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line = self.buf.split_to(pos);
            self.buf.advance(1);
            lines.push(decode_line(&line));
        }
        lines
    }

    /// Take whatever remains after the body ends
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = self.buf.split();
        let line = decode_line(&rest);
        if line.trim().is_empty() {
            None
        } else {
            Some(line)
        }
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.trim_end_matches('\r').to_string()
}

struct DecodeState<F> {
    body: BoxStream<'static, Result<bytes::Bytes>>,
    buffer: LineBuffer,
    pending: VecDeque<String>,
    parse: F,
    body_ended: bool,
    finished: bool,
}

/// Turn a streamed body into a [`DeltaStream`] using a per-line parser
///
/// A body that ends without the parser reporting `Done` yields a final
/// provider error, so truncated responses are never mistaken for complete ones.
pub fn decode_deltas<F>(body: BoxStream<'static, Result<bytes::Bytes>>, parse: F) -> DeltaStream
where
    F: FnMut(&str) -> LineOutcome + Send + 'static,
{
    let state = DecodeState {
        body,
        buffer: LineBuffer::new(),
        pending: VecDeque::new(),
        parse,
        body_ended: false,
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if st.finished {
                return None;
            }

            if let Some(line) = st.pending.pop_front() {
                match (st.parse)(&line) {
                    LineOutcome::Delta(text) if !text.is_empty() => return Some((Ok(text), st)),
                    LineOutcome::Delta(_) | LineOutcome::Skip => continue,
                    LineOutcome::Done => {
                        st.finished = true;
                        return None;
                    }
                    LineOutcome::Failed(err) => {
                        st.finished = true;
                        return Some((Err(err), st));
                    }
                }
            }

            if st.body_ended {
                st.finished = true;
                return Some((
                    Err(Error::provider(
                        "chat stream",
                        "stream ended before the completion finished",
                    )),
                    st,
                ));
            }

            match st.body.next().await {
                Some(Ok(chunk)) => {
                    let lines = st.buffer.push(&chunk);
                    st.pending.extend(lines);
                }
                Some(Err(err)) => {
                    st.finished = true;
                    return Some((Err(err), st));
                }
                None => {
                    st.body_ended = true;
                    if let Some(rest) = st.buffer.finish() {
                        st.pending.push_back(rest);
                    }
                }
            }
        }
    })
    .boxed()
}

/// Adapt a `reqwest` body stream to the decoder's input
pub fn response_body(response: reqwest::Response) -> BoxStream<'static, Result<bytes::Bytes>> {
    response
        .bytes_stream()
        .map(|chunk| chunk.map_err(|e| Error::provider("chat stream", e.to_string())))
        .boxed()
}
