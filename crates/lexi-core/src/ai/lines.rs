use futures_util::stream::{self, BoxStream, StreamExt};

use crate::error::{LexiError, Result};

/// Splits a streaming HTTP body into text lines. Both SSE and
/// newline-delimited JSON are framed this way.
pub(crate) fn body_lines(response: reqwest::Response) -> BoxStream<'static, Result<String>> {
    let bytes = response.bytes_stream().boxed();
    split_lines(bytes.map(|chunk| chunk.map(|b| b.to_vec()).map_err(LexiError::from)))
}

pub(crate) fn split_lines<S>(chunks: S) -> BoxStream<'static, Result<String>>
where
    S: stream::Stream<Item = Result<Vec<u8>>> + Send + 'static,
{
    let state = (chunks.boxed(), Vec::<u8>::new(), false);
    stream::unfold(state, |(mut chunks, mut buf, mut done)| async move {
        loop {
            if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                let text = String::from_utf8_lossy(&line)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                return Some((Ok(text), (chunks, buf, done)));
            }
            if done {
                if buf.is_empty() {
                    return None;
                }
                let text = String::from_utf8_lossy(&buf).trim_end().to_string();
                buf.clear();
                return Some((Ok(text), (chunks, buf, done)));
            }
            match chunks.next().await {
                Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                Some(Err(err)) => {
                    buf.clear();
                    done = true;
                    return Some((Err(err), (chunks, buf, done)));
                }
                None => done = true,
            }
        }
    })
    .boxed()
}

/// Payload of an SSE `data:` line, if this is one.
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}
