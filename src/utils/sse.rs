use futures_util::TryStreamExt;
use futures_util::stream::{self, BoxStream};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::io::StreamReader;

use crate::{MeterError, Result};

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Clone, Copy, Debug)]
pub struct SseLimits {
    pub max_line_bytes: usize,
    pub max_event_bytes: usize,
}

impl Default for SseLimits {
    fn default() -> Self {
        Self {
            max_line_bytes: 256 * 1024,
            max_event_bytes: 4 * 1024 * 1024,
        }
    }
}

/// Pulls `data:` payloads out of an event stream, one event per call.
struct SseReader<R> {
    reader: R,
    line: Vec<u8>,
    data: String,
    limits: SseLimits,
}

impl<R> SseReader<R>
where
    R: AsyncBufRead + Unpin,
{
    fn new(reader: R, limits: SseLimits) -> Self {
        Self {
            reader,
            line: Vec::new(),
            data: String::new(),
            limits,
        }
    }

    /// Next event's data, or `None` at end of input or on the `[DONE]` sentinel.
    async fn next_data(&mut self) -> Result<Option<String>> {
        self.data.clear();

        loop {
            if !self.read_line().await? {
                if self.data.is_empty() || self.data == DONE_SENTINEL {
                    return Ok(None);
                }
                return Ok(Some(std::mem::take(&mut self.data)));
            }

            let line = std::str::from_utf8(&self.line)
                .map_err(|err| MeterError::InvalidResponse(format!("invalid SSE UTF-8: {err}")))?
                .trim_end_matches(['\r', '\n']);

            if line.is_empty() {
                if self.data.is_empty() {
                    continue;
                }
                if self.data == DONE_SENTINEL {
                    return Ok(None);
                }
                return Ok(Some(std::mem::take(&mut self.data)));
            }

            let Some(rest) = line.strip_prefix("data:") else {
                continue;
            };
            let rest = rest.trim_start();
            let separator = usize::from(!self.data.is_empty());
            if self.data.len() + separator + rest.len() > self.limits.max_event_bytes {
                return Err(MeterError::InvalidResponse(format!(
                    "SSE event exceeds max_event_bytes={}",
                    self.limits.max_event_bytes
                )));
            }
            if separator == 1 {
                self.data.push('\n');
            }
            self.data.push_str(rest);
        }
    }

    async fn read_line(&mut self) -> Result<bool> {
        self.line.clear();
        let max_bytes = self.limits.max_line_bytes.max(1);

        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Ok(!self.line.is_empty());
            }

            let newline = buf.iter().position(|b| *b == b'\n');
            let take = newline.map_or(buf.len(), |pos| pos + 1);
            if self.line.len() + take > max_bytes {
                return Err(MeterError::InvalidResponse(format!(
                    "SSE line exceeds max_line_bytes={max_bytes}"
                )));
            }
            self.line.extend_from_slice(&buf[..take]);
            self.reader.consume(take);

            if newline.is_some() {
                return Ok(true);
            }
        }
    }
}

pub fn sse_data_stream_from_reader_with_limits<R>(
    reader: R,
    limits: SseLimits,
) -> BoxStream<'static, Result<String>>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    Box::pin(stream::try_unfold(
        SseReader::new(reader, limits),
        |mut reader| async move {
            Ok::<_, MeterError>(reader.next_data().await?.map(|data| (data, reader)))
        },
    ))
}

pub fn sse_data_stream_from_reader<R>(reader: R) -> BoxStream<'static, Result<String>>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    sse_data_stream_from_reader_with_limits(reader, SseLimits::default())
}

pub fn sse_data_stream_from_response(
    response: reqwest::Response,
) -> BoxStream<'static, Result<String>> {
    let body = response.bytes_stream().map_err(std::io::Error::other);
    sse_data_stream_from_reader(BufReader::new(StreamReader::new(body)))
}
