use crate::sink::{LogLevel, LogRecord, LogSink, LogSource};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, FramedRead};

/// Lines longer than this are emitted in pieces
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Newline-delimited decoder that never fails on bad UTF-8.
///
/// Invalid sequences are replaced, a trailing `\r` is stripped and an
/// unterminated final line is still emitted at end of stream.
#[derive(Debug, Default)]
pub struct LossyLineCodec {
    next_index: usize,
}

impl LossyLineCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn text(bytes: &[u8]) -> String {
        let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
        String::from_utf8_lossy(bytes).into_owned()
    }

    /// Length of `chunk` minus a multi-byte character cut off at its end
    fn char_boundary(chunk: &[u8]) -> usize {
        let len = chunk.len();
        let lead = (len.saturating_sub(3)..len)
            .rev()
            .find(|&i| chunk[i] & 0xC0 != 0x80);
        match lead {
            Some(start) if start > 0 => match std::str::from_utf8(&chunk[start..]) {
                Err(e) if e.error_len().is_none() => start,
                _ => len,
            },
            _ => len,
        }
    }
}

impl Decoder for LossyLineCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // A newline past the limit still means the line must be split
        let window_end = src.len().min(MAX_LINE_BYTES + 1);
        let start = self.next_index.min(window_end);
        let newline = src[start..window_end]
            .iter()
            .position(|b| *b == b'\n')
            .map(|offset| start + offset);

        match newline {
            Some(index) => {
                self.next_index = 0;
                let line = src.split_to(index + 1);
                Ok(Some(Self::text(&line[..index])))
            }
            None if src.len() >= MAX_LINE_BYTES => {
                self.next_index = 0;
                let at = Self::char_boundary(&src[..MAX_LINE_BYTES]);
                let chunk = src.split_to(at);
                Ok(Some(String::from_utf8_lossy(&chunk).into_owned()))
            }
            None => {
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if src.is_empty() {
            return Ok(None);
        }
        let rest = src.split_to(src.len());
        Ok(Some(Self::text(&rest)))
    }
}

/// Forward every non-empty line of `stream` to `sink`.
///
/// A reader task decodes lines and hands them to an unbounded channel; a
/// consumer task drains the channel into the sink. The reader never waits
/// on the sink, so a slow sink cannot stall the child's writes. Order is
/// preserved within the stream. The returned handle completes once the
/// stream hit EOF and every line was delivered.
pub fn forward_output<R>(stream: R, source: LogSource, sink: Arc<dyn LogSink>) -> JoinHandle<()>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let level = match source {
        LogSource::ChildStderr => LogLevel::Error,
        _ => LogLevel::Info,
    };
    let (tx, mut rx) = mpsc::unbounded_channel::<LogRecord>();

    tokio::spawn(async move {
        let mut frames = FramedRead::new(stream, LossyLineCodec::new());
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(line) if line.trim().is_empty() => {}
                Ok(line) => {
                    if tx.send(LogRecord::new(level, source, line)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(source = %source, error = %e, "Stopped reading child output");
                    break;
                }
            }
        }
    });

    tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            sink.emit(record);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    fn decode_all(input: &[u8]) -> Vec<String> {
        let mut codec = LossyLineCodec::new();
        let mut buf = BytesMut::from(input);
        let mut lines = Vec::new();
        while let Some(line) = codec.decode(&mut buf).unwrap() {
            lines.push(line);
        }
        while let Some(line) = codec.decode_eof(&mut buf).unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_codec_splits_lines() {
        assert_eq!(
            decode_all(b"one\r\ntwo\nthree"),
            vec!["one".to_string(), "two".to_string(), "three".to_string()]
        );
    }

    #[test]
    fn test_codec_replaces_invalid_utf8() {
        let lines = decode_all(b"ok \xff\xfe end\n");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("ok "));
        assert!(lines[0].contains('\u{FFFD}'));
    }

    #[test]
    fn test_codec_resumes_partial_line() {
        let mut codec = LossyLineCodec::new();
        let mut buf = BytesMut::from(&b"par"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"tial\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("partial".to_string()));
    }

    #[test]
    fn test_codec_splits_overlong_lines() {
        let input = vec![b'a'; MAX_LINE_BYTES + 10];
        let lines = decode_all(&input);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), MAX_LINE_BYTES);
        assert_eq!(lines[1].len(), 10);
    }

    #[test]
    fn test_codec_splits_overlong_line_with_buffered_newline() {
        let mut input = vec![b'a'; 2 * MAX_LINE_BYTES];
        input.push(b'\n');

        let lengths: Vec<usize> = decode_all(&input).iter().map(String::len).collect();
        assert_eq!(lengths, vec![MAX_LINE_BYTES, MAX_LINE_BYTES]);
    }

    #[test]
    fn test_codec_keeps_line_at_limit_whole() {
        let mut input = vec![b'a'; MAX_LINE_BYTES];
        input.extend_from_slice(b"\nnext\n");

        let lines = decode_all(&input);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), MAX_LINE_BYTES);
        assert_eq!(lines[1], "next");
    }

    #[test]
    fn test_codec_split_keeps_multibyte_characters() {
        let mut input = "a".repeat(MAX_LINE_BYTES - 1);
        input.push_str("\u{e9} tail");
        let mut bytes = input.clone().into_bytes();
        bytes.push(b'\n');

        let lines = decode_all(&bytes);
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|line| !line.contains('\u{FFFD}')));
        assert_eq!(lines[0].len(), MAX_LINE_BYTES - 1);
        assert_eq!(lines.concat(), input);
    }

    #[tokio::test]
    async fn test_forward_stdout_as_info_in_order() {
        let sink = Arc::new(MemorySink::new());
        let stream = std::io::Cursor::new(b"first\n\nsecond\nthird".to_vec());

        forward_output(stream, LogSource::ChildStdout, sink.clone())
            .await
            .unwrap();

        let records = sink.records();
        assert_eq!(sink.messages(), vec!["first", "second", "third"]);
        assert!(records.iter().all(|r| r.level == LogLevel::Info));
        assert!(records.iter().all(|r| r.source == LogSource::ChildStdout));
    }

    #[tokio::test]
    async fn test_forward_stderr_as_error() {
        let sink = Arc::new(MemorySink::new());
        let stream = std::io::Cursor::new(b"fatal: bad config\n".to_vec());

        forward_output(stream, LogSource::ChildStderr, sink.clone())
            .await
            .unwrap();

        assert_eq!(sink.count(LogLevel::Error, LogSource::ChildStderr), 1);
    }
}
