//! ストリーム応答本体のフレーミング
//!
//! - `EventStreamReader`: `application/vnd.amazon.eventstream` のバイナリフレーム
//!   （prelude: total_len u32 / headers_len u32 / prelude_crc u32、headers、payload、message_crc u32）
//! - `JsonLinesReader`: 1 行 1 イベントの JSON（SSE の `data:` 接頭辞も許容）
//!
//! prelude / message の CRC は検証しない。

use crate::error::Error;
use crate::llm::events::ConverseStreamEvent;
use serde_json::Value;
use std::io::{BufRead, Read};

const PRELUDE_LEN: usize = 12;
const MESSAGE_CRC_LEN: usize = 4;
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// ヘッダ値（文字列以外は読み飛ばすので型だけ持つ）
#[derive(Debug, Clone, PartialEq)]
enum HeaderValue {
    String(String),
    Other,
}

#[derive(Debug, Clone, PartialEq)]
struct Frame {
    headers: Vec<(String, HeaderValue)>,
    payload: Vec<u8>,
}

impl Frame {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find_map(|(k, v)| match v {
            HeaderValue::String(s) if k == name => Some(s.as_str()),
            _ => None,
        })
    }
}

/// buf が埋まるか EOF まで読む。読めたバイト数を返す。
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn take<'a>(buf: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8], Error> {
    let end = pos
        .checked_add(n)
        .filter(|end| *end <= buf.len())
        .ok_or_else(|| Error::protocol("eventstream header overruns frame"))?;
    let out = &buf[*pos..end];
    *pos = end;
    Ok(out)
}

fn parse_headers(buf: &[u8]) -> Result<Vec<(String, HeaderValue)>, Error> {
    let mut headers = Vec::new();
    let mut pos = 0;
    while pos < buf.len() {
        let name_len = take(buf, &mut pos, 1)?[0] as usize;
        let name = String::from_utf8_lossy(take(buf, &mut pos, name_len)?).into_owned();
        let value_type = take(buf, &mut pos, 1)?[0];
        let value = match value_type {
            0 | 1 => HeaderValue::Other,
            2 => {
                take(buf, &mut pos, 1)?;
                HeaderValue::Other
            }
            3 => {
                take(buf, &mut pos, 2)?;
                HeaderValue::Other
            }
            4 => {
                take(buf, &mut pos, 4)?;
                HeaderValue::Other
            }
            5 | 8 => {
                take(buf, &mut pos, 8)?;
                HeaderValue::Other
            }
            9 => {
                take(buf, &mut pos, 16)?;
                HeaderValue::Other
            }
            6 | 7 => {
                let len_bytes = take(buf, &mut pos, 2)?;
                let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
                let bytes = take(buf, &mut pos, len)?;
                if value_type == 7 {
                    HeaderValue::String(String::from_utf8_lossy(bytes).into_owned())
                } else {
                    HeaderValue::Other
                }
            }
            other => {
                return Err(Error::protocol(format!(
                    "unknown eventstream header type {}",
                    other
                )))
            }
        };
        headers.push((name, value));
    }
    Ok(headers)
}

/// バイナリ eventstream を ConverseStreamEvent 列にする
pub struct EventStreamReader<R> {
    reader: R,
    done: bool,
}

impl<R: Read> EventStreamReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            done: false,
        }
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, Error> {
        let mut prelude = [0u8; PRELUDE_LEN];
        let n = read_full(&mut self.reader, &mut prelude)
            .map_err(|e| Error::transport(format!("Failed to read stream: {}", e)))?;
        if n == 0 {
            return Ok(None);
        }
        if n < PRELUDE_LEN {
            return Err(Error::protocol("truncated eventstream prelude"));
        }
        let total_len = u32::from_be_bytes([prelude[0], prelude[1], prelude[2], prelude[3]]) as usize;
        let headers_len =
            u32::from_be_bytes([prelude[4], prelude[5], prelude[6], prelude[7]]) as usize;
        if total_len > MAX_FRAME_LEN
            || total_len < PRELUDE_LEN + headers_len + MESSAGE_CRC_LEN
        {
            return Err(Error::protocol(format!(
                "invalid eventstream frame length {} (headers {})",
                total_len, headers_len
            )));
        }
        let mut rest = vec![0u8; total_len - PRELUDE_LEN];
        let n = read_full(&mut self.reader, &mut rest)
            .map_err(|e| Error::transport(format!("Failed to read stream: {}", e)))?;
        if n < rest.len() {
            return Err(Error::protocol("truncated eventstream frame"));
        }
        let headers = parse_headers(&rest[..headers_len])?;
        let payload = rest[headers_len..rest.len() - MESSAGE_CRC_LEN].to_vec();
        Ok(Some(Frame { headers, payload }))
    }

    fn frame_to_event(frame: &Frame) -> Result<ConverseStreamEvent, Error> {
        let payload: Value = if frame.payload.is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_slice(&frame.payload)
                .map_err(|e| Error::protocol(format!("invalid eventstream payload: {}", e)))?
        };
        match frame.header(":message-type").unwrap_or("event") {
            "event" => {
                let event_type = frame
                    .header(":event-type")
                    .ok_or_else(|| Error::protocol("eventstream frame has no :event-type"))?;
                ConverseStreamEvent::from_parts(event_type, payload).map_err(|e| {
                    Error::protocol(format!("unexpected stream event {}: {}", event_type, e))
                })
            }
            "exception" => {
                let kind = frame.header(":exception-type").unwrap_or("exception");
                match ConverseStreamEvent::from_parts(kind, payload.clone()) {
                    Ok(ev) if ev.exception().is_some() => Ok(ev),
                    // 知らない例外種別も転送エラーとして扱う
                    _ => Err(Error::transport(format!(
                        "{}: {}",
                        kind,
                        payload["message"].as_str().unwrap_or("")
                    ))),
                }
            }
            _ => Err(Error::transport(format!(
                "{}: {}",
                frame.header(":error-code").unwrap_or("error"),
                frame.header(":error-message").unwrap_or("")
            ))),
        }
    }
}

impl<R: Read> Iterator for EventStreamReader<R> {
    type Item = Result<ConverseStreamEvent, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self
            .read_frame()
            .and_then(|f| f.as_ref().map(Self::frame_to_event).transpose());
        match result {
            Ok(Some(ev)) => Some(Ok(ev)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// 1 行 1 イベントの JSON を ConverseStreamEvent 列にする
pub struct JsonLinesReader<R> {
    reader: R,
    done: bool,
}

impl<R: BufRead> JsonLinesReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for JsonLinesReader<R> {
    type Item = Result<ConverseStreamEvent, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let mut line = String::new();
            match self.reader.read_line(&mut line) {
                Ok(0) => self.done = true,
                Ok(_) => {
                    let line = line.trim();
                    let data = line.strip_prefix("data:").map(str::trim).unwrap_or(line);
                    if data.is_empty() || data == "[DONE]" || line.starts_with("event:") || line.starts_with(':') {
                        continue;
                    }
                    return Some(ConverseStreamEvent::from_json(data).map_err(|e| {
                        self.done = true;
                        Error::protocol(format!("invalid stream event {:?}: {}", data, e))
                    }));
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(Error::transport(format!(
                        "Failed to read stream line: {}",
                        e
                    ))));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::events::{BlockDelta, StopReason};
    use std::io::Cursor;

    fn string_header(name: &str, value: &str) -> Vec<u8> {
        let mut out = vec![name.len() as u8];
        out.extend_from_slice(name.as_bytes());
        out.push(7);
        out.extend_from_slice(&(value.len() as u16).to_be_bytes());
        out.extend_from_slice(value.as_bytes());
        out
    }

    fn frame(headers: &[(&str, &str)], payload: &str) -> Vec<u8> {
        let mut hbytes = Vec::new();
        for (k, v) in headers {
            hbytes.extend(string_header(k, v));
        }
        let total = PRELUDE_LEN + hbytes.len() + payload.len() + MESSAGE_CRC_LEN;
        let mut out = Vec::new();
        out.extend_from_slice(&(total as u32).to_be_bytes());
        out.extend_from_slice(&(hbytes.len() as u32).to_be_bytes());
        out.extend_from_slice(&[0, 0, 0, 0]);
        out.extend(hbytes);
        out.extend_from_slice(payload.as_bytes());
        out.extend_from_slice(&[0, 0, 0, 0]);
        out
    }

    fn event_frame(event_type: &str, payload: &str) -> Vec<u8> {
        frame(
            &[
                (":event-type", event_type),
                (":content-type", "application/json"),
                (":message-type", "event"),
            ],
            payload,
        )
    }

    #[test]
    fn test_eventstream_frames_decode_in_order() {
        let mut body = Vec::new();
        body.extend(event_frame("messageStart", r#"{"role":"assistant"}"#));
        body.extend(event_frame(
            "contentBlockDelta",
            r#"{"contentBlockIndex":0,"delta":{"text":"Hi"},"p":"abc"}"#,
        ));
        body.extend(event_frame("messageStop", r#"{"stopReason":"end_turn"}"#));
        let events: Vec<_> = EventStreamReader::new(Cursor::new(body))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[1],
            ConverseStreamEvent::ContentBlockDelta(d) if d.delta == BlockDelta::Text("Hi".to_string())
        ));
        assert!(matches!(
            &events[2],
            ConverseStreamEvent::MessageStop(s) if s.stop_reason == StopReason::EndTurn
        ));
    }

    #[test]
    fn test_eventstream_exception_frame() {
        let body = frame(
            &[
                (":exception-type", "throttlingException"),
                (":message-type", "exception"),
            ],
            r#"{"message":"Too many requests"}"#,
        );
        let mut reader = EventStreamReader::new(Cursor::new(body));
        let ev = reader.next().unwrap().unwrap();
        assert_eq!(ev.exception(), Some(("throttlingException", "Too many requests")));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_eventstream_unknown_event_and_exception_types() {
        let mut body = event_frame("citationsDelta", r#"{"x":1}"#);
        body.extend(frame(
            &[
                (":exception-type", "brandNewException"),
                (":message-type", "exception"),
            ],
            r#"{"message":"boom"}"#,
        ));
        let mut reader = EventStreamReader::new(Cursor::new(body));
        assert_eq!(
            reader.next().unwrap().unwrap(),
            ConverseStreamEvent::Unknown("citationsDelta".to_string())
        );
        match reader.next() {
            Some(Err(Error::Transport(m))) => assert!(m.contains("brandNewException: boom")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_eventstream_truncated_frame() {
        let mut body = event_frame("messageStop", r#"{"stopReason":"end_turn"}"#);
        body.truncate(body.len() - 6);
        let mut reader = EventStreamReader::new(Cursor::new(body));
        assert!(matches!(reader.next(), Some(Err(Error::ProtocolViolation(_)))));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_eventstream_skips_non_string_headers() {
        let mut hbytes = Vec::new();
        hbytes.push(4u8);
        hbytes.extend_from_slice(b"flag");
        hbytes.push(0);
        hbytes.extend(string_header(":event-type", "contentBlockStop"));
        let payload = r#"{"contentBlockIndex":0}"#;
        let total = PRELUDE_LEN + hbytes.len() + payload.len() + MESSAGE_CRC_LEN;
        let mut body = Vec::new();
        body.extend_from_slice(&(total as u32).to_be_bytes());
        body.extend_from_slice(&(hbytes.len() as u32).to_be_bytes());
        body.extend_from_slice(&[0; 4]);
        body.extend(hbytes);
        body.extend_from_slice(payload.as_bytes());
        body.extend_from_slice(&[0; 4]);
        let ev = EventStreamReader::new(Cursor::new(body)).next().unwrap().unwrap();
        assert!(matches!(ev, ConverseStreamEvent::ContentBlockStop(_)));
    }

    #[test]
    fn test_json_lines_with_sse_prefix() {
        let body = "event: message\n\
data: {\"contentBlockDelta\":{\"delta\":{\"text\":\"a\"},\"contentBlockIndex\":0}}\n\
\n\
{\"messageStop\":{\"stopReason\":\"end_turn\"}}\n\
data: [DONE]\n";
        let events: Vec<_> = JsonLinesReader::new(Cursor::new(body))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], ConverseStreamEvent::MessageStop(_)));
    }

    #[test]
    fn test_json_lines_invalid_line_stops_stream() {
        let body = "{\"nope\":1}\n{\"messageStop\":{\"stopReason\":\"end_turn\"}}\n";
        let mut reader = JsonLinesReader::new(Cursor::new(body));
        assert!(matches!(reader.next(), Some(Err(Error::ProtocolViolation(_)))));
        assert!(reader.next().is_none());
    }
}
