//! SSE chat transport over reqwest.
//!
//! One `POST {base_url}/api/chat/stream` per send, response consumed
//! incrementally as server-sent events. The backend's frame payloads are
//! not uniform -- typed envelopes, legacy untyped objects, JSON-encoded
//! string fragments, and bare text all occur -- so [`decode_frame`]
//! normalizes every payload into a [`ServerEvent`] right here. No shape
//! sniffing exists anywhere downstream of this module.
//!
//! Failures are in-band `Err` items on the returned stream, never panics or
//! early returns the caller has to guard: the coordinator observes them in
//! arrival order like any other event, and they are always terminal.

use eventsource_stream::{Event, Eventsource};
use futures_util::StreamExt;
use serde_json::Value;

use carelog_core::transport::{ChatTransport, ServerEventStream};
use carelog_types::error::TransportError;
use carelog_types::event::ServerEvent;

/// Streaming chat transport over HTTP server-sent events.
///
/// The `reqwest::Client` is injected so the host can pre-configure the
/// authenticated session (cookies, default headers); this type adds nothing
/// to the request beyond the JSON body.
pub struct SseChatTransport {
    client: reqwest::Client,
    base_url: String,
}

impl SseChatTransport {
    /// Create a transport with a default client.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a transport with a pre-configured client.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }
}

impl ChatTransport for SseChatTransport {
    fn stream_chat(&self, message: &str, session_id: Option<&str>) -> ServerEventStream {
        let client = self.client.clone();
        let url = format!("{}/api/chat/stream", self.base_url);
        let body = serde_json::json!({
            "message": message,
            "context": { "session_id": session_id },
        });

        Box::pin(async_stream::stream! {
            let response = match client.post(&url).json(&body).send().await {
                Ok(response) => response,
                Err(err) => {
                    yield Err(TransportError::Request(err.to_string()));
                    return;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                tracing::warn!(status = status.as_u16(), "Chat backend refused stream request");
                yield Err(TransportError::Api {
                    status: status.as_u16(),
                    message,
                });
                return;
            }

            let mut frames = response.bytes_stream().eventsource();
            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(frame) => {
                        if let Some(item) = map_frame(frame) {
                            let terminal = item.is_err();
                            yield item;
                            if terminal {
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        yield Err(TransportError::Stream(err.to_string()));
                        return;
                    }
                }
            }
        })
    }
}

/// Map one SSE frame to a stream item, or `None` for frames to drop.
///
/// Frames named `error` carry a human-readable failure message in-band.
fn map_frame(frame: Event) -> Option<Result<ServerEvent, TransportError>> {
    if frame.event == "error" {
        return Some(Err(TransportError::Server(frame.data)));
    }
    decode_frame(&frame.data).map(Ok)
}

/// Normalize one `data:` payload into a [`ServerEvent`].
///
/// Tried in order:
/// 1. Typed envelope (`{"type": "session_created", ...}` etc.) -- the shape
///    current backends send.
/// 2. Legacy untyped object, recognized by field presence: `session_id`
///    means session created, `status` means a progress update.
/// 3. JSON-encoded string -- serde handles quote and escape removal.
/// 4. Bare text fallback: strip one symmetric quote pair if present and
///    un-escape literal `\n` sequences.
///
/// Unrecognized object shapes (analysis notifications and the like, which
/// share the channel on some backends) and non-string JSON values are
/// dropped.
fn decode_frame(payload: &str) -> Option<ServerEvent> {
    if let Ok(event) = serde_json::from_str::<ServerEvent>(payload) {
        return Some(event);
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(Value::String(text)) => Some(ServerEvent::Fragment { text }),
        Ok(Value::Object(map)) => {
            if let Some(session_id) = map.get("session_id").and_then(Value::as_str) {
                return Some(ServerEvent::SessionCreated {
                    session_id: session_id.to_string(),
                });
            }
            if let Some(text) = map.get("status").and_then(Value::as_str) {
                return Some(ServerEvent::Status {
                    text: text.to_string(),
                });
            }
            tracing::debug!("Dropping unrecognized chat frame shape");
            None
        }
        // Valid JSON that is not a string (null, bools, numbers, arrays)
        // is not renderable fragment text.
        Ok(_) => {
            tracing::debug!("Dropping non-string chat frame payload");
            None
        }
        Err(_) => Some(ServerEvent::Fragment {
            text: unescape_raw(payload),
        }),
    }
}

/// Clean up a bare-text payload: strip one symmetric leading/trailing quote
/// pair and turn literal `\n` sequences into newlines.
fn unescape_raw(payload: &str) -> String {
    let trimmed = payload
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(payload);
    trimmed.replace("\\n", "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[test]
    fn test_decode_typed_session_created() {
        let event = decode_frame(r#"{"type": "session_created", "session_id": "s1"}"#).unwrap();
        assert!(matches!(
            event,
            ServerEvent::SessionCreated { session_id } if session_id == "s1"
        ));
    }

    #[test]
    fn test_decode_typed_status_with_either_field_name() {
        let event = decode_frame(r#"{"type": "status", "status": "Analyzing records..."}"#).unwrap();
        assert!(matches!(event, ServerEvent::Status { text } if text == "Analyzing records..."));

        let event = decode_frame(r#"{"type": "status", "message": "Thinking..."}"#).unwrap();
        assert!(matches!(event, ServerEvent::Status { text } if text == "Thinking..."));
    }

    #[test]
    fn test_decode_legacy_session_object() {
        let event = decode_frame(r#"{"session_id": "abc-123"}"#).unwrap();
        assert!(matches!(
            event,
            ServerEvent::SessionCreated { session_id } if session_id == "abc-123"
        ));
    }

    #[test]
    fn test_decode_legacy_status_object() {
        let event = decode_frame(r#"{"status": "Reading your labs..."}"#).unwrap();
        assert!(matches!(event, ServerEvent::Status { text } if text == "Reading your labs..."));
    }

    #[test]
    fn test_decode_json_string_fragment_unescapes() {
        let event = decode_frame(r#""Your cholesterol\nis 162.""#).unwrap();
        assert!(matches!(event, ServerEvent::Fragment { text } if text == "Your cholesterol\nis 162."));
    }

    #[test]
    fn test_decode_bare_text_fragment() {
        let event = decode_frame("plain text, not JSON at all").unwrap();
        assert!(matches!(event, ServerEvent::Fragment { text } if text == "plain text, not JSON at all"));
    }

    #[test]
    fn test_decode_bare_text_strips_symmetric_quotes_and_unescapes() {
        // Invalid JSON (stray backslash) but quote-wrapped with literal \n.
        let event = decode_frame(r#""line one\nline \x two""#).unwrap();
        assert!(matches!(
            event,
            ServerEvent::Fragment { text } if text == "line one\nline \\x two"
        ));
    }

    #[test]
    fn test_decode_lone_quote_survives() {
        let event = decode_frame("\"").unwrap();
        assert!(matches!(event, ServerEvent::Fragment { text } if text == "\""));
    }

    #[test]
    fn test_decode_unknown_object_is_dropped() {
        assert!(decode_frame(r#"{"type": "timeline_complete", "items": []}"#).is_none());
        assert!(decode_frame(r#"{"records": 3}"#).is_none());
    }

    #[test]
    fn test_decode_non_string_json_is_dropped() {
        // Keep-alives and stray serialized values must never render as
        // chat text.
        assert!(decode_frame("null").is_none());
        assert!(decode_frame("true").is_none());
        assert!(decode_frame("42").is_none());
        assert!(decode_frame("[1, 2]").is_none());
    }

    #[test]
    fn test_error_frame_maps_to_server_error() {
        let frame = Event {
            event: "error".to_string(),
            data: "model overloaded".to_string(),
            ..Default::default()
        };
        let item = map_frame(frame).unwrap();
        assert!(matches!(item, Err(TransportError::Server(msg)) if msg == "model overloaded"));
    }

    #[test]
    fn test_ordinary_frame_maps_to_event() {
        let frame = Event {
            event: "message".to_string(),
            data: "\"hello\"".to_string(),
            ..Default::default()
        };
        let item = map_frame(frame).unwrap();
        assert!(matches!(item, Ok(ServerEvent::Fragment { text }) if text == "hello"));
    }

    #[tokio::test]
    async fn test_eventsource_framing_reassembles_split_frames() {
        // One SSE frame split across two byte chunks, then two frames in a
        // single chunk. eventsource-stream must reassemble and split them.
        let chunks: Vec<Result<&[u8], std::convert::Infallible>> = vec![
            Ok(b"data: {\"type\": \"session_cre"),
            Ok(b"ated\", \"session_id\": \"s1\"}\n\n"),
            Ok(b"data: \"Your \"\n\ndata: \"cholesterol is 162.\"\n\n"),
        ];

        let frames: Vec<_> = stream::iter(chunks).eventsource().collect().await;
        let events: Vec<ServerEvent> = frames
            .into_iter()
            .map(|frame| decode_frame(&frame.unwrap().data).unwrap())
            .collect();

        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[0],
            ServerEvent::SessionCreated { session_id } if session_id == "s1"
        ));
        assert!(matches!(&events[1], ServerEvent::Fragment { text } if text == "Your "));
        assert!(matches!(&events[2], ServerEvent::Fragment { text } if text == "cholesterol is 162."));
    }

    #[tokio::test]
    async fn test_connect_failure_is_one_terminal_err_item() {
        // Nothing listens on this port; the stream must yield exactly one
        // Err(Request) and end, rather than panicking or hanging. no_proxy
        // keeps an ambient HTTP_PROXY from intercepting the connection.
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let transport = SseChatTransport::with_client(client, "http://127.0.0.1:1");
        let mut stream = transport.stream_chat("hello", None);

        let first = stream.next().await.unwrap();
        assert!(matches!(first, Err(TransportError::Request(_))));
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let transport = SseChatTransport::new("http://localhost:8000/");
        assert_eq!(transport.base_url, "http://localhost:8000");
    }
}
