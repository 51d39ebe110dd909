//! ChatTransport trait definition.
//!
//! One outbound chat request, answered with an incremental stream of decoded
//! server events.

use std::pin::Pin;

use futures_util::Stream;

use carelog_types::error::TransportError;
use carelog_types::event::ServerEvent;

/// Decoded events from one streaming chat call, in arrival order.
///
/// Failures are in-band `Err` items and always terminal. The stream simply
/// ends when the backend closes the connection -- there is no completion
/// sentinel. Dropping the stream abandons the request.
pub type ServerEventStream =
    Pin<Box<dyn Stream<Item = Result<ServerEvent, TransportError>> + Send + 'static>>;

/// Port for the streaming chat request.
///
/// Implementations live in carelog-infra (e.g., `SseChatTransport`). The
/// method returns a boxed stream (not RPITIT) so the coordinator can hold it
/// across its event loop without naming the concrete stream type.
pub trait ChatTransport: Send + Sync {
    /// POST `message` for `session_id` (`None` asks the backend to start a
    /// new session) and stream back decoded server events.
    ///
    /// For calls made with `session_id = None`, the backend's
    /// session-created event arrives before any content fragments.
    fn stream_chat(&self, message: &str, session_id: Option<&str>) -> ServerEventStream;
}
