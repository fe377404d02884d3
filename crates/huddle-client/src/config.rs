//! Client configuration.

use std::time::Duration;

use huddle_core::{ConnectionConfig, RetryPolicy};

/// Typing window shared by outbound debounce and inbound expiry.
pub const TYPING_WINDOW: Duration = Duration::from_secs(3);

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// How long a typing signal stays valid without a refresh. Used both to
    /// emit our own stop and to expire remote typists.
    pub typing_window: Duration,
    /// Connection timeouts and heartbeat.
    pub connection: ConnectionConfig,
    /// Applied when a connection ends without a local close.
    pub reconnect: RetryPolicy,
    /// Applied when the transport rejects a `sendMessage` frame.
    pub resend: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            typing_window: TYPING_WINDOW,
            connection: ConnectionConfig::default(),
            reconnect: RetryPolicy::Never,
            resend: RetryPolicy::Never,
        }
    }
}
