use std::time::Duration;

use wirebus_core::codec::DEFAULT_MAX_PAYLOAD;

/// Runtime-level configuration shared by clients and services.
///
/// All values are documented defaults for the knobs the wire protocol leaves
/// open: there is no retry policy at any layer (callers own retries), and
/// header keys are transmitted verbatim with no case folding.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Timeout applied to client calls that do not specify one.
    pub default_call_timeout: Duration,
    /// How long `stop()` waits for in-flight handlers before proceeding.
    pub drain_grace: Duration,
    /// Capacity of each subscription's inbound message channel.
    pub inbound_channel_capacity: usize,
    /// Maximum serialized payload size, enforced at encode time.
    pub max_payload_bytes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_call_timeout: Duration::from_secs(5),
            drain_grace: Duration::from_secs(5),
            inbound_channel_capacity: 256,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD,
        }
    }
}
