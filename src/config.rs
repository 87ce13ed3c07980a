//! Engine configuration.

/// Realtime engine configuration.
#[derive(Clone, Debug)]
pub struct RealtimeConfig {
    /// Whether remote watches are attached at all.
    /// Server-side rendering turns this off: subscribe and unsubscribe
    /// become no-ops.
    /// Default: true
    pub realtime_enabled: bool,

    /// Buffered events per observer before it is dropped.
    /// Default: 1000
    pub observer_buffer_size: usize,
}

impl RealtimeConfig {
    /// Configuration for a server-rendering process, where no watch is kept.
    pub fn server_render() -> Self {
        Self {
            realtime_enabled: false,
            ..Default::default()
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            realtime_enabled: true,
            observer_buffer_size: 1000,
        }
    }
}
