//! Named-channel event emitter shared by the service clients.

use std::collections::HashMap;
use std::sync::RwLock;

use voxline_types::{MetricEvent, MetricsHandler, SubscribeError};

/// Fans metric events out to the handlers registered on each channel.
///
/// Each client declares the channels it publishes up front; subscribing to
/// any other channel is an error rather than a silent no-op.
pub struct EventEmitter {
    client: &'static str,
    channels: &'static [&'static str],
    handlers: RwLock<HashMap<&'static str, Vec<MetricsHandler>>>,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        let counts: HashMap<&str, usize> = handlers.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("EventEmitter")
            .field("client", &self.client)
            .field("handlers", &counts)
            .finish()
    }
}

impl EventEmitter {
    pub fn new(client: &'static str, channels: &'static [&'static str]) -> Self {
        Self {
            client,
            channels,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn client(&self) -> &'static str {
        self.client
    }

    /// Registers `handler` on `channel`.
    pub fn on(&self, channel: &str, handler: MetricsHandler) -> Result<(), SubscribeError> {
        let Some(known) = self.channels.iter().find(|c| **c == channel) else {
            return Err(SubscribeError::UnknownChannel {
                client: self.client.to_string(),
                channel: channel.to_string(),
            });
        };
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(*known)
            .or_default()
            .push(handler);
        Ok(())
    }

    /// Calls every handler on `channel` with a copy of `event`.
    ///
    /// Returns the number of handlers invoked. The handler list is cloned
    /// before calling out, so a handler may itself subscribe without
    /// deadlocking.
    pub fn emit(&self, channel: &str, event: MetricEvent) -> usize {
        let handlers = {
            let guard = self.handlers.read().unwrap_or_else(|e| e.into_inner());
            match guard.get(channel) {
                Some(list) => list.clone(),
                None => return 0,
            }
        };
        for handler in &handlers {
            handler(event.clone());
        }
        handlers.len()
    }
}
