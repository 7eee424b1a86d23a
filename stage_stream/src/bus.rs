//! MQTT bus client.
//!
//! Thin wrapper over `rumqttc`'s synchronous client. The event loop runs on
//! its own thread: it flags connection state, re-subscribes to the command
//! topic on every (re)connect, and appends incoming command payloads to the
//! dispatcher FIFO — nothing else happens on the bus thread.
//!
//! Publisher and dispatcher hold clones of [`BusClient`] and publish
//! concurrently; the underlying client is internally synchronized.
//! Reconnection is the event loop's business: iterating the connection
//! retries the broker after a failure while sampling continues (records
//! accumulate up to ring capacity, then drop).

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS};
use thiserror::Error;
use tracing::{debug, info, warn};

use stage_common::config::BrokerConfig;
use stage_common::consts::{TOPIC_COMMAND, TOPIC_POSITION, TOPIC_RESULT, TOPIC_STATUS};

use crate::dispatcher::{CommandFifo, CommandRecord};
use crate::status::SharedState;

/// Delay before the event loop retries after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Error type for bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// The broker did not acknowledge the connection in time.
    #[error("broker connection not acknowledged within {0:?}")]
    ConnectTimeout(Duration),

    /// The client rejected a request (queue closed or full).
    #[error("bus client error: {0}")]
    Client(String),
}

/// Shared handle for publishing onto the bus.
#[derive(Clone)]
pub struct BusClient {
    client: Client,
    shared: Arc<SharedState>,
}

impl BusClient {
    /// Create the client and spawn the event-loop thread.
    ///
    /// The returned client is immediately usable; publications queue inside
    /// the client until the broker connection is up. Call
    /// [`BusClient::wait_connected`] to gate startup on the broker.
    pub fn start(
        broker: &BrokerConfig,
        shared: Arc<SharedState>,
        fifo: Arc<CommandFifo>,
    ) -> Result<(Self, JoinHandle<()>), BusError> {
        let mut options =
            MqttOptions::new(broker.client_id.as_str(), broker.host.as_str(), broker.port);
        options.set_keep_alive(Duration::from_secs(broker.keep_alive_s));

        let (client, connection) = Client::new(options, 128);

        let events = {
            let client = client.clone();
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("bus-events".to_string())
                .spawn(move || event_loop(connection, client, shared, fifo))
                .map_err(|e| BusError::Client(format!("failed to spawn bus thread: {e}")))?
        };

        Ok((Self { client, shared }, events))
    }

    /// Block until the broker has acknowledged the connection.
    pub fn wait_connected(&self, timeout: Duration) -> Result<(), BusError> {
        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            if self.shared.mqtt_connected() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(100));
        }
        Err(BusError::ConnectTimeout(timeout))
    }

    /// Publish one position batch, QoS 0. Positions are telemetry: a
    /// failure is the caller's cue to discard the batch.
    pub fn publish_position(&self, payload: &str) -> Result<(), BusError> {
        self.client
            .publish(TOPIC_POSITION, QoS::AtMostOnce, false, payload.as_bytes())
            .map_err(|e| BusError::Client(e.to_string()))
    }

    /// Publish one result message, QoS 1.
    pub fn publish_result(&self, payload: &str) -> Result<(), BusError> {
        self.client
            .publish(TOPIC_RESULT, QoS::AtLeastOnce, false, payload.as_bytes())
            .map_err(|e| BusError::Client(e.to_string()))
    }

    /// Publish a lifecycle string (`SYSTEM_READY`, `SYSTEM_SHUTDOWN`), QoS 1.
    pub fn publish_lifecycle(&self, state: &str) -> Result<(), BusError> {
        self.client
            .publish(TOPIC_STATUS, QoS::AtLeastOnce, false, state.as_bytes())
            .map_err(|e| BusError::Client(e.to_string()))
    }

    /// Ask the event loop to disconnect from the broker.
    pub fn disconnect(&self) {
        if let Err(e) = self.client.disconnect() {
            debug!("disconnect request failed: {e}");
        }
    }
}

/// Bus event loop; runs until the running flag clears.
fn event_loop(
    mut connection: Connection,
    client: Client,
    shared: Arc<SharedState>,
    fifo: Arc<CommandFifo>,
) {
    for event in connection.iter() {
        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                shared.set_mqtt_connected(true);
                info!("connected to broker");
                // Subscriptions are not restored across reconnects; renew
                // on every ConnAck.
                if let Err(e) = client.subscribe(TOPIC_COMMAND, QoS::AtMostOnce) {
                    warn!("failed to subscribe to {TOPIC_COMMAND}: {e}");
                } else {
                    info!("subscribed to {TOPIC_COMMAND}");
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if publish.topic == TOPIC_COMMAND {
                    let record = CommandRecord {
                        payload: publish.payload.to_vec(),
                        received_ns: shared.now_ns(),
                    };
                    if fifo.push(record) {
                        shared.add_commands_dropped(1);
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                shared.set_mqtt_connected(false);
                if !shared.is_running() {
                    break;
                }
                warn!("bus connection error: {e}; retrying");
                thread::sleep(RECONNECT_DELAY);
            }
        }
        if !shared.is_running() {
            break;
        }
    }
    shared.set_mqtt_connected(false);
    info!("bus event loop stopped");
}
