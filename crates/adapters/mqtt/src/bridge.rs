//! Broker session and ingestion worker.
//!
//! Two tasks run per bridge. The network task polls the rumqttc event loop,
//! resubscribes to `{ns}/#` on every CONNACK and hands publishes to a bounded
//! queue. The worker task decodes queued messages one at a time and feeds
//! them to a [`MessageHandler`]. On shutdown the network task disconnects and
//! closes the queue; the worker drains what is left, then exits.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use fieldhub_app::ports::{
    DeviceRepository, EventPublisher, NotificationRepository, TelemetryRepository,
};
use fieldhub_app::services::ingestion_service::IngestionService;
use fieldhub_domain::error::FieldHubError;
use fieldhub_domain::telemetry::TelemetryMessage;

use crate::backoff::Backoff;
use crate::config::MqttConfig;
use crate::payload::decode_message;
use crate::publisher::MqttCommandPublisher;

const REQUEST_CAPACITY: usize = 64;

/// Consumer of decoded telemetry messages.
pub trait MessageHandler {
    fn handle(
        &self,
        message: TelemetryMessage,
    ) -> impl Future<Output = Result<(), FieldHubError>> + Send;
}

impl<DR, TR, NR, EP> MessageHandler for IngestionService<DR, TR, NR, EP>
where
    DR: DeviceRepository + Send + Sync,
    TR: TelemetryRepository + Send + Sync,
    NR: NotificationRepository + Send + Sync,
    EP: EventPublisher + Send + Sync,
{
    async fn handle(&self, message: TelemetryMessage) -> Result<(), FieldHubError> {
        self.handle_message(message).await.map(|_| ())
    }
}

struct Inbound {
    topic: String,
    payload: Vec<u8>,
}

/// Running bridge tasks.
pub struct MqttBridge {
    tasks: Vec<JoinHandle<()>>,
}

impl MqttBridge {
    /// Start the bridge, or a disabled stand-in when no broker host is set.
    ///
    /// Never fails: connection problems are retried in the background.
    pub fn start<H>(
        config: &MqttConfig,
        handler: Arc<H>,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, MqttCommandPublisher)
    where
        H: MessageHandler + Send + Sync + 'static,
    {
        let Some(host) = config.enabled_host() else {
            tracing::error!("no MQTT broker host configured, telemetry ingestion is disabled");
            return (Self { tasks: Vec::new() }, MqttCommandPublisher::disabled());
        };

        let mut options = MqttOptions::new(&config.client_id, host, config.broker_port);
        options.set_keep_alive(Duration::from_secs(u64::from(config.keep_alive_secs)));
        options.set_clean_session(true);
        if let Some(username) = config.username.as_deref() {
            options.set_credentials(username, config.password.as_deref().unwrap_or_default());
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));
        let (queue, inbox) = mpsc::channel(config.channel_capacity.max(1));

        tracing::info!(host, port = config.broker_port, "starting MQTT bridge");

        let network = NetworkLoop {
            eventloop,
            client: client.clone(),
            connected: Arc::clone(&connected),
            subscription: format!("{}/#", config.base_topic),
            queue,
            backoff: Backoff::new(
                Duration::from_secs(config.reconnect_min_secs),
                Duration::from_secs(config.reconnect_max_secs),
            ),
            connect_timeout: config.connect_timeout(),
        };
        let tasks = vec![
            tokio::spawn(network.run(shutdown)),
            tokio::spawn(run_worker(config.base_topic.clone(), inbox, handler)),
        ];

        (Self { tasks }, MqttCommandPublisher::new(client, connected))
    }

    /// Wait for the network task and the worker to finish.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(err) = task.await {
                tracing::error!(%err, "MQTT bridge task failed");
            }
        }
    }
}

struct NetworkLoop {
    eventloop: EventLoop,
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    subscription: String,
    queue: mpsc::Sender<Inbound>,
    backoff: Backoff,
    connect_timeout: Duration,
}

impl NetworkLoop {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let first_connack = tokio::time::sleep(self.connect_timeout);
        tokio::pin!(first_connack);
        let mut awaiting_first = true;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                () = &mut first_connack, if awaiting_first => {
                    awaiting_first = false;
                    tracing::warn!(
                        timeout_secs = self.connect_timeout.as_secs(),
                        "no CONNACK from broker yet, retrying in background"
                    );
                }
                event = self.eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        awaiting_first = false;
                        self.on_connected();
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        self.enqueue(Inbound {
                            topic: publish.topic,
                            payload: publish.payload.to_vec(),
                        });
                    }
                    Ok(_) => {}
                    Err(err) => {
                        self.connected.store(false, Ordering::Release);
                        let delay = self.backoff.next_delay();
                        tracing::warn!(
                            %err,
                            delay_secs = delay.as_secs(),
                            "MQTT connection error, reconnecting"
                        );
                        tokio::select! {
                            () = tokio::time::sleep(delay) => {}
                            _ = shutdown.changed() => {}
                        }
                        if *shutdown.borrow() || shutdown.has_changed().is_err() {
                            break;
                        }
                    }
                }
            }
        }

        self.disconnect().await;
    }

    fn on_connected(&mut self) {
        self.backoff.reset();
        self.connected.store(true, Ordering::Release);
        match self
            .client
            .try_subscribe(self.subscription.clone(), QoS::AtLeastOnce)
        {
            Ok(()) => tracing::info!(topic = %self.subscription, "connected to broker, subscribed"),
            Err(err) => tracing::error!(%err, topic = %self.subscription, "failed to subscribe"),
        }
    }

    fn enqueue(&self, message: Inbound) {
        match self.queue.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(message)) => {
                tracing::warn!(topic = %message.topic, "ingestion queue full, dropping message");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::error!("ingestion worker stopped, dropping message");
            }
        }
    }

    async fn disconnect(mut self) {
        self.connected.store(false, Ordering::Release);
        if self.client.try_disconnect().is_ok() {
            // one more poll flushes the DISCONNECT packet
            let _ = tokio::time::timeout(Duration::from_secs(1), self.eventloop.poll()).await;
        }
        tracing::info!("MQTT bridge stopped");
    }
}

async fn run_worker<H>(namespace: String, mut inbox: mpsc::Receiver<Inbound>, handler: Arc<H>)
where
    H: MessageHandler + Send + Sync + 'static,
{
    while let Some(Inbound { topic, payload }) = inbox.recv().await {
        if is_outbound(&namespace, &topic) {
            continue;
        }
        let Some(message) = decode_message(&namespace, &topic, &payload) else {
            continue;
        };
        if let Err(err) = handler.handle(message).await {
            tracing::warn!(%topic, err = %err.describe(), "failed to ingest message");
        }
    }
    tracing::debug!("ingestion worker drained");
}

/// Commands this process publishes under its own namespace.
fn is_outbound(namespace: &str, topic: &str) -> bool {
    topic
        .strip_prefix(namespace)
        .and_then(|rest| rest.strip_prefix("/devices/"))
        .is_some_and(|rest| rest.ends_with("/command"))
}
