//! MQTT subscription that feeds the ingestion pipeline.

use anyhow::{Result, anyhow};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::cleanup::CleanupStatus;
use crate::pipeline::IngestionPipeline;

const RECONNECT_PAUSE: Duration = Duration::from_secs(1);
const SUMMARY_EVERY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    /// Subscription filter, e.g. `/hfp/v2/journey/ongoing/+/bus/#`.
    pub topic: String,
}

pub struct Subscriber {
    client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
}

impl Subscriber {
    pub fn new(settings: &MqttSettings) -> Self {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(settings.keep_alive);

        let (client, eventloop) = AsyncClient::new(options, 10);
        Self {
            client,
            eventloop,
            topic: settings.topic.clone(),
        }
    }

    /// Feeds every received message through `pipeline`, one at a time and in
    /// arrival order, until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Fails only if the broker cannot be reached before the first successful
    /// connection. Later connection errors are logged and the event loop
    /// reconnects on its next poll.
    pub async fn run(
        mut self,
        pipeline: &mut IngestionPipeline,
        cleanup: &CleanupStatus,
        shutdown: impl Future<Output = ()>,
    ) -> Result<()> {
        tokio::pin!(shutdown);
        let mut summary = tokio::time::interval(SUMMARY_EVERY);
        let mut connected_once = false;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping subscriber");
                    break;
                }
                _ = summary.tick() => {
                    pipeline.stats().log_summary(cleanup.in_progress());
                }
                event = self.eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        pipeline.handle(&publish.topic, &publish.payload).await;
                    }
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        info!(
                            code = ?ack.code,
                            topic = %self.topic,
                            "Connected to broker, subscribing"
                        );
                        connected_once = true;
                        self.client.subscribe(&self.topic, QoS::AtMostOnce).await?;
                    }
                    Ok(other) => debug!(event = ?other, "MQTT event"),
                    Err(e) if !connected_once => {
                        return Err(anyhow!(e).context("could not connect to MQTT broker"));
                    }
                    Err(e) => {
                        error!(error = %e, "MQTT connection error, reconnecting");
                        tokio::time::sleep(RECONNECT_PAUSE).await;
                    }
                },
            }
        }

        if let Err(e) = self.client.disconnect().await {
            warn!(error = %e, "Failed to queue MQTT disconnect");
        } else {
            // One more poll flushes the disconnect packet.
            let _ = tokio::time::timeout(RECONNECT_PAUSE, self.eventloop.poll()).await;
        }
        pipeline.stats().log_summary(cleanup.in_progress());
        Ok(())
    }
}
