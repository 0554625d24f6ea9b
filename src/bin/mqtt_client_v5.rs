// SPDX-License-Identifier: MPL-2.0

//! Demo publisher.
//!
//! ```text
//! RUST_LOG=debug mqtt_client_v5 [brokers] [topic]
//! mqtt_client_v5 "localhost:1883, backup-host" example/topic
//! ```

use mqtt5_engine::mqtt_client::{
    MqttClient, MqttClientOptions, PublishCommand, SubscribeCommand,
};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let brokers = args.next().unwrap_or_else(|| "localhost:1883".to_string());
    let topic = args.next().unwrap_or_else(|| "example/topic".to_string());

    let options = MqttClientOptions::builder()
        .brokers(&brokers)
        .client_id("example_client")
        .keep_alive(10)
        .session_expiry_interval(60)
        .build()?;
    let client = MqttClient::new(options);

    let runner = client.clone();
    let session = tokio::spawn(async move {
        if let Err(e) = runner.async_run().await {
            error!("Client stopped: {}", e);
        }
    });

    let granted = client
        .async_subscribe(SubscribeCommand::single(topic.clone(), 1))
        .await?;
    info!("Subscribed to {}: {:?}", topic, granted.reason_codes);

    for qos in 0..=2u8 {
        let payload = format!("Hello, MQTT! (QoS {})", qos);
        match client
            .async_publish(PublishCommand::simple(topic.clone(), payload, qos, false))
            .await
        {
            Ok(result) => info!(
                "QoS {} published, reason code 0x{:02X}",
                qos, result.reason_code
            ),
            Err(e) => error!("QoS {} publish failed: {}", qos, e),
        }
    }

    for _ in 0..3 {
        match tokio::time::timeout(Duration::from_secs(5), client.async_receive()).await {
            Ok(Ok(msg)) => info!(
                "Received on '{}': {}",
                msg.topic_name,
                String::from_utf8_lossy(&msg.payload)
            ),
            Ok(Err(e)) => {
                error!("Receive failed: {}", e);
                break;
            }
            Err(_) => break,
        }
    }

    client.async_disconnect(0, Vec::new()).await?;
    session.await?;
    Ok(())
}
