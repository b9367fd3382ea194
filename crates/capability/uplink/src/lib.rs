//! MQTT 上行：序列数据发布、通道状态/背压通知与周期遥测。

use async_trait::async_trait;
use domain::{Notification, Notifier};
use edge_pipeline::{BatchPublisher, PipelineError, PublishEntry, PublishResponse};
use edge_telemetry::TelemetryReport;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 单个 MQTT 报文上限（批量数据报文远大于默认 10KB）。
const MAX_PACKET_SIZE: usize = 1024 * 1024;

/// 上行错误。
#[derive(Debug, thiserror::Error)]
pub enum UplinkError {
    #[error("publish error: {0}")]
    Publish(String),
    #[error("payload error: {0}")]
    Payload(String),
}

/// MQTT 上行配置。
#[derive(Debug, Clone)]
pub struct MqttUplinkConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// 通知与遥测的 topic 前缀
    pub topic_prefix: String,
    pub data_topic: String,
    pub qos: u8,
}

/// MQTT 上行实现。
#[derive(Clone)]
pub struct MqttUplink {
    client: AsyncClient,
    topic_prefix: String,
    data_topic: String,
    qos: QoS,
}

impl MqttUplink {
    pub fn connect(
        config: MqttUplinkConfig,
    ) -> Result<(Self, tokio::task::JoinHandle<()>), UplinkError> {
        let client_id = format!("edge-connector-{}", uuid::Uuid::new_v4().simple());
        let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(30));
        options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);
        if let (Some(username), Some(password)) = (config.username, config.password) {
            options.set_credentials(username, password);
        }
        let (client, mut eventloop) = AsyncClient::new(options, 100);
        let handle = tokio::spawn(async move {
            loop {
                if let Err(err) = eventloop.poll().await {
                    warn!(target: "edge.uplink", error = %err, "mqtt_eventloop_error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        });
        info!(
            target: "edge.uplink",
            host = %config.host,
            port = config.port,
            data_topic = %config.data_topic,
            "mqtt_uplink_started"
        );
        Ok((
            Self {
                client,
                topic_prefix: config.topic_prefix.trim_end_matches('/').to_string(),
                data_topic: config.data_topic,
                qos: qos_from_u8(config.qos),
            },
            handle,
        ))
    }

    /// 发布一份遥测报告到 `{prefix}/telemetry`。
    pub async fn publish_telemetry(&self, report: &TelemetryReport) -> Result<(), UplinkError> {
        let payload =
            serde_json::to_vec(report).map_err(|err| UplinkError::Payload(err.to_string()))?;
        self.client
            .publish(telemetry_topic(&self.topic_prefix), self.qos, false, payload)
            .await
            .map_err(|err| UplinkError::Publish(err.to_string()))
    }
}

impl Notifier for MqttUplink {
    fn notify(&self, notification: Notification) {
        let (topic, payload) = match notification_message(&self.topic_prefix, &notification) {
            Ok(message) => message,
            Err(err) => {
                warn!(target: "edge.uplink", error = %err, "notification_encode_failed");
                return;
            }
        };
        // 通知在连接事件处理路径上发出，只做非阻塞入队
        if let Err(err) = self.client.try_publish(topic.clone(), self.qos, false, payload) {
            warn!(target: "edge.uplink", topic = %topic, error = %err, "notification_dropped");
        }
    }
}

#[async_trait]
impl BatchPublisher for MqttUplink {
    async fn publish(&self, entries: Vec<PublishEntry>) -> Result<PublishResponse, PipelineError> {
        let payload = data_payload(&entries, now_epoch_ms())
            .map_err(|err| PipelineError::Publish(err.to_string()))?;
        debug!(
            target: "edge.uplink",
            series = entries.len(),
            payload_size = payload.len(),
            "data_publish"
        );
        self.client
            .publish(self.data_topic.clone(), self.qos, false, payload)
            .await
            .map_err(|err| PipelineError::Publish(err.to_string()))?;
        // MQTT 不返回逐条结果
        Ok(PublishResponse::default())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DataEnvelope<'a> {
    published_at_ms: i64,
    entries: &'a [PublishEntry],
}

fn data_payload(entries: &[PublishEntry], published_at_ms: i64) -> Result<Vec<u8>, UplinkError> {
    let envelope = DataEnvelope {
        published_at_ms,
        entries,
    };
    serde_json::to_vec(&envelope).map_err(|err| UplinkError::Payload(err.to_string()))
}

fn notification_message(
    prefix: &str,
    notification: &Notification,
) -> Result<(String, Vec<u8>), UplinkError> {
    let encoded = match notification {
        Notification::ChannelState(event) => (
            format!("{}/channel-state/{}", prefix, event.state.as_str()),
            serde_json::to_vec(event),
        ),
        Notification::Backpressure(event) => {
            (format!("{}/backpressure", prefix), serde_json::to_vec(event))
        }
    };
    let (topic, payload) = encoded;
    let payload = payload.map_err(|err| UplinkError::Payload(err.to_string()))?;
    Ok((topic, payload))
}

fn telemetry_topic(prefix: &str) -> String {
    format!("{}/telemetry", prefix)
}

fn qos_from_u8(value: u8) -> QoS {
    match value {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{
        BackpressureEvent, BackpressureLevel, ChannelStateEvent, ChannelStatus, Quality,
        TimedValue, Variant,
    };

    #[test]
    fn channel_state_topic_uses_status() {
        let notification = Notification::ChannelState(ChannelStateEvent::new(
            "channel-1",
            ChannelStatus::FailedDeleted,
            Some("401".to_string()),
        ));
        let (topic, payload) = notification_message("site-a", &notification).expect("message");
        assert_eq!(topic, "site-a/channel-state/failed-deleted");
        let value: serde_json::Value = serde_json::from_slice(&payload).expect("json");
        assert_eq!(value["channelId"], "channel-1");
        assert_eq!(value["state"], "failed-deleted");
        assert_eq!(value["detail"], "401");
    }

    #[test]
    fn backpressure_payload_is_camel_case() {
        let notification = Notification::Backpressure(BackpressureEvent {
            level: BackpressureLevel::DropEngaged,
            utilization_percent: 46.5,
        });
        let (topic, payload) = notification_message("edge", &notification).expect("message");
        assert_eq!(topic, "edge/backpressure");
        let value: serde_json::Value = serde_json::from_slice(&payload).expect("json");
        assert_eq!(value["level"], "drop-engaged");
        assert_eq!(value["utilizationPercent"], 46.5);
    }

    #[test]
    fn data_payload_wraps_entries() {
        let entries = vec![PublishEntry {
            entry_id: "e1".to_string(),
            series_key: r"\\pi\flow".to_string(),
            values: vec![TimedValue::new(
                1_714_557_600,
                500,
                Variant::Double(1.5),
                Quality::Good,
            )],
        }];
        let payload = data_payload(&entries, 1_714_557_600_123).expect("payload");
        let value: serde_json::Value = serde_json::from_slice(&payload).expect("json");
        assert_eq!(value["publishedAtMs"], 1_714_557_600_123_i64);
        let entry = &value["entries"][0];
        assert_eq!(entry["entryId"], "e1");
        assert_eq!(entry["seriesKey"], r"\\pi\flow");
        assert_eq!(entry["values"][0]["epochSeconds"], 1_714_557_600_i64);
        assert_eq!(entry["values"][0]["nanoOffset"], 500);
        assert_eq!(entry["values"][0]["value"]["double"], 1.5);
        assert_eq!(entry["values"][0]["quality"], "GOOD");
    }

    #[test]
    fn telemetry_topic_under_prefix() {
        assert_eq!(telemetry_topic("edge"), "edge/telemetry");
        assert_eq!(qos_from_u8(7), QoS::AtLeastOnce);
    }
}
