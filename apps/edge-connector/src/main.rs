//! 边缘连接器：历史库推送通道 → 批量发布 → MQTT 上行。

mod ingest;
mod points;
mod reporter;

use edge_config::AppConfig;
use edge_pipeline::{
    BackpressureConfig, BackpressureMonitor, PublishQueue, PublishQueueConfig, SysinfoSampler,
};
use edge_streaming::{ChannelPool, ChannelPoolConfig, WsConnector, WsConnectorConfig};
use edge_telemetry::{init_tracing, shared_metrics};
use edge_uplink::{MqttUplink, MqttUplinkConfig};
use ingest::IngestHandler;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 空闲超时相对心跳间隔的倍数。
const IDLE_HEARTBEATS: u64 = 6;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在）
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();
    let metrics = shared_metrics();

    // MQTT 上行：数据发布 + 通知 + 遥测
    let (uplink, uplink_loop) = MqttUplink::connect(MqttUplinkConfig {
        host: config.mqtt_host.clone(),
        port: config.mqtt_port,
        username: config.mqtt_username.clone(),
        password: config.mqtt_password.clone(),
        topic_prefix: config.mqtt_topic_prefix.clone(),
        data_topic: config.mqtt_data_topic.clone(),
        qos: config.mqtt_qos,
    })?;
    let uplink = Arc::new(uplink);

    let queue = PublishQueue::new(
        PublishQueueConfig {
            max_publish_rate: config.max_publish_rate,
            series_batch_size: config.series_batch_size,
            value_batch_size: config.value_batch_size,
            max_age_seconds: config.max_age_seconds,
        },
        uplink.clone(),
        metrics.clone(),
    )?;
    let monitor = BackpressureMonitor::new(
        BackpressureConfig {
            sample_interval: Duration::from_secs(config.memory_sample_seconds),
            drop_threshold_pct: config.memory_drop_threshold_pct,
            restart_threshold_pct: config.memory_restart_threshold_pct,
        },
        uplink.clone(),
    )?;

    let connector = WsConnector::new(WsConnectorConfig {
        server_url: config.pi_server_url.clone(),
        api_root_path: config.pi_api_root_path.clone(),
        username: config.pi_username.clone(),
        password: config.pi_password.clone(),
        verify_ssl: config.pi_verify_ssl,
        heartbeat_rate: config.pi_heartbeat_rate,
        handshake_wait: Duration::from_millis(config.handshake_wait_ms),
        connect_timeout: Duration::from_millis(config.connect_timeout_ms),
        idle_timeout: Duration::from_secs(config.pi_heartbeat_rate * IDLE_HEARTBEATS),
    })?;
    let (pool, events) = ChannelPool::new(
        ChannelPoolConfig {
            max_channels: config.max_channels,
            max_points_per_channel: config.max_points_per_channel,
        },
        Arc::new(connector),
        uplink.clone(),
    )?;

    let handler = Arc::new(IngestHandler::new(monitor.clone(), queue.clone()));
    let event_loop = pool.spawn_event_loop(events, handler.clone());
    let flush_timer = queue.spawn_flush_timer();
    let sampler = monitor.spawn(Arc::new(SysinfoSampler::new()));
    let reporter = reporter::spawn_telemetry_reporter(
        config.telemetry_interval_seconds,
        metrics.clone(),
        queue.clone(),
        monitor.clone(),
        uplink.clone(),
    );
    info!(
        target: "edge.connector",
        pi_server = %config.pi_server_url,
        max_channels = config.max_channels,
        max_points_per_channel = config.max_points_per_channel,
        flush_interval_ms = queue.flush_interval().as_millis() as u64,
        "edge_connector_started"
    );

    if let Some(path) = config.points_file.as_deref() {
        let points = points::load_points(path).await?;
        let queued = pool.enqueue_all(points)?;
        info!(target: "edge.connector", path = %path, queued = queued, "points_file_loaded");
        match pool.activate_pending().await {
            Ok(report) => info!(
                target: "edge.connector",
                channels = report.channels,
                points = report.points,
                "points_activated"
            ),
            Err(err) => warn!(target: "edge.connector", error = %err, "points_activation_incomplete"),
        }
    }

    tokio::signal::ctrl_c().await?;
    info!(target: "edge.connector", "shutdown_requested");

    pool.clear_queue();
    let deleted = pool.delete_all();
    let flushed = queue.flush_tick().await;
    info!(
        target: "edge.connector",
        deleted_channels = deleted.channels,
        deleted_points = deleted.points,
        flushed_series = flushed.series,
        unflushed_series = queue.queued_series(),
        dropped_messages = handler.dropped_messages(),
        "edge_connector_stopped"
    );

    for task in [event_loop, flush_timer, sampler, reporter, uplink_loop] {
        task.abort();
    }
    Ok(())
}
