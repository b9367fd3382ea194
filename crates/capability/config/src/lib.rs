//! 连接器运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 连接器运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub pi_server_url: String,
    pub pi_api_root_path: String,
    pub pi_username: String,
    pub pi_password: String,
    pub pi_verify_ssl: bool,
    pub pi_heartbeat_rate: u64,
    pub max_channels: usize,
    pub max_points_per_channel: usize,
    pub handshake_wait_ms: u64,
    pub connect_timeout_ms: u64,
    pub max_publish_rate: u64,
    pub series_batch_size: usize,
    pub value_batch_size: usize,
    pub max_age_seconds: u64,
    pub memory_sample_seconds: u64,
    pub memory_drop_threshold_pct: f64,
    pub memory_restart_threshold_pct: f64,
    pub telemetry_interval_seconds: u64,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_topic_prefix: String,
    pub mqtt_data_topic: String,
    pub mqtt_qos: u8,
    pub points_file: Option<String>,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let pi_server_url = read_required("EDGE_PI_SERVER_URL")?;
        if pi_server_url.len() <= 3 || !server_scheme_supported(&pi_server_url) {
            return Err(ConfigError::Invalid(
                "EDGE_PI_SERVER_URL".to_string(),
                pi_server_url,
            ));
        }
        let pi_api_root_path = env::var("EDGE_PI_API_ROOT_PATH")
            .unwrap_or_else(|_| "piwebapi".to_string())
            .trim_matches('/')
            .to_string();
        if pi_api_root_path.is_empty() {
            return Err(ConfigError::Invalid(
                "EDGE_PI_API_ROOT_PATH".to_string(),
                pi_api_root_path,
            ));
        }
        let pi_username = read_required("EDGE_PI_USERNAME")?;
        let pi_password = read_required("EDGE_PI_PASSWORD")?;
        let pi_verify_ssl = read_bool_with_default("EDGE_PI_VERIFY_SSL", true);
        let pi_heartbeat_rate = read_u64_in_range("EDGE_PI_HEARTBEAT_RATE", 10, 1, 600)?;
        let max_channels = read_u64_in_range("EDGE_MAX_CHANNELS", 5000, 1, 10_000)? as usize;
        let max_points_per_channel =
            read_u64_in_range("EDGE_MAX_POINTS_PER_CHANNEL", 100, 1, 100)? as usize;
        let handshake_wait_ms = read_u64_in_range("EDGE_HANDSHAKE_WAIT_MS", 100, 0, 10_000)?;
        let connect_timeout_ms =
            read_u64_in_range("EDGE_CONNECT_TIMEOUT_MS", 10_000, 100, 120_000)?;
        let max_publish_rate =
            read_u64_in_range("EDGE_MAX_PUBLISH_RATE", 5000, 1000, 100_000)?;
        let series_batch_size = read_u64_in_range("EDGE_SERIES_BATCH_SIZE", 10, 1, 10)? as usize;
        let value_batch_size = read_u64_in_range("EDGE_VALUE_BATCH_SIZE", 10, 1, 10)? as usize;
        let max_age_seconds = read_u64_in_range("EDGE_MAX_AGE_SECONDS", 300, 30, 3600)?;
        let memory_sample_seconds = read_u64_in_range("EDGE_MEMORY_SAMPLE_SECONDS", 20, 1, 3600)?;
        let memory_drop_threshold_pct =
            read_percent_with_default("EDGE_MEMORY_DROP_THRESHOLD_PCT", 45.0)?;
        let memory_restart_threshold_pct =
            read_percent_with_default("EDGE_MEMORY_RESTART_THRESHOLD_PCT", 44.0)?;
        if memory_restart_threshold_pct >= memory_drop_threshold_pct {
            return Err(ConfigError::Invalid(
                "EDGE_MEMORY_RESTART_THRESHOLD_PCT".to_string(),
                format!(
                    "{} (must be below drop threshold {})",
                    memory_restart_threshold_pct, memory_drop_threshold_pct
                ),
            ));
        }
        let telemetry_interval_seconds =
            read_u64_in_range("EDGE_TELEMETRY_INTERVAL_SECONDS", 10, 5, 60)?;
        let mqtt_host = env::var("EDGE_MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let mqtt_port = read_u16_with_default("EDGE_MQTT_PORT", 1883)?;
        let mqtt_username = read_optional("EDGE_MQTT_USERNAME");
        let mqtt_password = read_optional("EDGE_MQTT_PASSWORD");
        let mqtt_topic_prefix =
            env::var("EDGE_MQTT_TOPIC_PREFIX").unwrap_or_else(|_| "edge".to_string());
        let mqtt_data_topic = env::var("EDGE_MQTT_DATA_TOPIC").unwrap_or_else(|_| {
            format!("{}/data", mqtt_topic_prefix.trim_end_matches('/'))
        });
        let mqtt_qos = read_u64_in_range("EDGE_MQTT_QOS", 1, 0, 2)? as u8;
        let points_file = read_optional("EDGE_POINTS_FILE");

        Ok(Self {
            pi_server_url,
            pi_api_root_path,
            pi_username,
            pi_password,
            pi_verify_ssl,
            pi_heartbeat_rate,
            max_channels,
            max_points_per_channel,
            handshake_wait_ms,
            connect_timeout_ms,
            max_publish_rate,
            series_batch_size,
            value_batch_size,
            max_age_seconds,
            memory_sample_seconds,
            memory_drop_threshold_pct,
            memory_restart_threshold_pct,
            telemetry_interval_seconds,
            mqtt_host,
            mqtt_port,
            mqtt_username,
            mqtt_password,
            mqtt_topic_prefix,
            mqtt_data_topic,
            mqtt_qos,
            points_file,
        })
    }
}

/// 服务器地址可省略 scheme；若带 scheme，只接受 https/wss/http/ws。
fn server_scheme_supported(url: &str) -> bool {
    match url.trim().split_once("://") {
        Some((scheme, host)) => {
            !host.trim_matches('/').is_empty()
                && matches!(
                    scheme.to_ascii_lowercase().as_str(),
                    "https" | "wss" | "http" | "ws"
                )
        }
        None => true,
    }
}

fn read_required(key: &str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(key.to_string())),
    }
}

/// 读取 u64 类型环境变量并校验取值范围（含边界）。
fn read_u64_in_range(key: &str, default: u64, min: u64, max: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    let parsed = value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value.clone()))?;
    if parsed < min || parsed > max {
        return Err(ConfigError::Invalid(
            key.to_string(),
            format!("{} (expected {} - {})", parsed, min, max),
        ));
    }
    Ok(parsed)
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_percent_with_default(key: &str, default: f64) -> Result<f64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    match value.trim().parse::<f64>() {
        Ok(parsed) if parsed > 0.0 && parsed <= 100.0 => Ok(parsed),
        _ => Err(ConfigError::Invalid(key.to_string(), value)),
    }
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
