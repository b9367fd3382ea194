//! 推送通道消息解码。
//!
//! 消息格式：`{"Items":[{"Path": "...", "Items":[{"Timestamp", "Value", "Good"}]}]}`，
//! 每个外层条目对应一个序列，序列键取点位路径。

use crate::error::PipelineError;
use chrono::DateTime;
use domain::{Quality, TimedValue, Variant};
use serde::Deserialize;
use serde_json::Value;

/// 一个序列的解码结果。
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesUpdate {
    pub series_key: String,
    pub values: Vec<TimedValue>,
}

impl SeriesUpdate {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct ChannelPayload {
    #[serde(rename = "Items")]
    items: Option<Vec<StreamItem>>,
}

#[derive(Debug, Deserialize)]
struct StreamItem {
    #[serde(rename = "Path")]
    path: String,
    #[serde(rename = "Items", default)]
    items: Vec<RawValue>,
}

#[derive(Debug, Deserialize)]
struct RawValue {
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "Value")]
    value: Value,
    #[serde(rename = "Good", default)]
    good: bool,
}

/// 解码一条通道消息。任一值无法解码时整条消息作废。
pub fn decode_channel_message(payload: &str) -> Result<Vec<SeriesUpdate>, PipelineError> {
    let message: ChannelPayload =
        serde_json::from_str(payload).map_err(|err| PipelineError::Decode(err.to_string()))?;
    let items = message
        .items
        .ok_or_else(|| PipelineError::Decode("missing Items".to_string()))?;
    items
        .into_iter()
        .map(|item| {
            let values = item
                .items
                .into_iter()
                .map(decode_value)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(SeriesUpdate {
                series_key: item.path,
                values,
            })
        })
        .collect()
}

fn decode_value(raw: RawValue) -> Result<TimedValue, PipelineError> {
    let timestamp = DateTime::parse_from_rfc3339(raw.timestamp.trim()).map_err(|err| {
        PipelineError::Decode(format!("timestamp {:?}: {}", raw.timestamp, err))
    })?;
    let value = decode_variant(raw.value)?;
    // 历史库不提供 BAD，非 GOOD 一律 UNCERTAIN
    let quality = if raw.good {
        Quality::Good
    } else {
        Quality::Uncertain
    };
    Ok(TimedValue::new(
        timestamp.timestamp(),
        timestamp.timestamp_subsec_nanos() as i32,
        value,
        quality,
    ))
}

fn decode_variant(value: Value) -> Result<Variant, PipelineError> {
    match value {
        Value::Number(number) => number
            .as_f64()
            .map(Variant::Double)
            .ok_or_else(|| PipelineError::Decode(format!("unrepresentable number {}", number))),
        Value::String(text) => Ok(Variant::String(text)),
        Value::Bool(flag) => Ok(Variant::Bool(flag)),
        // 数字状态量：取状态名
        Value::Object(mut object) => match object.remove("Name") {
            Some(Value::String(name)) => Ok(Variant::String(name)),
            _ => Err(PipelineError::Decode(format!(
                "unsupported value object {}",
                Value::Object(object)
            ))),
        },
        other => Err(PipelineError::Decode(format!("unsupported value {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_typed_values() {
        let payload = r#"{"Links":{},"Items":[
            {"WebId":"W1","Name":"Flow","Path":"\\\\pi\\flow","Items":[
                {"Timestamp":"2024-05-01T10:00:00.1234567Z","Value":12.5,"Good":true},
                {"Timestamp":"2024-05-01T10:00:01Z","Value":"text","Good":false},
                {"Timestamp":"2024-05-01T10:00:02Z","Value":true,"Good":true},
                {"Timestamp":"2024-05-01T10:00:03Z","Value":{"Name":"Running","Value":1},"Good":true}
            ]}
        ]}"#;
        let updates = decode_channel_message(payload).expect("decode");
        assert_eq!(updates.len(), 1);
        let update = &updates[0];
        assert_eq!(update.series_key, r"\\pi\flow");
        assert_eq!(update.len(), 4);
        assert_eq!(update.values[0].epoch_seconds, 1_714_557_600);
        assert_eq!(update.values[0].nano_offset, 123_456_700);
        assert_eq!(update.values[0].value, Variant::Double(12.5));
        assert_eq!(update.values[1].quality, Quality::Uncertain);
        assert_eq!(update.values[2].value, Variant::Bool(true));
        assert_eq!(update.values[3].value, Variant::String("Running".to_string()));
    }

    #[test]
    fn one_bad_value_discards_message() {
        let payload = r#"{"Items":[
            {"Path":"a","Items":[{"Timestamp":"2024-05-01T10:00:00Z","Value":1,"Good":true}]},
            {"Path":"b","Items":[{"Timestamp":"2024-05-01T10:00:00Z","Value":[1,2],"Good":true}]}
        ]}"#;
        assert!(matches!(
            decode_channel_message(payload),
            Err(PipelineError::Decode(_))
        ));
    }

    #[test]
    fn rejects_missing_items_and_bad_timestamp() {
        assert!(decode_channel_message(r#"{"Links":{}}"#).is_err());
        assert!(decode_channel_message("not json").is_err());
        let payload =
            r#"{"Items":[{"Path":"a","Items":[{"Timestamp":"yesterday","Value":1,"Good":true}]}]}"#;
        assert!(decode_channel_message(payload).is_err());
    }
}
