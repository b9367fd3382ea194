use serde::{Deserialize, Serialize};

/// 纳秒偏移的精度（100ns）。
const NANO_GRANULARITY: i32 = 100;
const NANOS_PER_SECOND: i32 = 1_000_000_000;

/// 点位值的数据类型。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Variant {
    Double(f64),
    String(String),
    Bool(bool),
}

/// 数据质量。历史库不区分 BAD，非 GOOD 一律视为 UNCERTAIN。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Quality {
    Good,
    Uncertain,
}

/// 带时间戳与质量的点位值（TQV）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedValue {
    pub epoch_seconds: i64,
    /// 秒内纳秒偏移，0..=999_999_900，按 100ns 截断。
    pub nano_offset: i32,
    pub value: Variant,
    pub quality: Quality,
}

impl TimedValue {
    pub fn new(epoch_seconds: i64, nano_offset: i32, value: Variant, quality: Quality) -> Self {
        let nano_offset = nano_offset.clamp(0, NANOS_PER_SECOND - 1);
        Self {
            epoch_seconds,
            nano_offset: nano_offset - nano_offset % NANO_GRANULARITY,
            value,
            quality,
        }
    }

    /// 由毫秒时间戳构造。
    pub fn from_epoch_ms(ts_ms: i64, value: Variant, quality: Quality) -> Self {
        let epoch_seconds = ts_ms.div_euclid(1000);
        let nano_offset = (ts_ms.rem_euclid(1000) as i32) * 1_000_000;
        Self::new(epoch_seconds, nano_offset, value, quality)
    }
}
