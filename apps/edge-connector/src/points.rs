//! 启动点位清单加载。
//!
//! 文件为 JSON 数组：`[{"id": "...", "displayName": "...", "path": "..."}]`，
//! `displayName` 缺省时取路径最后一段。

use domain::PointIdentity;
use serde::Deserialize;

/// 点位清单错误。
#[derive(Debug, thiserror::Error)]
pub enum PointsError {
    #[error("read {0}: {1}")]
    Io(String, String),
    #[error("parse points: {0}")]
    Parse(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PointRecord {
    #[serde(alias = "webId")]
    id: String,
    #[serde(alias = "name", default)]
    display_name: Option<String>,
    path: String,
}

impl From<PointRecord> for PointIdentity {
    fn from(record: PointRecord) -> Self {
        let display_name = record.display_name.unwrap_or_else(|| {
            record
                .path
                .rsplit(['\\', '/'])
                .next()
                .unwrap_or_default()
                .to_string()
        });
        PointIdentity::new(record.id, display_name, record.path)
    }
}

pub fn parse_points(content: &str) -> Result<Vec<PointIdentity>, PointsError> {
    let records: Vec<PointRecord> =
        serde_json::from_str(content).map_err(|err| PointsError::Parse(err.to_string()))?;
    Ok(records.into_iter().map(PointIdentity::from).collect())
}

pub async fn load_points(path: &str) -> Result<Vec<PointIdentity>, PointsError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| PointsError::Io(path.to_string(), err.to_string()))?;
    parse_points(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_records_with_aliases() {
        let content = r#"[
            {"id": "P1", "displayName": "Flow", "path": "\\\\pi\\plant\\flow"},
            {"webId": "P2", "path": "\\\\pi\\plant\\temp"}
        ]"#;
        let points = parse_points(content).expect("points");
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].display_name, "Flow");
        assert_eq!(points[1].id, "P2");
        assert_eq!(points[1].display_name, "temp");
    }

    #[test]
    fn rejects_malformed_file() {
        assert!(matches!(
            parse_points(r#"[{"id": "P1"}]"#),
            Err(PointsError::Parse(_))
        ));
    }
}
