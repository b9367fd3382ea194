/// 发布链路错误。
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid config: {0}")]
    Config(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("publish error: {0}")]
    Publish(String),
    #[error("memory sample error: {0}")]
    Sample(String),
}
