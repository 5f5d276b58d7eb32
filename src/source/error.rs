use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("RPC 请求失败: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("aria2 返回错误 ({code}): {message}")]
    Rpc { code: i64, message: String },

    #[error("响应解析失败: {0}")]
    InvalidResponse(String),
}

impl SourceError {
    /// aria2 对不存在的 GID 统一返回 "... not found" 的错误
    pub fn is_not_found(&self) -> bool {
        match self {
            SourceError::Rpc { message, .. } => message.to_lowercase().contains("not found"),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidResponse(e.to_string())
    }
}
