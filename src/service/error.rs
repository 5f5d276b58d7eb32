use thiserror::Error;

use crate::mover::AdmissionError;
use crate::source::SourceError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error("请求无效: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Source(#[from] SourceError),
}
