#[derive(Debug, thiserror::Error)]
pub enum EgressError {
    #[error("port allocation failed: {0}")]
    Port(#[from] std::io::Error),
    #[error("sfu failure: {0}")]
    Sfu(#[from] auricle_sfu::SfuError),
    #[error("pipeline failure: {0}")]
    Pipeline(#[from] auricle_pipeline::PipelineError),
    #[error("egress start exhausted {attempts} retries, last error: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}
