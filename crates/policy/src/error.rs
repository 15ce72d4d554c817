use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Policy parameters from configuration are invalid: {0}")]
    InvalidParameters(String),
}
