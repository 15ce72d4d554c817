use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventsError {
    #[error("Scheduler event could not be encoded as JSON: {0}")]
    Encode(#[from] serde_json::Error),
}
