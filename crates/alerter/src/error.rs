use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlerterError {
    #[error("Could not reach the Telegram Bot API: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Telegram rejected the alert (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
}
