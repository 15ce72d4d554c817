use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CoreError {
    #[error("'{0}' is not a known error kind")]
    UnknownErrorKind(String),
}
