use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid tracker domain: {0:?}")]
    InvalidDomain(String),

    #[error("Invalid address for {field}: {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} is out of range: {1}")]
    OutOfRange(&'static str, usize),
}

/// Failures decoding a VERP return path.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerpError {
    #[error("Address has no domain: {0}")]
    MissingDomain(String),

    #[error("Address has no '=' between the recipient local part and domain: {0}")]
    MissingRecipientDomain(String),

    #[error("Address has no '{separator}' separator: {address}")]
    MissingSeparator { separator: char, address: String },
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("Unable to parse message: {0}")]
    Parse(#[from] mailparse::MailParseError),

    #[error("Message has no header block")]
    Empty,
}
