/// Errors from probing an API through an interface endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("invalid API URL: {0}")]
    InvalidUrl(String),

    #[error("missing {0} in the environment")]
    MissingVariable(&'static str),

    #[error("DNS lookup for {host} failed: {reason}")]
    DnsLookup { host: String, reason: String },

    #[error("request to {url} failed: {reason}")]
    Http { url: String, reason: String },
}

impl From<url::ParseError> for ProbeError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}
