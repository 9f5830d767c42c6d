use thiserror::Error;

/// Errors returned by the image generation client.
#[derive(Debug, Error)]
pub enum ImageGenError {
    /// The WebUI could not be reached.
    #[error("cannot reach image service at {url}: {reason}")]
    Unreachable { url: String, reason: String },
    /// The request did not finish in time.
    #[error("image service timed out after {0}s")]
    Timeout(u64),
    /// Non-success HTTP status.
    #[error("image service returned {status}: {body}")]
    Status { status: u16, body: String },
    /// Transport failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// Response carried no image.
    #[error("image service returned no image")]
    NoImage,
    /// Response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
