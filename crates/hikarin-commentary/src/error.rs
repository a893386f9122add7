//! Commentary API errors

/// Failures talking to the text generation API
#[derive(thiserror::Error, Debug)]
pub enum CommentaryError {
    /// Connection, timeout or body read failure (the request URL is stripped)
    #[error("commentary request failed: {0}")]
    Http(reqwest::Error),

    /// Non-success HTTP status
    #[error("commentary API returned HTTP {0}")]
    Status(u16),

    /// The response body was not the expected JSON
    #[error("malformed commentary response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for CommentaryError {
    fn from(e: reqwest::Error) -> Self {
        // URL にはクエリの API キーが含まれるため落とす
        CommentaryError::Http(e.without_url())
    }
}
