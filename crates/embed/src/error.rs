use thiserror::Error;

/// Errors surfaced while turning image bytes into an embedding.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EmbedError {
    /// No bytes were supplied.
    #[error("image payload is empty")]
    EmptyInput,
    /// The bytes are not a decodable image in a supported format.
    #[error("failed to decode image: {0}")]
    Decode(String),
    /// The image decoded but produced a vector with no direction to normalize.
    #[error("image produced a degenerate embedding")]
    Degenerate,
    /// Configuration is inconsistent (e.g., a zero thumbnail side).
    #[error("invalid embed config: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_decode_carries_cause() {
        let err = EmbedError::Decode("unsupported format".into());
        assert!(err.to_string().contains("failed to decode image"));
        assert!(err.to_string().contains("unsupported format"));
    }

    #[test]
    fn error_invalid_config() {
        let err = EmbedError::InvalidConfig("histogram_bins must be between 1 and 16".into());
        assert!(err.to_string().contains("invalid embed config"));
        assert!(err.to_string().contains("histogram_bins"));
    }

    #[test]
    fn error_debug_formatting() {
        let debug_str = format!("{:?}", EmbedError::EmptyInput);
        assert!(debug_str.contains("EmptyInput"));
    }
}
