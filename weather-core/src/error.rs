use thiserror::Error;

/// Errors surfaced by [`crate::Aggregator`].
#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("no weather providers available")]
    NoProvidersAvailable,

    /// One adapter's call failed or was cancelled. Collected, never returned on its own.
    #[error("{provider}: {cause}")]
    ProviderCallFailed { provider: String, cause: String },

    #[error("all providers failed: {}", .messages.join("; "))]
    AllProvidersFailed { messages: Vec<String> },

    #[error("providers returned no usable data")]
    EmptyResultSet,
}

impl AggregatorError {
    /// Per-provider messages when every provider failed.
    pub fn provider_messages(&self) -> &[String] {
        match self {
            AggregatorError::AllProvidersFailed { messages } => messages,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_call_failed_is_tagged_with_name() {
        let err = AggregatorError::ProviderCallFailed {
            provider: "WeatherAPI".into(),
            cause: "city not found".into(),
        };
        assert_eq!(err.to_string(), "WeatherAPI: city not found");
    }

    #[test]
    fn all_providers_failed_lists_messages() {
        let err = AggregatorError::AllProvidersFailed {
            messages: vec!["A: timeout".into(), "B: 500".into()],
        };
        assert_eq!(err.to_string(), "all providers failed: A: timeout; B: 500");
        assert_eq!(err.provider_messages().len(), 2);
        let empty = AggregatorError::EmptyResultSet;
        assert!(empty.provider_messages().is_empty());
    }
}
