use std::fmt::Debug;

/// Builder for [`HttpConfig`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HttpConfigBuilder {
    api_url: String,
}

impl HttpConfigBuilder {
    /// Creates a builder with the given API URL.
    ///
    /// Trailing slashes are stripped, so `http://host:8001/` and
    /// `http://host:8001` configure the same endpoints.
    #[inline]
    pub fn with_api_url<S: Into<String>>(api_url: S) -> Self {
        let mut api_url = api_url.into();
        while api_url.ends_with('/') {
            api_url.pop();
        }
        Self { api_url }
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> HttpConfig {
        HttpConfig {
            base_url: format!("{}/v1", self.api_url),
        }
    }
}

/// Configuration for the HTTP backend.
///
/// All endpoints live under the versioned base path `{API_URL}/v1`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HttpConfig {
    pub(crate) base_url: String,
}

impl HttpConfig {
    #[inline]
    pub(crate) fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    #[inline]
    pub(crate) fn ingest_text_url(&self) -> String {
        format!("{}/ingest/text", self.base_url)
    }
}
