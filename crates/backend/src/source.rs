use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::service::BackendError;

/// How much of a data source is materialized before ingestion.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// A condensed rendition of the source.
    #[default]
    Summary,
    /// The complete source content.
    Full,
}

impl Granularity {
    /// Returns the wire representation of this granularity.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Summary => "summary",
            Granularity::Full => "full",
        }
    }
}

impl Display for Granularity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

/// The external content provider a client pulls data source text from.
///
/// Providers expose a flat namespace of source names and can materialize
/// the text of any named source at a given granularity.
pub trait SourceProvider: Send + Sync {
    /// The error type that may be returned by the provider.
    type Error: BackendError;

    /// Lists the names of the currently available sources.
    fn list_source_names(
        &self,
    ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + 'static;

    /// Fetches the raw text of the named source.
    fn fetch_source_text(
        &self,
        name: &str,
        granularity: Granularity,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'static;
}
