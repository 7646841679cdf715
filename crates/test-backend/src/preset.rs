/// A scripted completion response.
///
/// The response streams its deltas one by one with a small delay in
/// between, then signals completion, mimicking how a real backend
/// delivers fragments.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PresetResponse {
    /// The text deltas to stream, in order.
    pub deltas: Vec<String>,
    /// Whether the request should fail at the transport level instead
    /// of streaming anything.
    pub fail: bool,
}

impl PresetResponse {
    /// Creates a `PresetResponse` that streams the given deltas.
    #[inline]
    pub fn with_deltas<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            deltas: deltas.into_iter().map(Into::into).collect(),
            fail: false,
        }
    }

    /// Creates a `PresetResponse` that fails the request outright.
    #[inline]
    pub fn failing() -> Self {
        Self {
            deltas: vec![],
            fail: true,
        }
    }
}
