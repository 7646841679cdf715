/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request could not be completed at the transport level: a
    /// non-successful HTTP status, a missing body, or a failed read.
    Transport,
    /// The backend sent data that violates the wire protocol.
    Protocol,
    /// Any other errors.
    Other,
}
