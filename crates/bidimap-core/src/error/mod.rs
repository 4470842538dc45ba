//! BiDi-level error taxonomy and wire response mapping.

#[cfg(test)]
mod tests;

/// Errors produced by mapper session operations.
///
/// Every public operation on [`crate::session::MapperSession`] returns this
/// error type. [`BidiError::code`] renders the BiDi wire error code; the
/// `Display` message is sent as the response's `message` field.
#[derive(Debug, thiserror::Error)]
pub enum BidiError {
    /// A command's parameters were structurally invalid, referenced a value
    /// of the wrong type or realm, or violated an operation's preconditions.
    #[error("{0}")]
    InvalidArgument(String),

    /// A command referenced a browsing context id that does not exist.
    #[error("{0}")]
    NoSuchFrame(String),

    /// A command referenced a preload script id that does not exist.
    #[error("{0}")]
    NoSuchScript(String),

    /// The requested operation is recognized but not implemented.
    #[error("{0}")]
    UnsupportedOperation(String),

    /// The command's method was not in the recognized dispatch table.
    #[error("{0}")]
    UnknownCommand(String),

    /// A CDP round-trip or internal invariant failed in a way not covered
    /// by the other variants.
    #[error("{0}")]
    Unknown(String),

    /// A CDP round-trip underlying the operation failed.
    #[error(transparent)]
    Cdp(#[from] bidimap_cdp::CdpError),
}

impl BidiError {
    /// The BiDi wire error code for this error, per the recognized set.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid argument",
            Self::NoSuchFrame(_) => "no such frame",
            Self::NoSuchScript(_) => "no such script",
            Self::UnsupportedOperation(_) => "unsupported operation",
            Self::UnknownCommand(_) => "unknown command",
            Self::Unknown(_) | Self::Cdp(_) => "unknown error",
        }
    }

    /// Render this error as a BiDi error response body for command `id`.
    ///
    /// `id` is `None` when the originating command id itself could not be
    /// recovered (e.g. malformed input).
    #[must_use]
    pub fn into_response(self, id: Option<u64>) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "error": self.code(),
            "message": self.to_string(),
        })
    }
}

/// Convenience alias for fallible mapper operations.
pub type Result<T> = std::result::Result<T, BidiError>;
