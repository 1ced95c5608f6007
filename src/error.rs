use thiserror::Error;

/// Error kinds produced by the biflow pairing engine and its components.
///
/// `NotFound` deliberately has no variant here: a failed cache lookup is a
/// normal control-flow branch, not an error, so lookup paths return
/// `Option<T>` instead of threading a `NotFound` through `Result`.
#[derive(Error, Debug)]
pub enum Error {
    /// A record or generated template body could not be parsed or is
    /// missing a required field. Recoverable: the caller passes the
    /// offending record through unchanged.
    #[error("format error: {0}")]
    Format(String),

    /// Appending a record would push the current message past the
    /// 65,535-byte IPFIX cap. The caller must flush and retry.
    #[error("message would overflow the 65535-byte cap")]
    Overflow,

    /// Allocation failure while growing a buffer, copying a template, or
    /// building an envelope. Fatal for the current message.
    #[error("allocation failure: {0}")]
    OutOfMemory(String),

    /// A component was used out of its state machine (e.g. `add_record`
    /// before `init`), or an invalid set id was requested. Programmer bug.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// The host pipeline refused to accept a finished message or a
    /// registered template.
    #[error("host pipeline rejected the operation: {0}")]
    HostRejected(String),
}

pub type Result<T> = std::result::Result<T, Error>;
