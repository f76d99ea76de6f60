use crate::packet::{ParseContext, PrimaryHeader};

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Malformed definition document, unresolved reference, circular
    /// inheritance, or an unsupported XTCE element. Fatal at load time.
    #[error("definition error: {0}")]
    Definition(String),

    #[error("not enough bytes: got {actual}, need {minimum}")]
    NotEnoughData { actual: usize, minimum: usize },

    /// Attempted read past the end of the packet buffer.
    #[error("bit read of {requested} bits at bit {position} exceeds packet size of {size} bits")]
    BitRead {
        position: usize,
        requested: usize,
        size: usize,
    },

    /// A comparison referenced a parameter not yet in the parse context, a
    /// literal could not be coerced, or a calibrator could not be applied.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// Container resolution failed for a packet. Carries the partial parse
    /// context and the last container reached.
    #[error(transparent)]
    Unrecognized(Box<UnrecognizedPacket>),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Details for a packet that could not be matched to a concrete container.
///
/// Produced when container resolution yields zero concrete candidates or
/// more than one, and when a bit-read or evaluation failure interrupts
/// parsing mid-packet. The context holds everything parsed before the
/// failure.
#[derive(Debug, Clone)]
pub struct UnrecognizedPacket {
    /// Name of the last container reached before resolution failed.
    pub container: String,
    pub reason: String,
    /// Parameters parsed before the failure, in parse order.
    pub partial: ParseContext,
    pub header: PrimaryHeader,
}

impl std::fmt::Display for UnrecognizedPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unrecognized packet (apid {}) at container {}: {}",
            self.header.apid, self.container, self.reason
        )
    }
}

impl std::error::Error for UnrecognizedPacket {}

impl Error {
    /// True for errors that end stream iteration rather than affecting a
    /// single packet.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Definition(_) | Error::Io(_) | Error::Csv(_))
    }
}
