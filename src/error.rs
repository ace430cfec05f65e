use thiserror::Error;

/// Error codes reported by fallible bigint operations.
///
/// The `Display` strings are the short English descriptions of each code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// Allocation failed, or a caller-provided buffer is too small.
    #[error("not enough memory")]
    NotEnoughMemory,
    /// Division or remainder with a zero divisor.
    #[error("divide by zero")]
    DivideByZero,
    /// A value does not fit the fixed-width target of a conversion.
    #[error("value too large")]
    ValueTooLarge,
    /// Malformed input, e.g. no digits where a number was expected.
    #[error("invalid argument")]
    InvalidArgument,
}
