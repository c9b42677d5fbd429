//! The work a worker performs.

use num_bigint::BigInt;
use thiserror::Error;

/// Malformed task input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Invalid number {input:?}")]
    InvalidNumber { input: String },
}

/// Product of a comma-separated list of decimal integers of any size.
///
/// Whitespace around each number is ignored.
///
/// # Examples
///
/// ```rust
/// use herald_worker::task::multiply;
///
/// assert_eq!(multiply("2,3,4").unwrap().to_string(), "24");
/// ```
pub fn multiply(input: &str) -> Result<BigInt, TaskError> {
    input
        .split(',')
        .map(|number| {
            let number = number.trim();
            number
                .parse::<BigInt>()
                .map_err(|_| TaskError::InvalidNumber {
                    input: number.to_string(),
                })
        })
        .product()
}
