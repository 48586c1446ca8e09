use thiserror::Error;

/// Errors that can occur during wrapping number operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WrappingNumberError {
    /// The two values are further apart than a signed 16-bit distance can express
    #[error("Wrapping distance between {a} and {b} does not fit in an i16")]
    IntegerOverflow { a: u16, b: u16 },
}

/// Returns whether `s1` comes after `s2` in a wrapping u16 sequence.
/// Values within half the range of each other compare naturally; further
/// apart, the smaller one is treated as having wrapped.
pub fn sequence_greater_than(s1: u16, s2: u16) -> bool {
    ((s1 > s2) && (s1 - s2 <= 32768)) || ((s1 < s2) && (s2 - s1 > 32768))
}

/// Returns whether `s1` comes before `s2` in a wrapping u16 sequence
pub fn sequence_less_than(s1: u16, s2: u16) -> bool {
    sequence_greater_than(s2, s1)
}

/// Signed distance travelled going from `a` to `b` along the wrapping sequence.
///
/// ```
/// # use replica_shared::try_wrapping_diff;
/// assert_eq!(try_wrapping_diff(1, 2).unwrap(), 1);
/// assert_eq!(try_wrapping_diff(65535, 0).unwrap(), 1);
/// assert_eq!(try_wrapping_diff(0, 65535).unwrap(), -1);
/// ```
pub fn try_wrapping_diff(a: u16, b: u16) -> Result<i16, WrappingNumberError> {
    let forward = b.wrapping_sub(a);
    if forward <= i16::MAX as u16 {
        Ok(forward as i16)
    } else {
        let backward = a.wrapping_sub(b);
        if backward <= i16::MAX as u16 + 1 {
            Ok((backward as i32).wrapping_neg() as i16)
        } else {
            Err(WrappingNumberError::IntegerOverflow { a, b })
        }
    }
}

/// Signed distance travelled going from `a` to `b`.
///
/// # Panics
///
/// Never for valid u16 input; kept as a convenience over `try_wrapping_diff`.
pub fn wrapping_diff(a: u16, b: u16) -> i16 {
    match try_wrapping_diff(a, b) {
        Ok(diff) => diff,
        Err(err) => panic!("{}", err),
    }
}
