use std::io;

use thiserror::Error;

use crate::wire::MAX_NUMBER_BYTES;

/// Largest accepted security constant: four numbers per tuple within one
/// integer frame's byte budget.
pub const MAX_SECURITY_CONSTANT: usize = (MAX_NUMBER_BYTES / 4) as usize;

/// Errors raised by the protocol engine and its persistence helpers.
///
/// Policy rejections, failed cut-and-choose checks and detected fraud are
/// protocol outcomes, not errors; see the `Outcome` types of each role.
#[derive(Debug, Error)]
pub enum Error {
    #[error("evote: transport failure: {0}")]
    Io(#[from] io::Error),

    #[error("evote: protocol violation: {0}")]
    Protocol(String),

    #[error("evote: malformed {what}: {detail}")]
    Parse { what: &'static str, detail: String },

    #[error("evote: value has no inverse modulo n")]
    NotInvertible,

    #[error("evote: security constant {0} is outside 2..={}", MAX_SECURITY_CONSTANT)]
    InvalidSecurityConstant(usize),

    #[error("evote: security constant mismatch: credential holds {local}, peer expects {remote}")]
    SecurityConstantMismatch { local: usize, remote: usize },

    #[error("evote: key generation failed: {0}")]
    KeyGeneration(String),
}

pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    pub(crate) fn parse(what: &'static str, detail: impl ToString) -> Self {
        Error::Parse {
            what,
            detail: detail.to_string(),
        }
    }
}

/// Rejects security constants for which one of the two challenges is empty,
/// and those too large to hold in memory.
pub fn check_security_constant(k: usize) -> Result<usize> {
    if k < 2 || k > MAX_SECURITY_CONSTANT {
        Err(Error::InvalidSecurityConstant(k))
    } else {
        Ok(k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_constant_policy() {
        assert!(matches!(
            check_security_constant(0),
            Err(Error::InvalidSecurityConstant(0))
        ));
        assert!(matches!(
            check_security_constant(1),
            Err(Error::InvalidSecurityConstant(1))
        ));
        assert_eq!(check_security_constant(2).unwrap(), 2);
        assert_eq!(check_security_constant(10).unwrap(), 10);
        assert_eq!(
            check_security_constant(MAX_SECURITY_CONSTANT).unwrap(),
            MAX_SECURITY_CONSTANT
        );
        assert!(matches!(
            check_security_constant(MAX_SECURITY_CONSTANT + 1),
            Err(Error::InvalidSecurityConstant(_))
        ));
    }
}
