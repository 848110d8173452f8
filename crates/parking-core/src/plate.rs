//! License plate validation for the `AAA1A11` format.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

const PLATE_LEN: usize = 7;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlateError {
    #[error("invalid plate {0:?}: expected format AAA1A11")]
    InvalidFormat(String),
}

/// Returns true iff `s` is exactly three uppercase letters, a digit,
/// an uppercase letter and two digits.
///
/// No trimming or case folding is applied.
pub fn is_valid_plate(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() != PLATE_LEN {
        return false;
    }

    bytes.iter().enumerate().all(|(i, b)| match i {
        0..=2 | 4 => b.is_ascii_uppercase(),
        _ => b.is_ascii_digit(),
    })
}

/// A validated plate identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Plate(String);

impl Plate {
    pub fn parse(s: &str) -> Result<Self, PlateError> {
        if is_valid_plate(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(PlateError::InvalidFormat(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Plate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Plate {
    type Err = PlateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
