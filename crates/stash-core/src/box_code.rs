//! Human-facing box codes
//!
//! A box number `42` is printed on labels as `S-00000042`.

use regex::Regex;
use std::sync::LazyLock;

use crate::{Error, Result};

/// Prefix of every printed box code
pub const BOX_CODE_PREFIX: &str = "S-";

/// Largest number that fits the eight printed digits
pub const MAX_BOX_CODE: i64 = 99_999_999;

static BOX_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^S-([0-9]{8})$").expect("box code pattern is valid"));

/// Render a box number as its printed code. Only numbers in
/// `0..=MAX_BOX_CODE` render to a code that parses back.
pub fn format_box_code(code: i64) -> String {
    format!("{}{:08}", BOX_CODE_PREFIX, code)
}

/// Reject box numbers that have no printable code
pub fn check_box_code(code: i64) -> Result<i64> {
    if (0..=MAX_BOX_CODE).contains(&code) {
        Ok(code)
    } else {
        Err(Error::BoxCodeOutOfRange(code))
    }
}

/// Parse a printed code back into the box number. The input must be exactly
/// the code; callers trim user input themselves.
pub fn parse_box_code(input: &str) -> Result<i64> {
    let captures = BOX_CODE
        .captures(input)
        .ok_or_else(|| Error::InvalidBoxCode(input.to_string()))?;

    captures[1]
        .parse::<i64>()
        .map_err(|_| Error::InvalidBoxCode(input.to_string()))
}
