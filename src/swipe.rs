//! Card decoder module.
//! Parses the single-track text read from a magnetic-stripe ID card.
//! Layout: `%<net id>?;<9-digit student id>=<4 digits>?`
//! The net id is lower-cased because the Contacts lookup is case-sensitive.

use regex::Regex;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

// Digits are ASCII only. The net id excludes line terminators and U+FFFD,
// which marks bytes that were not valid UTF-8 on the wire.
static CARD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^%([^\n\r\x{2028}\x{2029}\x{FFFD}]*)\?;([0-9]{9})=([0-9]{4})\?$")
        .expect("card pattern is a valid regex")
});

/// Identity extracted from one card swipe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwipeRecord {
    pub net_id: String,
    pub student_id: String,
}

/// The swipe text did not match the card layout.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("invalid card swipe")]
pub struct InvalidSwipe;

/// Parses raw swipe text into a [`SwipeRecord`].
///
/// No partial parses: anything that doesn't match the full layout is rejected
/// with [`InvalidSwipe`].
pub fn parse(raw: &str) -> Result<SwipeRecord, InvalidSwipe> {
    let captures = CARD_PATTERN.captures(raw).ok_or(InvalidSwipe)?;

    // Groups 1 and 2 are not optional, so a match always carries them
    let (Some(net_id), Some(student_id)) = (captures.get(1), captures.get(2)) else {
        return Err(InvalidSwipe);
    };

    Ok(SwipeRecord {
        net_id: net_id.as_str().to_lowercase(),
        student_id: student_id.as_str().to_string(),
    })
}

impl FromStr for SwipeRecord {
    type Err = InvalidSwipe;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}
