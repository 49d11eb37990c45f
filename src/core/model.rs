// MeshTail - core/model.rs
//
// Core data model types. Pure data definitions with no I/O and no
// platform dependencies.
//
// These types are the shared vocabulary across all layers.

use crate::util::constants::{FALLBACK_LABEL, MAX_LABEL_BYTES, MAX_LINE_BYTES};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Node address
// =============================================================================

/// Fixed-width (6 byte) node address, as carried in every mesh frame.
///
/// Rendered as 12 lowercase hex digits without separators (`a0dd6c0f31e4`),
/// which is also the form accepted by the selection endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeAddress(pub [u8; 6]);

impl NodeAddress {
    pub const LEN: usize = 6;

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Reasons a textual address is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressParseError {
    /// Not exactly 12 hex digits (after removing `:` / `-` separators).
    BadLength(usize),
    /// A non-hex character was found.
    BadDigit,
}

impl fmt::Display for AddressParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadLength(n) => write!(f, "expected 12 hex digits, got {n}"),
            Self::BadDigit => write!(f, "address contains a non-hex character"),
        }
    }
}

impl std::error::Error for AddressParseError {}

impl From<hex::FromHexError> for AddressParseError {
    fn from(e: hex::FromHexError) -> Self {
        match e {
            hex::FromHexError::InvalidHexCharacter { .. } => Self::BadDigit,
            hex::FromHexError::OddLength | hex::FromHexError::InvalidStringLength => {
                Self::BadLength(0)
            }
        }
    }
}

impl FromStr for NodeAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.trim().chars().filter(|c| *c != ':' && *c != '-').collect();
        if digits.len() != 2 * Self::LEN {
            return Err(AddressParseError::BadLength(digits.len()));
        }
        let mut out = [0u8; Self::LEN];
        hex::decode_to_slice(&digits, &mut out)?;
        Ok(Self(out))
    }
}

impl Serialize for NodeAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// =============================================================================
// Label
// =============================================================================

/// Short human-readable node label, capped at `MAX_LABEL_BYTES`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Label(String);

impl Label {
    /// Build a label, truncating to the cap. Empty input yields the
    /// fallback label so a node is never listed with a blank name.
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim_matches(char::from(0)).trim();
        if trimmed.is_empty() {
            return Self(FALLBACK_LABEL.to_string());
        }
        Self(truncate_utf8(trimmed, MAX_LABEL_BYTES).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Label {
    fn default() -> Self {
        Self(FALLBACK_LABEL.to_string())
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Source identity
// =============================================================================

/// Address + label pair identifying the originator of a line.
///
/// Equality is by address only: a label refresh never changes which
/// stream a line belongs to.
#[derive(Debug, Clone)]
pub struct SourceIdentity {
    pub address: NodeAddress,
    pub label: Label,
}

impl SourceIdentity {
    pub fn new(address: NodeAddress, label: Label) -> Self {
        Self { address, label }
    }
}

impl PartialEq for SourceIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for SourceIdentity {}

impl fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.label, self.address)
    }
}

// =============================================================================
// Line helpers
// =============================================================================

/// Truncate `s` to at most `max` bytes without splitting a character.
pub fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Normalise one log line for storage or transmission: strip the trailing
/// line terminator and cap the length at `MAX_LINE_BYTES`.
pub fn bound_line(line: &str) -> &str {
    truncate_utf8(line.trim_end_matches(['\r', '\n']), MAX_LINE_BYTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display_and_parse() {
        let addr: NodeAddress = "A0DD6C0F31E4".parse().unwrap();
        assert_eq!(addr.0, [0xa0, 0xdd, 0x6c, 0x0f, 0x31, 0xe4]);
        assert_eq!(addr.to_string(), "a0dd6c0f31e4");
        let colons: NodeAddress = "a0:dd:6c:0f:31:e4".parse().unwrap();
        assert_eq!(colons, addr);
    }

    #[test]
    fn test_address_rejects_bad_input() {
        assert_eq!(
            "a0dd6c".parse::<NodeAddress>(),
            Err(AddressParseError::BadLength(6))
        );
        assert_eq!(
            "a0dd6c0f31zz".parse::<NodeAddress>(),
            Err(AddressParseError::BadDigit)
        );
    }

    #[test]
    fn test_address_rejects_multibyte_input_of_matching_length() {
        // Twelve bytes, but not twelve hex digits.
        assert_eq!(
            "é0dd6c0f31".parse::<NodeAddress>(),
            Err(AddressParseError::BadDigit)
        );
        assert_eq!(NodeAddress([0, 1, 2, 0xab, 0xcd, 0xef]).to_string(), "000102abcdef");
    }

    #[test]
    fn test_label_is_capped_and_never_blank() {
        assert_eq!(Label::new("").as_str(), FALLBACK_LABEL);
        assert_eq!(Label::new("a-very-long-node-label").as_str().len(), MAX_LABEL_BYTES);
        assert_eq!(Label::new("kitchen\0\0\0").as_str(), "kitchen");
    }

    #[test]
    fn test_identity_equality_ignores_label() {
        let addr = NodeAddress([1, 2, 3, 4, 5, 6]);
        let a = SourceIdentity::new(addr, Label::new("one"));
        let b = SourceIdentity::new(addr, Label::new("two"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        // "é" is two bytes; cutting at 1 must not split it.
        assert_eq!(truncate_utf8("é", 1), "");
        assert_eq!(bound_line("hello\r\n"), "hello");
        let long = "x".repeat(MAX_LINE_BYTES + 40);
        assert_eq!(bound_line(&long).len(), MAX_LINE_BYTES);
    }
}
