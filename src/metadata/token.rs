use std::fmt;
use std::hash::{Hash, Hasher};

/// A metadata token representing a reference to a row of one of the module's tables.
///
/// Tokens consist of a 32-bit value where:
/// - The high byte (bits 24-31) indicates the table type
/// - The low 24 bits (bits 0-23) indicate the 1-based row index within that table
///
/// The table identifiers match ECMA-335 so that tokens embedded in CIL operands keep their
/// usual meaning (`0x06` method definitions, `0x0A` member references, `0x70` user strings).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Token(pub u32);

impl Token {
    /// Table id of type references (imported types).
    pub const TYPE_REF: u8 = 0x01;
    /// Table id of type definitions.
    pub const TYPE_DEF: u8 = 0x02;
    /// Table id of field definitions.
    pub const FIELD: u8 = 0x04;
    /// Table id of method definitions.
    pub const METHOD_DEF: u8 = 0x06;
    /// Table id of member references (imported methods and fields).
    pub const MEMBER_REF: u8 = 0x0A;
    /// Table id of the user-string heap.
    pub const USER_STRING: u8 = 0x70;

    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Creates a token from a table id and a 1-based row.
    ///
    /// Rows beyond 24 bits are truncated to the row field.
    #[must_use]
    pub fn from_parts(table: u8, row: u32) -> Self {
        Token((u32::from(table) << 24) | (row & 0x00FF_FFFF))
    }

    /// Returns the raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Extracts the table type from the token (high byte)
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Extracts the row index from the token (low 24 bits)
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns true if this is a null token (value 0)
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the token names something defined in another module.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self.table(), Self::TYPE_REF | Self::MEMBER_REF)
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_token_parts() {
        let token = Token::from_parts(Token::MEMBER_REF, 3);
        assert_eq!(token.value(), 0x0A00_0003);
        assert_eq!(token.table(), 0x0A);
        assert_eq!(token.row(), 3);
        assert!(token.is_reference());

        let token = Token::from_parts(Token::METHOD_DEF, 0x0100_0001);
        assert_eq!(token.row(), 1);
        assert!(!token.is_reference());
    }

    #[test]
    fn test_token_is_null() {
        assert!(Token(0).is_null());
        assert!(!Token(0x0600_0001).is_null());
    }

    #[test]
    fn test_token_from_conversion() {
        let value = 0x0400_0002_u32;
        let token: Token = value.into();
        assert_eq!(token.value(), value);

        let back_to_u32: u32 = token.into();
        assert_eq!(back_to_u32, value);
    }

    #[test]
    fn test_token_display() {
        assert_eq!(format!("{}", Token(0x7000_0001)), "0x70000001");

        let debug_str = format!("{:?}", Token(0x0600_0001));
        assert!(debug_str.contains("Token(0x06000001"));
        assert!(debug_str.contains("table: 0x06"));
        assert!(debug_str.contains("row: 1"));
    }

    #[test]
    fn test_token_ordering_and_hash() {
        let token1 = Token(0x0600_0001);
        let token2 = Token(0x0600_0002);
        let token3 = Token(0x0A00_0001);
        assert!(token1 < token2);
        assert!(token2 < token3);

        let mut map = HashMap::new();
        map.insert(token1, "MoveNext");
        map.insert(token3, "GetKey");
        assert_eq!(map.get(&token1), Some(&"MoveNext"));
        assert_eq!(map.get(&token3), Some(&"GetKey"));
    }
}
