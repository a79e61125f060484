//! Room identifier.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ParseError;

/// Identifies a room for its whole lifetime.
///
/// Serialized as a JSON number; the string form (used for queue members and
/// pod labels) is the plain decimal integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(i64);

impl RoomId {
    /// Wraps a raw id.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }

    /// Parses the decimal string form.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        if s.is_empty() {
            return Err(ParseError::Empty);
        }

        s.parse::<i64>()
            .map(Self)
            .map_err(|_| ParseError::InvalidRoomId(s.to_string()))
    }
}

impl From<i64> for RoomId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RoomId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_room_id_display() {
        assert_eq!(RoomId::new(42).to_string(), "42");
        assert_eq!(RoomId::new(-7).to_string(), "-7");
    }

    #[test]
    fn test_room_id_empty() {
        let result: Result<RoomId, _> = "".parse();
        assert!(matches!(result.unwrap_err(), ParseError::Empty));
    }

    #[test]
    fn test_room_id_invalid() {
        let result: Result<RoomId, _> = "room-42".parse();
        assert!(matches!(result.unwrap_err(), ParseError::InvalidRoomId(_)));
    }

    #[test]
    fn test_room_id_serializes_as_number() {
        let json = serde_json::to_string(&RoomId::new(42)).unwrap();
        assert_eq!(json, "42");
        let parsed: RoomId = serde_json::from_str("42").unwrap();
        assert_eq!(parsed, RoomId::new(42));
    }

    proptest! {
        #[test]
        fn test_room_id_string_form_parses_back(raw in any::<i64>()) {
            let id = RoomId::new(raw);
            prop_assert_eq!(id.to_string().parse::<RoomId>().unwrap(), id);
        }
    }
}
