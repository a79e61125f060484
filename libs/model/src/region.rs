//! Placement regions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ParseError;

/// Coarse placement constraint over cluster nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Region {
    /// Matches every node.
    #[default]
    Any,
    /// North America, east.
    Nae,
    /// North America, west.
    Naw,
    /// Europe, west.
    Euw,
    /// Europe, east.
    Eue,
    Asia,
}

impl Region {
    /// Every named region, excluding `ANY`.
    pub const NAMED: [Region; 5] = [
        Region::Nae,
        Region::Naw,
        Region::Euw,
        Region::Eue,
        Region::Asia,
    ];

    /// Canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Any => "ANY",
            Region::Nae => "NAE",
            Region::Naw => "NAW",
            Region::Euw => "EUW",
            Region::Eue => "EUE",
            Region::Asia => "ASIA",
        }
    }

    /// Returns true for the unconstrained region.
    pub fn is_any(&self) -> bool {
        matches!(self, Region::Any)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseError::Empty);
        }

        match s.to_ascii_uppercase().as_str() {
            "ANY" => Ok(Region::Any),
            "NAE" => Ok(Region::Nae),
            "NAW" => Ok(Region::Naw),
            "EUW" => Ok(Region::Euw),
            "EUE" => Ok(Region::Eue),
            "ASIA" => Ok(Region::Asia),
            _ => Err(ParseError::UnknownRegion(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_parse_is_case_insensitive() {
        assert_eq!("euw".parse::<Region>().unwrap(), Region::Euw);
        assert_eq!("ANY".parse::<Region>().unwrap(), Region::Any);
    }

    #[test]
    fn test_region_unknown() {
        let result: Result<Region, _> = "MARS".parse();
        assert!(matches!(result.unwrap_err(), ParseError::UnknownRegion(_)));
    }

    #[test]
    fn test_region_json_matches_display() {
        for region in Region::NAMED.iter().chain([Region::Any].iter()) {
            let json = serde_json::to_string(region).unwrap();
            assert_eq!(json, format!("\"{}\"", region.as_str()));
            let parsed: Region = serde_json::from_str(&json).unwrap();
            assert_eq!(&parsed, region);
        }
    }

    #[test]
    fn test_named_excludes_any() {
        assert!(Region::NAMED.iter().all(|r| !r.is_any()));
        assert!(Region::default().is_any());
    }
}
