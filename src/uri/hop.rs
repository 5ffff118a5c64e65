use crate::{UriError, UriResult};
use std::fmt;

/// How a URI was reached from the URI that discovered it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hop {
    /// Ordinary navigational link
    Link,
    /// HTTP or meta redirect
    Redirect,
    /// Embedded resource (image, script, stylesheet)
    Embed,
    /// Prerequisite such as a DNS lookup or robots.txt
    Prerequisite,
    /// Speculative embed found by loose extraction
    SpeculativeEmbed,
}

impl Hop {
    pub fn as_char(&self) -> char {
        match self {
            Self::Link => 'L',
            Self::Redirect => 'R',
            Self::Embed => 'E',
            Self::Prerequisite => 'P',
            Self::SpeculativeEmbed => 'X',
        }
    }

    pub fn from_char(c: char) -> UriResult<Self> {
        match c {
            'L' => Ok(Self::Link),
            'R' => Ok(Self::Redirect),
            'E' => Ok(Self::Embed),
            'P' => Ok(Self::Prerequisite),
            'X' => Ok(Self::SpeculativeEmbed),
            other => Err(UriError::InvalidHop(other)),
        }
    }
}

/// Ordered hop characters from a seed to a URI; empty for seeds
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct HopPath(String);

impl HopPath {
    pub fn new() -> Self {
        Self(String::new())
    }

    /// Parses a path such as `"LLE"`
    pub fn parse(s: &str) -> UriResult<Self> {
        for c in s.chars() {
            Hop::from_char(c)?;
        }
        Ok(Self(s.to_string()))
    }

    /// Returns a new path extended by one hop
    pub fn with(&self, hop: Hop) -> Self {
        let mut path = self.0.clone();
        path.push(hop.as_char());
        Self(path)
    }

    pub fn hop_count(&self) -> usize {
        self.0.len()
    }

    pub fn last_hop(&self) -> Option<Hop> {
        self.0.chars().last().and_then(|c| Hop::from_char(c).ok())
    }

    /// Counts trailing non-link hops (transclusions)
    pub fn trailing_transclusions(&self) -> usize {
        self.0.chars().rev().take_while(|c| *c != 'L').count()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HopPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hop_chars() {
        for hop in [
            Hop::Link,
            Hop::Redirect,
            Hop::Embed,
            Hop::Prerequisite,
            Hop::SpeculativeEmbed,
        ] {
            assert_eq!(Hop::from_char(hop.as_char()).unwrap(), hop);
        }
        assert!(Hop::from_char('Q').is_err());
    }

    #[test]
    fn test_path_extension() {
        let seed = HopPath::new();
        assert_eq!(seed.hop_count(), 0);
        assert!(seed.last_hop().is_none());

        let path = seed.with(Hop::Link).with(Hop::Embed).with(Hop::Embed);
        assert_eq!(path.as_str(), "LEE");
        assert_eq!(path.hop_count(), 3);
        assert_eq!(path.last_hop(), Some(Hop::Embed));
        assert_eq!(path.trailing_transclusions(), 2);
        assert_eq!(seed.hop_count(), 0);
    }

    #[test]
    fn test_parse_rejects_unknown_hops() {
        assert_eq!(HopPath::parse("LRP").unwrap().hop_count(), 3);
        assert!(matches!(
            HopPath::parse("LZ"),
            Err(UriError::InvalidHop('Z'))
        ));
    }
}
