//! Canonical trading-pair symbol.
//!
//! The canonical form is `BASE-QUOTE` (e.g. `BTC-USDC`). Venue-specific
//! spellings are produced at the adapter boundary: MEXC collapses the
//! separator (`BTCUSDC`), BingX uses the canonical form as-is.

use std::fmt;
use std::str::FromStr;

use super::error::DomainError;

/// A validated `BASE-QUOTE` trading pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    base: String,
    quote: String,
}

impl Symbol {
    /// Parse a canonical `BASE-QUOTE` string.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidSymbol`] unless the input is two
    /// non-empty alphanumeric segments joined by a single dash.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let invalid = || DomainError::InvalidSymbol {
            raw: raw.to_string(),
        };

        let (base, quote) = raw.split_once('-').ok_or_else(invalid)?;
        if base.is_empty()
            || quote.is_empty()
            || !base.chars().all(|c| c.is_ascii_alphanumeric())
            || !quote.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(invalid());
        }

        Ok(Self {
            base: base.to_ascii_uppercase(),
            quote: quote.to_ascii_uppercase(),
        })
    }

    /// Base asset code (e.g. `BTC`).
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Quote asset code (e.g. `USDC`).
    #[must_use]
    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// Canonical `BASE-QUOTE` spelling.
    #[must_use]
    pub fn canonical(&self) -> String {
        format!("{}-{}", self.base, self.quote)
    }

    /// Separator-free spelling (`BTCUSDC`), used by MEXC.
    #[must_use]
    pub fn compact(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

impl FromStr for Symbol {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_pair() {
        let sym = Symbol::parse("BTC-USDC").unwrap();
        assert_eq!(sym.base(), "BTC");
        assert_eq!(sym.quote(), "USDC");
        assert_eq!(sym.canonical(), "BTC-USDC");
        assert_eq!(sym.compact(), "BTCUSDC");
    }

    #[test]
    fn normalizes_case() {
        let sym = Symbol::parse("btc-usdc").unwrap();
        assert_eq!(sym.to_string(), "BTC-USDC");
    }

    #[test]
    fn rejects_malformed_input() {
        for raw in ["BTCUSDC", "BTC-", "-USDC", "BTC-USD-C", "BTC/USDC", ""] {
            assert!(Symbol::parse(raw).is_err(), "accepted {raw:?}");
        }
    }
}
