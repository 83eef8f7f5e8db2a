use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SymbolError {
    #[error("symbol cannot be empty")]
    Empty,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("symbol catalog cannot be empty")]
    Empty,

    #[error("symbol `{0}` appears more than once in the catalog")]
    Duplicate(Symbol),

    #[error(transparent)]
    Symbol(#[from] SymbolError),
}

//
// ─── SYMBOL ────────────────────────────────────────────────────────────────────
//

/// A practice target in the catalog's display vocabulary.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Builds a symbol from trimmed, non-empty text.
    ///
    /// # Errors
    ///
    /// Returns `SymbolError::Empty` if the text is blank.
    pub fn new(value: impl Into<String>) -> Result<Self, SymbolError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(SymbolError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Symbol {
    type Error = SymbolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//
// ─── CATALOG ───────────────────────────────────────────────────────────────────
//

/// Fixed, ordered list of symbols practiced one at a time.
///
/// The order never changes after construction, so an index into the catalog is
/// a stable way to name the current symbol for the whole session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolCatalog {
    symbols: Vec<Symbol>,
}

impl SymbolCatalog {
    /// # Errors
    ///
    /// Returns `CatalogError::Empty` for an empty list and
    /// `CatalogError::Duplicate` if a symbol repeats.
    pub fn new(symbols: Vec<Symbol>) -> Result<Self, CatalogError> {
        if symbols.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut seen = HashSet::with_capacity(symbols.len());
        for symbol in &symbols {
            if !seen.insert(symbol) {
                return Err(CatalogError::Duplicate(symbol.clone()));
            }
        }
        Ok(Self { symbols })
    }

    /// Builds a catalog from raw names, validating each one.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if any name is blank, repeats, or the list is empty.
    pub fn from_names<I, S>(names: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let symbols = names
            .into_iter()
            .map(Symbol::new)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(symbols)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Always false; kept for the `len`/`is_empty` pairing clippy expects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Symbol> {
        self.symbols.get(index)
    }

    /// Symbol at `index`, or the last symbol when `index` is past the end.
    #[must_use]
    pub fn clamped(&self, index: usize) -> &Symbol {
        &self.symbols[index.min(self.last_index())]
    }

    #[must_use]
    pub fn position(&self, symbol: &Symbol) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }

    #[must_use]
    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.position(symbol).is_some()
    }

    #[must_use]
    pub fn last_index(&self) -> usize {
        self.symbols.len() - 1
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_trims_and_rejects_blank() {
        assert_eq!(Symbol::new("  hello ").unwrap().as_str(), "hello");
        assert_eq!(Symbol::new("   ").unwrap_err(), SymbolError::Empty);
    }

    #[test]
    fn catalog_rejects_empty_and_duplicates() {
        assert_eq!(
            SymbolCatalog::from_names(Vec::<String>::new()).unwrap_err(),
            CatalogError::Empty
        );
        let err = SymbolCatalog::from_names(["a", "b", "a"]).unwrap_err();
        assert_eq!(err, CatalogError::Duplicate(Symbol::new("a").unwrap()));
    }

    #[test]
    fn catalog_keeps_order() {
        let catalog = SymbolCatalog::from_names(["thanks", "hello", "yes"]).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.last_index(), 2);
        assert_eq!(catalog.get(1).unwrap().as_str(), "hello");
        assert_eq!(catalog.position(&Symbol::new("yes").unwrap()), Some(2));
        assert!(!catalog.contains(&Symbol::new("no").unwrap()));
    }

    #[test]
    fn symbol_deserializes_through_validation() {
        let ok: Symbol = serde_json::from_str("\"hello\"").unwrap();
        assert_eq!(ok.as_str(), "hello");
        assert!(serde_json::from_str::<Symbol>("\"  \"").is_err());
    }
}
