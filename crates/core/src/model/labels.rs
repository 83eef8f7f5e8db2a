use std::collections::BTreeMap;

use super::{Symbol, SymbolError};

/// Result of translating a service label into the catalog vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelLookup<'a> {
    /// The service label has an explicit display symbol.
    Mapped(&'a Symbol),
    /// No mapping exists; the raw label is used as-is.
    Unmapped(&'a str),
}

impl LabelLookup<'_> {
    /// Resolves to a display symbol. Unmapped labels pass through unchanged.
    ///
    /// # Errors
    ///
    /// Returns `SymbolError::Empty` if an unmapped raw label is blank.
    pub fn into_symbol(self) -> Result<Symbol, SymbolError> {
        match self {
            LabelLookup::Mapped(symbol) => Ok(symbol.clone()),
            LabelLookup::Unmapped(raw) => Symbol::new(raw),
        }
    }

    #[must_use]
    pub fn is_mapped(&self) -> bool {
        matches!(self, LabelLookup::Mapped(_))
    }
}

/// Maps the classifier's raw vocabulary onto catalog symbols.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMap {
    entries: BTreeMap<String, Symbol>,
}

impl LabelMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entry(mut self, raw: impl Into<String>, symbol: Symbol) -> Self {
        self.insert(raw, symbol);
        self
    }

    pub fn insert(&mut self, raw: impl Into<String>, symbol: Symbol) {
        self.entries.insert(raw.into(), symbol);
    }

    #[must_use]
    pub fn lookup<'a>(&'a self, raw: &'a str) -> LabelLookup<'a> {
        match self.entries.get(raw) {
            Some(symbol) => LabelLookup::Mapped(symbol),
            None => LabelLookup::Unmapped(raw),
        }
    }
}
