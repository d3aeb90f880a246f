//! Heterogeneous argument/result values.
//!
//! Procedures take an ordered sequence of untyped values and return zero,
//! one, or many of them. `serde_json::Value` already gives us null, bool,
//! number, string, array and object variants without inventing a new tagged
//! union — the rest of this crate just threads it through.

/// A single heterogeneous argument or result value.
pub type Value = serde_json::Value;

/// The fixed shape of a procedure's result, decided once at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    /// No result value.
    Void,
    /// Exactly one result value.
    One,
    /// An ordered sequence of result values.
    Multi,
}

impl Arity {
    pub fn name(self) -> &'static str {
        match self {
            Arity::Void => "void",
            Arity::One => "one",
            Arity::Multi => "multi",
        }
    }
}

impl std::fmt::Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
