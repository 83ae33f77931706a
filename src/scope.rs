//! A flat, shadowing variable table — the default [`Bindings`]
//! implementation.
//!
//! Grounded on `rhai::Scope` (`rhai/src/scope.rs`): two parallel vectors
//! (names, values) searched from the back so newer entries shadow older
//! ones with the same name. `spec.md` leaves binding/scoping resolution to
//! an external collaborator (§6); this is a minimal, single-level instance
//! of that collaborator, sufficient to drive the evaluator end to end. A
//! production interpreter would key scopes by `Specifier`; this crate's
//! `Specifier` is carried through the API but otherwise unused here (see
//! DESIGN.md).

use crate::collaborators::Bindings;
use crate::error::{ErrorKind, EvalError};
use crate::feed::Specifier;
use crate::value::Cell;
use crate::EvalResult;

/// A flat, shadowing variable scope.
#[derive(Debug, Default)]
pub struct Scope {
    names: Vec<String>,
    values: Vec<Cell>,
}

impl Scope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Find the most recently pushed entry with this name.
    fn find(&self, name: &str) -> Option<usize> {
        self.names.iter().rposition(|n| n == name)
    }

    pub fn push(&mut self, name: impl Into<String>, value: Cell) -> &mut Self {
        self.names.push(name.into());
        self.values.push(value);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Cell> {
        self.find(name).map(|i| &self.values[i])
    }

    pub fn set(&mut self, name: &str, value: Cell) -> bool {
        match self.find(name) {
            Some(i) => {
                self.values[i] = value;
                true
            }
            None => false,
        }
    }

    /// Truncate back to a previously observed length, the way block scopes
    /// unwind in `rhai::Engine::eval_stmt_block`.
    pub fn rewind(&mut self, len: usize) {
        self.names.truncate(len);
        self.values.truncate(len);
    }
}

impl Bindings for Scope {
    fn get_variable(&self, word: &str, specifier: &Specifier) -> EvalResult<Cell> {
        self.try_get_variable(word, specifier)?
            .ok_or_else(|| EvalError::new(ErrorKind::UnboundWord { word: word.to_string() }))
    }

    fn try_get_variable(&self, word: &str, _specifier: &Specifier) -> EvalResult<Option<Cell>> {
        Ok(self.get(word).cloned())
    }

    fn set_variable(&mut self, word: &str, _specifier: &Specifier, value: Cell) -> EvalResult<()> {
        if !self.set(word, value.clone()) {
            self.push(word.to_string(), value);
        }
        Ok(())
    }

    fn set_variable_poly(
        &mut self,
        target: &Cell,
        specifier: &Specifier,
        value: Cell,
    ) -> EvalResult<()> {
        match target.kind() {
            crate::value::Kind::Word(name, _) | crate::value::Kind::SetWord(name, _) => {
                self.set_variable(name.as_str(), specifier, value)
            }
            crate::value::Kind::Block(items, _) => {
                // Destructure: each target word is bound to the
                // corresponding positional value out of `value`'s block,
                // or to `value` itself when there is only one target.
                // `spec.md` §4.3, "set-block".
                let sources: Vec<Cell> = match value.kind() {
                    crate::value::Kind::Block(vs, _) => vs.as_ref().clone(),
                    _ => vec![value],
                };
                for (i, target_item) in items.iter().enumerate() {
                    let v = sources.get(i).cloned().unwrap_or_else(Cell::null);
                    if v.is_null() {
                        return Err(EvalError::new(ErrorKind::NeedNonNull));
                    }
                    self.set_variable_poly(target_item, specifier, v)?;
                }
                Ok(())
            }
            _ => Err(EvalError::new(ErrorKind::Custom {
                message: "set target must be a word, set-word, or block of such".to_string(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadowing_finds_most_recent_entry() {
        let mut scope = Scope::new();
        scope.push("x", Cell::integer(1));
        scope.push("x", Cell::integer(2));
        assert!(matches!(scope.get("x").unwrap().kind(), crate::value::Kind::Integer(2, _)));
    }

    #[test]
    fn unbound_word_fails() {
        let scope = Scope::new();
        assert!(scope.get_variable("missing", &Specifier::root()).is_err());
    }

    #[test]
    fn rewind_drops_block_locals() {
        let mut scope = Scope::new();
        scope.push("x", Cell::integer(1));
        let mark = scope.len();
        scope.push("y", Cell::integer(2));
        scope.rewind(mark);
        assert!(scope.get("y").is_none());
        assert!(scope.get("x").is_some());
    }
}
