//! The pluggable calculator adapter (component B) plus the crate's own
//! default implementation.

mod simple;

pub use simple::SimpleCalc;

use crate::error::Error;

/// Number of single-letter inputs the calculator alphabet recognizes
/// (`A..L`).
pub const MAX_INPUTS: usize = 12;

/// A dense bitmap over the `A..L` input alphabet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InputBitmap(u16);

impl InputBitmap {
    pub const EMPTY: InputBitmap = InputBitmap(0);

    pub fn set(&mut self, index: usize) {
        debug_assert!(index < MAX_INPUTS);
        self.0 |= 1 << index;
    }

    pub fn is_set(self, index: usize) -> bool {
        debug_assert!(index < MAX_INPUTS);
        self.0 & (1 << index) != 0
    }

    pub fn clear(&mut self, index: usize) {
        debug_assert!(index < MAX_INPUTS);
        self.0 &= !(1 << index);
    }

    /// True if any bit set in `self` is also set in `other`.
    pub fn intersects(self, other: InputBitmap) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// A compiled predicate, produced by [`CalcEngine::compile`].
pub trait CompiledExpr: Send + Sync {
    fn evaluate(&self, inputs: &[f64; MAX_INPUTS]) -> f64;
    fn referenced_inputs(&self) -> InputBitmap;
}

/// The external collaborator that compiles and evaluates `CALC(...)`
/// predicate text. The core only ever calls `compile` and `evaluate`
/// through this seam; it never assumes a particular expression grammar.
pub trait CalcEngine: Send + Sync {
    fn compile(&self, text: &str) -> Result<Box<dyn CompiledExpr>, String>;
}

/// Converts a raw [`CalcEngine::compile`] failure into the taxonomy's
/// `BadCalc` variant, attaching the offending expression text.
pub fn compile_rule_calc(
    engine: &dyn CalcEngine,
    text: &str,
) -> Result<Box<dyn CompiledExpr>, Error> {
    engine
        .compile(text)
        .map_err(|message| Error::BadCalc { expr: text.to_owned(), message })
}

/// A rule with no `CALC(...)` clause is always true; a rule whose predicate
/// references a currently-invalid input is always false regardless of the
/// compiled result, per the component F recomputation contract.
pub fn evaluate_rule(
    compiled: Option<&dyn CompiledExpr>,
    inputs: &[f64; MAX_INPUTS],
    bad: InputBitmap,
) -> bool {
    match compiled {
        None => true,
        Some(expr) => {
            if expr.referenced_inputs().intersects(bad) {
                false
            } else {
                expr.evaluate(inputs) != 0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysOne;
    impl CompiledExpr for AlwaysOne {
        fn evaluate(&self, _inputs: &[f64; MAX_INPUTS]) -> f64 {
            1.0
        }
        fn referenced_inputs(&self) -> InputBitmap {
            let mut bits = InputBitmap::EMPTY;
            bits.set(0);
            bits
        }
    }

    #[test]
    fn no_calc_is_always_true() {
        let inputs = [0.0; MAX_INPUTS];
        assert!(evaluate_rule(None, &inputs, InputBitmap::EMPTY));
    }

    #[test]
    fn bad_referenced_input_forces_false() {
        let inputs = [0.0; MAX_INPUTS];
        let mut bad = InputBitmap::EMPTY;
        bad.set(0);
        assert!(!evaluate_rule(Some(&AlwaysOne), &inputs, bad));
    }

    #[test]
    fn nonzero_result_is_true() {
        let inputs = [0.0; MAX_INPUTS];
        assert!(evaluate_rule(Some(&AlwaysOne), &inputs, InputBitmap::EMPTY));
    }
}
