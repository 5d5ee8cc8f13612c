use crate::error::ParsingError;
use std::str::FromStr;

/// A boolean that also has an explicit "unset" state.
///
/// Used for the rule-level `is_tls` requirement: `Unset` means the rule does
/// not care whether the transport is TLS, `True`/`False` pin it one way.
/// This mirrors the original `asCALCIsTLS` three-way encoding (`asCALCIsTLS_UNSET`
/// plus the two boolean states) rather than collapsing "unset" into "false".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Tristate {
    #[default]
    Unset,
    False,
    True,
}

impl Tristate {
    /// `None` does not participate in matching at all; `Some(bool)` does.
    pub fn as_option(self) -> Option<bool> {
        match self {
            Tristate::Unset => None,
            Tristate::False => Some(false),
            Tristate::True => Some(true),
        }
    }

    /// Whether a client whose transport is `is_tls` satisfies this requirement.
    pub fn matches(self, is_tls: bool) -> bool {
        match self.as_option() {
            None => true,
            Some(required) => required == is_tls,
        }
    }
}

impl From<bool> for Tristate {
    fn from(value: bool) -> Self {
        if value {
            Tristate::True
        } else {
            Tristate::False
        }
    }
}

impl FromStr for Tristate {
    type Err = ParsingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "TRUE" => Tristate::True,
            "FALSE" => Tristate::False,
            "UNSET" => Tristate::Unset,
            _ => return Err(ParsingError::InvalidTristate(s.to_owned())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_matches_anything() {
        assert!(Tristate::Unset.matches(true));
        assert!(Tristate::Unset.matches(false));
    }

    #[test]
    fn pinned_state_matches_only_itself() {
        assert!(Tristate::True.matches(true));
        assert!(!Tristate::True.matches(false));
        assert!(Tristate::False.matches(false));
        assert!(!Tristate::False.matches(true));
    }
}
