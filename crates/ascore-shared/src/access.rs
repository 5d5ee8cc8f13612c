use std::{fmt::Display, str::FromStr};

use crate::error::ParsingError;

/// The four access levels a rule can grant, ordered so that `NONE < READ <
/// WRITE < RPC`. Evaluation relies on this ordering directly: a rule can only
/// raise a client's effective access, never lower it (see the evaluator).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessRight {
    #[default]
    None,
    Read,
    Write,
    Rpc,
}

impl AccessRight {
    pub const ALL: [AccessRight; 4] = [
        AccessRight::None,
        AccessRight::Read,
        AccessRight::Write,
        AccessRight::Rpc,
    ];

    /// Whether a rule granting `self` would satisfy a `check_*` call made
    /// at `requested`.
    pub fn satisfies(self, requested: AccessRight) -> bool {
        self >= requested
    }
}

impl FromStr for AccessRight {
    type Err = ParsingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "NONE" => AccessRight::None,
            "READ" => AccessRight::Read,
            "WRITE" => AccessRight::Write,
            "RPC" => AccessRight::Rpc,
            _ => return Err(ParsingError::InvalidAccessRight(s.to_owned())),
        })
    }
}

impl AsRef<str> for AccessRight {
    fn as_ref(&self) -> &str {
        match self {
            AccessRight::None => "NONE",
            AccessRight::Read => "READ",
            AccessRight::Write => "WRITE",
            AccessRight::Rpc => "RPC",
        }
    }
}

impl Display for AccessRight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

/// Bit mask attached to an evaluation result, currently carrying only the
/// trap-write flag. Modeled as a mask rather than a bool so a future rule
/// clause can add another audit bit without another evaluator return value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TrapMask(u8);

impl TrapMask {
    pub const NONE: TrapMask = TrapMask(0);
    pub const TRAP_WRITE: TrapMask = TrapMask(0b0000_0001);

    pub fn contains(self, other: TrapMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn set(&mut self, other: TrapMask) {
        self.0 |= other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for TrapMask {
    type Output = TrapMask;

    fn bitor(self, rhs: TrapMask) -> TrapMask {
        TrapMask(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn access_right_ordering_is_monotone() {
        assert!(AccessRight::None < AccessRight::Read);
        assert!(AccessRight::Read < AccessRight::Write);
        assert!(AccessRight::Write < AccessRight::Rpc);
    }

    #[test]
    fn satisfies_is_at_least() {
        assert!(AccessRight::Rpc.satisfies(AccessRight::Read));
        assert!(!AccessRight::Read.satisfies(AccessRight::Write));
    }

    #[test]
    fn parses_all_keywords() {
        for right in AccessRight::ALL {
            assert_eq!(right.as_ref().parse::<AccessRight>().unwrap(), right);
        }
    }

    #[test]
    fn rejects_unknown_keyword() {
        assert!("BOGUS".parse::<AccessRight>().is_err());
    }

    #[test]
    fn trap_mask_combines() {
        let mut mask = TrapMask::NONE;
        assert!(mask.is_empty());
        mask.set(TrapMask::TRAP_WRITE);
        assert!(mask.contains(TrapMask::TRAP_WRITE));
    }
}
