//! Operation kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// What a worker should do with a module.
///
/// Each kind is served by its own worker host at a fixed local address and
/// exposed under its own route segment on the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Load the module and invoke its entry point.
    #[serde(rename = "run", alias = "execute")]
    Execute,
    /// Load the module, compile every member, and print the machine code.
    #[serde(rename = "asm", alias = "disassemble")]
    Disassemble,
}

impl OperationKind {
    /// Route segment on the gateway (`/{platform}/{segment}`).
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::Execute => "run",
            Self::Disassemble => "asm",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

impl FromStr for OperationKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "run" | "execute" => Ok(Self::Execute),
            "asm" | "disassemble" => Ok(Self::Disassemble),
            _ => Err(ParseError::UnknownOperation(s.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_segments() {
        assert_eq!(OperationKind::Execute.path_segment(), "run");
        assert_eq!(OperationKind::Disassemble.path_segment(), "asm");
    }

    #[test]
    fn parse_segments_and_long_names() {
        assert_eq!("run".parse::<OperationKind>().unwrap(), OperationKind::Execute);
        assert_eq!("Disassemble".parse::<OperationKind>().unwrap(), OperationKind::Disassemble);
        assert!("jit".parse::<OperationKind>().is_err());
    }

    #[test]
    fn serde_uses_segments() {
        let json = serde_json::to_string(&OperationKind::Disassemble).unwrap();
        assert_eq!(json, r#""asm""#);
        let kind: OperationKind = serde_json::from_str(r#""execute""#).unwrap();
        assert_eq!(kind, OperationKind::Execute);
    }
}
