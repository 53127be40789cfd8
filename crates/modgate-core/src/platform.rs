//! Target platforms.
//!
//! The platform set is closed and fixed at build time. The numeric ids follow
//! the usual architecture numbering (x86 = 0, x64 = 1, arm32 = 2, arm64 = 3)
//! so that older clients addressing platforms by number keep working.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// A target execution or disassembly environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[serde(alias = "ia32")]
    X86,
    #[serde(alias = "x86_64", alias = "amd64")]
    X64,
    #[serde(alias = "arm", alias = "aarch32")]
    Arm32,
    #[serde(alias = "aarch64")]
    Arm64,
}

impl Platform {
    /// Every supported platform, in id order.
    pub const ALL: [Platform; 4] = [Platform::X86, Platform::X64, Platform::Arm32, Platform::Arm64];

    /// Canonical lowercase identifier, used in routes and JSON.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X86 => "x86",
            Self::X64 => "x64",
            Self::Arm32 => "arm32",
            Self::Arm64 => "arm64",
        }
    }

    /// Numeric id of the platform.
    pub fn id(self) -> u8 {
        match self {
            Self::X86 => 0,
            Self::X64 => 1,
            Self::Arm32 => 2,
            Self::Arm64 => 3,
        }
    }

    /// The platform of the machine this code was compiled for, if it is one
    /// of the supported set.
    pub fn host() -> Option<Self> {
        match std::env::consts::ARCH {
            "x86" => Some(Self::X86),
            "x86_64" => Some(Self::X64),
            "arm" => Some(Self::Arm32),
            "aarch64" => Some(Self::Arm64),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x86" | "ia32" | "0" => Ok(Self::X86),
            "x64" | "x86_64" | "amd64" | "1" => Ok(Self::X64),
            "arm32" | "arm" | "aarch32" | "2" => Ok(Self::Arm32),
            "arm64" | "aarch64" | "3" => Ok(Self::Arm64),
            _ => Err(ParseError::UnknownPlatform(s.to_owned())),
        }
    }
}
