//! Durability mode configuration
//!
//! Controls how far a log append is pushed before the issuing command is
//! acknowledged.
//!
//! | Mode | After each append | Data Loss Window |
//! |------|-------------------|-----------------|
//! | Always | flush + fsync | Zero |
//! | Standard | flush to the OS | OS crash / power loss only |

use std::fmt;
use std::str::FromStr;

/// Durability mode for log appends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityMode {
    /// fsync after every append
    Always,
    /// Flush userspace buffers to the OS after every append (the default)
    #[default]
    Standard,
}

impl DurabilityMode {
    /// True if every append must reach stable storage before returning
    pub fn requires_fsync(&self) -> bool {
        matches!(self, DurabilityMode::Always)
    }

    /// Config-file spelling of the mode
    pub fn as_str(&self) -> &'static str {
        match self {
            DurabilityMode::Always => "always",
            DurabilityMode::Standard => "standard",
        }
    }
}

impl fmt::Display for DurabilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DurabilityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(DurabilityMode::Always),
            "standard" => Ok(DurabilityMode::Standard),
            other => Err(format!(
                "invalid durability mode '{}', expected \"standard\" or \"always\"",
                other
            )),
        }
    }
}
