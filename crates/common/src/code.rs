use serde::{Deserialize, Serialize};

/// Stable numeric code attached to every classified system failure.
///
/// Codes are grouped by area: `1xxx` context, `2xxx` registry,
/// `3xxx` dispatcher, `4xxx` lifecycle. Application defined codes should
/// start at `10000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(u32);

impl ErrorCode {
    /// Creates an error code.
    pub const fn new(code: u32) -> Self {
        Self(code)
    }

    /// Returns the numeric value.
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RT-{:04}", self.0)
    }
}
