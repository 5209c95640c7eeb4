//! Account tiers and their per-job limits.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Layout;

/// Credits granted to an account that has no credit record yet.
pub const DEFAULT_STARTING_CREDITS: i64 = 2;

/// Maximum shorts per job on the free tier.
pub const FREE_MAX_SHORTS: usize = 2;
/// Maximum shorts per job on the paid tier.
pub const PAID_MAX_SHORTS: usize = 4;

/// Account tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Paid,
}

impl Tier {
    /// Parse the tier column of a credit record (case-insensitive).
    ///
    /// Any recognised paid plan name maps to `Paid`; everything else is `Free`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "paid" | "pro" | "premium" | "studio" => Tier::Paid,
            _ => Tier::Free,
        }
    }

    /// Shorts a single job may produce.
    pub fn max_shorts(&self) -> usize {
        match self {
            Tier::Free => FREE_MAX_SHORTS,
            Tier::Paid => PAID_MAX_SHORTS,
        }
    }

    /// Whether a completed job consumes a credit.
    pub fn consumes_credits(&self) -> bool {
        matches!(self, Tier::Free)
    }

    /// Free accounts only get the automatic layout.
    pub fn allows_layout(&self, layout: Layout) -> bool {
        match self {
            Tier::Free => layout == Layout::Auto,
            Tier::Paid => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Paid => "paid",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
