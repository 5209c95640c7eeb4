//! Output layout and clip length presets.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How the source frame is placed on the vertical 1080x1920 canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Fit inside the canvas and pad (same as `Fit`)
    #[default]
    Auto,
    /// Scale to cover the canvas and crop the overflow
    Fill,
    /// Fit inside the canvas and pad with black bars
    Fit,
    /// Center square crop, padded into the canvas
    Square,
}

impl Layout {
    pub const ALL: &'static [Layout] = &[Layout::Auto, Layout::Fill, Layout::Fit, Layout::Square];

    pub fn as_str(&self) -> &'static str {
        match self {
            Layout::Auto => "auto",
            Layout::Fill => "fill",
            Layout::Fit => "fit",
            Layout::Square => "square",
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Layout {
    type Err = LayoutParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Layout::Auto),
            "fill" => Ok(Layout::Fill),
            "fit" => Ok(Layout::Fit),
            "square" => Ok(Layout::Square),
            _ => Err(LayoutParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown layout: {0}")]
pub struct LayoutParseError(String);

/// Requested clip length bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum ClipLength {
    #[serde(rename = "<30s")]
    UnderThirty,
    #[default]
    #[serde(rename = "30s-60s")]
    ThirtyToSixty,
    #[serde(rename = "60s-90s")]
    SixtyToNinety,
}

impl ClipLength {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClipLength::UnderThirty => "<30s",
            ClipLength::ThirtyToSixty => "30s-60s",
            ClipLength::SixtyToNinety => "60s-90s",
        }
    }

    /// Minimum and maximum segment duration in seconds.
    pub fn duration_bounds(&self) -> (f64, f64) {
        match self {
            ClipLength::UnderThirty => (10.0, 29.0),
            ClipLength::ThirtyToSixty => (30.0, 60.0),
            ClipLength::SixtyToNinety => (60.0, 90.0),
        }
    }
}

impl fmt::Display for ClipLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ClipLength {
    type Err = ClipLengthParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "<30s" => Ok(ClipLength::UnderThirty),
            "30s-60s" => Ok(ClipLength::ThirtyToSixty),
            "60s-90s" => Ok(ClipLength::SixtyToNinety),
            _ => Err(ClipLengthParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown clip length: {0}")]
pub struct ClipLengthParseError(String);
