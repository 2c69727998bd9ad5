//! Patch-policy tag grammar.
//!
//! A machine opts into automated patching by carrying a tag of the form
//! `PREFIX-<variant>-<weekday>-<hour>:00`, e.g. `LINUX-R-WED-03:00`.
//! The prefix is site-specific and comes from configuration; everything
//! after it is fixed grammar. A tag that does not match exactly means
//! "no policy" and the machine is skipped, never errored on.

use chrono::Weekday;
use once_cell::sync::Lazy;
use regex::Regex;

/// Well-known tag key machines carry their policy under.
pub const DEFAULT_TAG_KEY: &str = "patch";

/// Grammar of the tag body, after the site prefix and its trailing dash
/// have been stripped.
static TAG_BODY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(R|Q|P)-(MON|TUE|WED|THU|FRI|SAT|SUN)-(\d{2}):00$").unwrap()
});

/// Patch variant encoded by the tag's first letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyVariant {
    /// `R` - routine fleet machines.
    Routine,
    /// `Q` - quarantined machines patched on their own cadence.
    Quarantine,
    /// `P` - production candidates.
    ProdCandidate,
}

impl PolicyVariant {
    /// Single-letter code used in the tag string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Routine => "R",
            Self::Quarantine => "Q",
            Self::ProdCandidate => "P",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "R" => Some(Self::Routine),
            "Q" => Some(Self::Quarantine),
            "P" => Some(Self::ProdCandidate),
            _ => None,
        }
    }
}

impl std::fmt::Display for PolicyVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Routine => write!(f, "routine"),
            Self::Quarantine => write!(f, "quarantine"),
            Self::ProdCandidate => write!(f, "prod-candidate"),
        }
    }
}

/// A parsed patch policy. Immutable once parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchPolicy {
    pub variant: PolicyVariant,
    pub weekday: Weekday,
    /// Window opening hour, 0..=23.
    pub hour: u32,
}

impl PatchPolicy {
    /// Parse a raw tag value against the grammar for the given site prefix.
    ///
    /// Returns `None` for anything that is not an exact match: missing
    /// prefix, unknown variant letter, bad weekday code, hour outside
    /// 00..=23, or trailing garbage.
    pub fn parse(prefix: &str, raw: &str) -> Option<Self> {
        let body = raw.strip_prefix(prefix)?.strip_prefix('-')?;
        let caps = TAG_BODY.captures(body)?;

        let variant = PolicyVariant::from_code(&caps[1])?;
        let weekday = weekday_from_code(&caps[2])?;
        let hour: u32 = caps[3].parse().ok()?;
        if hour > 23 {
            return None;
        }

        Some(Self {
            variant,
            weekday,
            hour,
        })
    }

    /// Reconstruct the exact tag string this policy was parsed from.
    pub fn tag(&self, prefix: &str) -> String {
        format!(
            "{}-{}-{}-{:02}:00",
            prefix,
            self.variant.code(),
            weekday_code(self.weekday),
            self.hour
        )
    }
}

/// Fixed weekday table: MON=0 .. SUN=6.
fn weekday_from_code(code: &str) -> Option<Weekday> {
    match code {
        "MON" => Some(Weekday::Mon),
        "TUE" => Some(Weekday::Tue),
        "WED" => Some(Weekday::Wed),
        "THU" => Some(Weekday::Thu),
        "FRI" => Some(Weekday::Fri),
        "SAT" => Some(Weekday::Sat),
        "SUN" => Some(Weekday::Sun),
        _ => None,
    }
}

fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MON",
        Weekday::Tue => "TUE",
        Weekday::Wed => "WED",
        Weekday::Thu => "THU",
        Weekday::Fri => "FRI",
        Weekday::Sat => "SAT",
        Weekday::Sun => "SUN",
    }
}
