//! Recording mode definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Session recording mode. Fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RecordMode {
    /// Record everything live, never replay
    RecordOnly,
    /// Replay what exists, record what doesn't
    RecordAdditive,
    /// Replay, abort unmatched requests
    ReplayOnly,
    /// Replay, abort unmatched requests and raise an error
    ReplayOnlyThrow,
    /// Replay, let unmatched requests through live
    ReplayPassthrough,
    /// Neither record nor replay
    Passthrough,
    /// `replay-only` on CI, `record-additive` elsewhere
    #[default]
    Auto,
}

impl RecordMode {
    pub const ALL: [RecordMode; 7] = [
        RecordMode::RecordOnly,
        RecordMode::RecordAdditive,
        RecordMode::ReplayOnly,
        RecordMode::ReplayOnlyThrow,
        RecordMode::ReplayPassthrough,
        RecordMode::Passthrough,
        RecordMode::Auto,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordMode::RecordOnly => "record-only",
            RecordMode::RecordAdditive => "record-additive",
            RecordMode::ReplayOnly => "replay-only",
            RecordMode::ReplayOnlyThrow => "replay-only-throw",
            RecordMode::ReplayPassthrough => "replay-passthrough",
            RecordMode::Passthrough => "passthrough",
            RecordMode::Auto => "auto",
        }
    }

    /// Resolve `auto` against the environment. Other modes are returned as is.
    pub fn resolve(self, on_ci: bool) -> RecordMode {
        match self {
            RecordMode::Auto if on_ci => RecordMode::ReplayOnly,
            RecordMode::Auto => RecordMode::RecordAdditive,
            mode => mode,
        }
    }

    /// Resolve `auto` using the `CI` environment variable.
    pub fn resolve_from_env(self) -> RecordMode {
        self.resolve(std::env::var_os("CI").is_some())
    }

    /// Behavior flags for a resolved mode. `auto` must be resolved first so
    /// the environment is consulted once per session.
    pub fn flags(self) -> ModeFlags {
        debug_assert_ne!(
            self,
            RecordMode::Auto,
            "resolve the record mode before deriving its flags"
        );
        ModeFlags {
            record_unmatched_requests: matches!(
                self,
                RecordMode::RecordOnly | RecordMode::RecordAdditive
            ),
            replay_matched_requests: matches!(
                self,
                RecordMode::RecordAdditive
                    | RecordMode::ReplayOnly
                    | RecordMode::ReplayOnlyThrow
                    | RecordMode::ReplayPassthrough
            ),
            abort_unmatched_requests: matches!(
                self,
                RecordMode::ReplayOnly | RecordMode::ReplayOnlyThrow
            ),
            throw_on_unmatched_requests: matches!(self, RecordMode::ReplayOnlyThrow),
        }
    }
}

impl fmt::Display for RecordMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| format!("Unknown record mode: {s}"))
    }
}

/// What a session does with each request, derived once from the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModeFlags {
    pub record_unmatched_requests: bool,
    pub replay_matched_requests: bool,
    pub abort_unmatched_requests: bool,
    pub throw_on_unmatched_requests: bool,
}
