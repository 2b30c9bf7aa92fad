//! How much a run says while it works.

use super::Tone;

/// Verbosity selected by `--verbose` / `--quiet`.
///
/// Verbosity also picks the report shape: only `Verbose` lists every
/// recorded feature along with the mismatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    Verbose,
    #[default]
    Normal,
    /// Warnings and errors only.
    Quiet,
}

impl OutputMode {
    /// `quiet` wins; clap already rejects both flags together.
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        match (verbose, quiet) {
            (_, true) => Self::Quiet,
            (true, false) => Self::Verbose,
            (false, false) => Self::Normal,
        }
    }

    /// Whether a status line of `tone` is written in this mode.
    pub fn allows(self, tone: Tone) -> bool {
        match tone {
            Tone::Caution | Tone::Failure => true,
            Tone::Plain | Tone::Good | Tone::Banner => self != Self::Quiet,
        }
    }

    pub fn is_verbose(self) -> bool {
        self == Self::Verbose
    }
}
