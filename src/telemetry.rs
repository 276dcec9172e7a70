//! Tracing setup shared by the binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "counsel_ledger=info";

/// How chatty the binaries should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        if quiet {
            Self::Quiet
        } else if verbose {
            Self::Verbose
        } else {
            Self::Normal
        }
    }

    /// `-v`/`-q` win over `RUST_LOG`; otherwise `RUST_LOG` is honoured.
    fn filter(self) -> EnvFilter {
        match self {
            Self::Quiet => EnvFilter::new("error"),
            Self::Verbose => EnvFilter::new("counsel_ledger=debug"),
            Self::Normal => {
                EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into())
            }
        }
    }
}

/// Install the global subscriber. Logs go to stderr so stdout stays usable
/// for hashes and reports.
pub fn init(verbosity: Verbosity) {
    let _ = tracing_subscriber::registry()
        .with(verbosity.filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_from_flags() {
        assert_eq!(Verbosity::from_flags(false, false), Verbosity::Normal);
        assert_eq!(Verbosity::from_flags(true, false), Verbosity::Verbose);
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::Quiet);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init(Verbosity::Quiet);
        init(Verbosity::Verbose);
    }
}
