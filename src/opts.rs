//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use crate::version::{DESCRIPTION, VERSION};

/// ICAP server process arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "icapd", version = VERSION, about = DESCRIPTION)]
pub struct ProcArgs {
    /// Configuration file path.
    #[arg(short = 'c', long, value_name = "PATH")]
    pub config: PathBuf,

    /// Run in the foreground with verbose logging instead of daemonizing.
    #[arg(long)]
    pub debug: bool,
}

impl ProcArgs {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

pub fn daemon_group() -> &'static str {
    "icapd"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_required_config_flag() {
        let args = ProcArgs::try_parse_from(["icapd", "-c", "/etc/icapd.yaml"]).unwrap();
        assert_eq!(args.config, PathBuf::from("/etc/icapd.yaml"));
        assert!(!args.debug);
    }

    #[test]
    fn parses_debug_flag() {
        let args =
            ProcArgs::try_parse_from(["icapd", "--config", "x.yaml", "--debug"]).unwrap();
        assert!(args.debug);
    }

    #[test]
    fn missing_config_is_an_error() {
        assert!(ProcArgs::try_parse_from(["icapd"]).is_err());
    }
}
