//! Command-line arguments the host launches a plugin with.

use clap::Parser;

/// Arguments accepted by a plugin process.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(about = "Formatting plugin speaking the stdio plugin protocol")]
pub struct CliArgs {
    /// Process id of the host; the plugin exits once it is gone.
    #[arg(long = "parent-pid", value_name = "PID")]
    pub parent_process_id: u32,
    /// Perform one-time initialisation and exit without serving requests.
    #[arg(long)]
    pub init: bool,
    /// Log filter directive (for example `debug` or `formatwire_plugin=trace`).
    #[arg(long, value_name = "FILTER", env = "FORMATWIRE_LOG")]
    pub log_filter: Option<String>,
}

impl CliArgs {
    /// Parse arguments from the current process.
    pub fn from_env() -> Result<Self, clap::Error> {
        Self::try_parse()
    }

    /// Parse arguments from an explicit list (first item is the binary name).
    pub fn parse_from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::try_parse_from(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_pid_and_init() {
        let args = CliArgs::parse_from_args(["plugin", "--parent-pid", "1234", "--init"]).unwrap();
        assert_eq!(args.parent_process_id, 1234);
        assert!(args.init);
    }

    #[test]
    fn test_init_defaults_to_false() {
        let args = CliArgs::parse_from_args(["plugin", "--parent-pid", "5"]).unwrap();
        assert_eq!(args.parent_process_id, 5);
        assert!(!args.init);
    }

    #[test]
    fn test_parent_pid_is_required() {
        assert!(CliArgs::parse_from_args(["plugin", "--init"]).is_err());
    }

    #[test]
    fn test_parent_pid_must_be_numeric() {
        assert!(CliArgs::parse_from_args(["plugin", "--parent-pid", "abc"]).is_err());
    }

    #[test]
    fn test_log_filter_flag() {
        let args =
            CliArgs::parse_from_args(["plugin", "--parent-pid", "5", "--log-filter", "debug"]).unwrap();
        assert_eq!(args.log_filter.as_deref(), Some("debug"));
    }
}
