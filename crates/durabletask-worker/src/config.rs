use clap::Parser;
use core::time::Duration;
use durabletask_worker_core::{
    Error, Result,
    types::{ConcurrencyHints, DEFAULT_MAX_CONCURRENT_ACTIVITIES, DEFAULT_MAX_CONCURRENT_WORK_ITEMS},
};

/// Runtime configuration for a work-item worker host.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is honored by the bundled binary).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "durabletask-echo-worker",
    version,
    about = "A durable task worker that echoes every work item back to the sidecar"
)]
pub struct CliArgs {
    /// gRPC address of the sidecar serving `TaskHubSidecarService`.
    ///
    /// Environment variable: `SIDECAR_ADDRESS`
    #[arg(long, env = "SIDECAR_ADDRESS", default_value_t = String::from("http://127.0.0.1:50001"))]
    pub sidecar_address: String,

    /// Advisory limit on concurrently delivered orchestrator work items.
    ///
    /// Sent to the sidecar when the stream is opened; it is not enforced
    /// locally.
    ///
    /// Environment variable: `MAX_CONCURRENT_WORKFLOWS`
    #[arg(long, env = "MAX_CONCURRENT_WORKFLOWS", default_value_t = DEFAULT_MAX_CONCURRENT_WORK_ITEMS)]
    pub max_concurrent_workflows: i32,

    /// Advisory limit on concurrently delivered activity work items.
    ///
    /// Environment variable: `MAX_CONCURRENT_ACTIVITIES`
    #[arg(long, env = "MAX_CONCURRENT_ACTIVITIES", default_value_t = DEFAULT_MAX_CONCURRENT_ACTIVITIES)]
    pub max_concurrent_activities: i32,

    /// Seconds to wait for the initial connection to the sidecar.
    ///
    /// Environment variable: `CONNECT_TIMEOUT_SECS`
    #[arg(long, env = "CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub connect_timeout_secs: u64,

    /// Seconds between HTTP/2 keep-alive pings on the sidecar channel.
    ///
    /// Environment variable: `KEEP_ALIVE_SECS`
    #[arg(long, env = "KEEP_ALIVE_SECS", default_value_t = 30)]
    pub keep_alive_secs: u64,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub sidecar_address: String,
    pub hints: ConcurrencyHints,
    pub connect_timeout: Duration,
    pub keep_alive_interval: Duration,
}

impl TryFrom<CliArgs> for WorkerConfig {
    type Error = Error;

    fn try_from(args: CliArgs) -> Result<Self> {
        let address = args.sidecar_address.trim();
        if !(address.starts_with("http://") || address.starts_with("https://")) {
            return Err(Error::invalid_configuration(format!(
                "SIDECAR_ADDRESS must start with http:// or https:// (got `{address}`)"
            )));
        }

        if args.connect_timeout_secs == 0 {
            return Err(Error::invalid_configuration(
                "CONNECT_TIMEOUT_SECS must be greater than 0",
            ));
        }

        if args.keep_alive_secs == 0 {
            return Err(Error::invalid_configuration(
                "KEEP_ALIVE_SECS must be greater than 0",
            ));
        }

        let hints =
            ConcurrencyHints::new(args.max_concurrent_workflows, args.max_concurrent_activities)?;

        Ok(Self {
            sidecar_address: address.to_owned(),
            hints,
            connect_timeout: Duration::from_secs(args.connect_timeout_secs),
            keep_alive_interval: Duration::from_secs(args.keep_alive_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every flag is passed on the command line, so `SIDECAR_ADDRESS` and
    /// friends set in the environment (or a `.env`) never leak into a test.
    fn parse(overrides: &[(&str, &str)]) -> CliArgs {
        let mut flags = vec![
            ("--sidecar-address", "http://localhost:4001"),
            ("--max-concurrent-workflows", "100"),
            ("--max-concurrent-activities", "100"),
            ("--connect-timeout-secs", "10"),
            ("--keep-alive-secs", "30"),
        ];
        for &(flag, value) in overrides {
            let slot = flags
                .iter_mut()
                .find(|(name, _)| *name == flag)
                .expect("unknown flag");
            slot.1 = value;
        }

        let argv = std::iter::once("durabletask-echo-worker")
            .chain(flags.into_iter().flat_map(|(flag, value)| [flag, value]));
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn explicit_flags_build_a_config() {
        let config = WorkerConfig::try_from(parse(&[
            ("--max-concurrent-workflows", "4"),
            ("--max-concurrent-activities", "16"),
            ("--connect-timeout-secs", "3"),
        ]))
        .unwrap();

        assert_eq!(config.sidecar_address, "http://localhost:4001");
        assert_eq!(config.hints.max_concurrent_work_items(), 4);
        assert_eq!(config.hints.max_concurrent_activities(), 16);
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.keep_alive_interval, Duration::from_secs(30));
    }

    #[test]
    fn rejects_non_positive_concurrency() {
        let err = WorkerConfig::try_from(parse(&[("--max-concurrent-activities", "0")]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration { .. }));
    }

    #[test]
    fn rejects_address_without_scheme() {
        let err = WorkerConfig::try_from(parse(&[("--sidecar-address", "localhost:4001")]))
            .unwrap_err();
        assert!(err.to_string().contains("SIDECAR_ADDRESS"));
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = WorkerConfig::try_from(parse(&[("--connect-timeout-secs", "0")])).unwrap_err();
        assert!(err.to_string().contains("CONNECT_TIMEOUT_SECS"));
    }

    #[test]
    fn rejects_zero_keep_alive() {
        let err = WorkerConfig::try_from(parse(&[("--keep-alive-secs", "0")])).unwrap_err();
        assert!(err.to_string().contains("KEEP_ALIVE_SECS"));
    }
}
