//! Command-line flags.
//!
//! Every flag can also be set through a `SPOT_RESCHEDULER_*` environment
//! variable.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use spot_core::ReschedulerConfig;
use spot_core::config::{DEFAULT_ON_DEMAND_LABEL, DEFAULT_SPOT_LABEL};
use spot_kube::{ClientOptions, ContentType};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Moves pods from on-demand nodes onto spot nodes whenever the spot nodes
/// have room for them.
#[derive(Parser, Debug, Clone)]
#[command(name = "spot-rescheduler")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Use the pod's service account to reach the API server.
    #[arg(long, env = "SPOT_RESCHEDULER_RUNNING_IN_CLUSTER", default_value_t = true, action = ArgAction::Set)]
    pub running_in_cluster: bool,

    /// Kubeconfig to use when not running in the cluster.
    #[arg(long, env = "SPOT_RESCHEDULER_KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use.
    #[arg(long, env = "SPOT_RESCHEDULER_CONTEXT")]
    pub context: Option<String>,

    /// Content type of requests sent to the API server.
    #[arg(long, env = "SPOT_RESCHEDULER_KUBE_API_CONTENT_TYPE", default_value = "application/json")]
    pub kube_api_content_type: ContentType,

    /// How often to look for a node to drain.
    #[arg(long, env = "SPOT_RESCHEDULER_HOUSEKEEPING_INTERVAL", default_value = "10s", value_parser = humantime::parse_duration)]
    pub housekeeping_interval: Duration,

    /// How long to wait after a drain before trying the next node.
    #[arg(long, env = "SPOT_RESCHEDULER_NODE_DRAIN_DELAY", default_value = "10m", value_parser = humantime::parse_duration)]
    pub node_drain_delay: Duration,

    /// How long to keep retrying the eviction of a pod.
    #[arg(long, env = "SPOT_RESCHEDULER_POD_EVICTION_TIMEOUT", default_value = "2m", value_parser = humantime::parse_duration)]
    pub pod_eviction_timeout: Duration,

    /// Upper bound on the termination grace period given to evicted pods.
    #[arg(long, env = "SPOT_RESCHEDULER_MAX_GRACEFUL_TERMINATION", default_value = "2m", value_parser = humantime::parse_duration)]
    pub max_graceful_termination: Duration,

    /// Address of the metrics and status endpoints.
    #[arg(long, env = "SPOT_RESCHEDULER_LISTEN_ADDRESS", default_value = "localhost:9235")]
    pub listen_address: String,

    /// Label key marking on-demand nodes.
    #[arg(long, env = "SPOT_RESCHEDULER_ON_DEMAND_NODE_LABEL", default_value = DEFAULT_ON_DEMAND_LABEL)]
    pub on_demand_node_label: String,

    /// Label key marking spot nodes.
    #[arg(long, env = "SPOT_RESCHEDULER_SPOT_NODE_LABEL", default_value = DEFAULT_SPOT_LABEL)]
    pub spot_node_label: String,

    /// Log output format.
    #[arg(long, env = "SPOT_RESCHEDULER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Log planned drains without evicting anything.
    #[arg(long, env = "SPOT_RESCHEDULER_DRY_RUN")]
    pub dry_run: bool,
}

impl Cli {
    /// Builds and validates the control loop configuration.
    pub fn config(&self) -> spot_core::Result<ReschedulerConfig> {
        let config = ReschedulerConfig::new()
            .with_housekeeping_interval(self.housekeeping_interval)
            .with_node_drain_delay(self.node_drain_delay)
            .with_pod_eviction_timeout(self.pod_eviction_timeout)
            .with_max_graceful_termination(self.max_graceful_termination)
            .with_on_demand_label(&self.on_demand_node_label)
            .with_spot_label(&self.spot_node_label)
            .with_dry_run(self.dry_run);
        config.validate()?;
        Ok(config)
    }

    /// Returns how to reach the API server.
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            running_in_cluster: self.running_in_cluster,
            kubeconfig: self.kubeconfig.clone(),
            context: self.context.clone(),
            content_type: self.kube_api_content_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spot_core::ReschedulerError;
    use test_case::test_case;

    fn parse(args: &[&str]) -> Cli {
        let argv = std::iter::once("spot-rescheduler").chain(args.iter().copied());
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults() {
        let cli = parse(&[]);
        assert!(cli.running_in_cluster);
        assert_eq!(cli.kube_api_content_type, ContentType::Json);
        assert_eq!(cli.listen_address, "localhost:9235");
        assert_eq!(cli.log_format, LogFormat::Text);

        let config = cli.config().unwrap();
        assert_eq!(config, ReschedulerConfig::default());
    }

    #[test]
    fn durations_and_labels() {
        let cli = parse(&[
            "--housekeeping-interval", "30s",
            "--node-drain-delay", "1h 30m",
            "--pod-eviction-timeout", "90s",
            "--max-graceful-termination", "45s",
            "--on-demand-node-label", "lifecycle/on-demand",
            "--spot-node-label", "lifecycle/spot",
            "--dry-run",
        ]);
        let config = cli.config().unwrap();
        assert_eq!(config.housekeeping_interval, Duration::from_secs(30));
        assert_eq!(config.node_drain_delay, Duration::from_secs(90 * 60));
        assert_eq!(config.pod_eviction_timeout, Duration::from_secs(90));
        assert_eq!(config.max_graceful_termination, Duration::from_secs(45));
        assert_eq!(config.on_demand_label, "lifecycle/on-demand");
        assert_eq!(config.spot_label, "lifecycle/spot");
        assert!(config.dry_run);
    }

    #[test]
    fn kubeconfig_outside_the_cluster() {
        let cli = parse(&[
            "--running-in-cluster=false",
            "--kubeconfig", "/home/me/.kube/config",
            "--context", "staging",
        ]);
        let options = cli.client_options();
        assert!(!options.running_in_cluster);
        assert_eq!(options.kubeconfig, Some(PathBuf::from("/home/me/.kube/config")));
        assert_eq!(options.context.as_deref(), Some("staging"));
    }

    #[test_case("application/vnd.kubernetes.protobuf", ContentType::Protobuf ; "protobuf")]
    #[test_case("json", ContentType::Json ; "json")]
    fn content_type(value: &str, expected: ContentType) {
        let cli = parse(&["--kube-api-content-type", value]);
        assert_eq!(cli.kube_api_content_type, expected);
    }

    #[test]
    fn json_logs() {
        assert_eq!(parse(&["--log-format", "json"]).log_format, LogFormat::Json);
    }

    #[test_case(&["--housekeeping-interval", "soon"] ; "bad duration")]
    #[test_case(&["--kube-api-content-type", "yaml"] ; "bad content type")]
    #[test_case(&["--log-format", "xml"] ; "bad log format")]
    fn rejects_invalid_flags(args: &[&str]) {
        let argv = std::iter::once("spot-rescheduler").chain(args.iter().copied());
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn rejects_shared_labels() {
        let cli = parse(&["--on-demand-node-label", "role", "--spot-node-label", "role"]);
        assert!(matches!(cli.config(), Err(ReschedulerError::InvalidConfig { .. })));
    }

    #[test]
    fn rejects_zero_interval() {
        let cli = parse(&["--housekeeping-interval", "0s"]);
        assert!(matches!(cli.config(), Err(ReschedulerError::InvalidConfig { .. })));
    }
}
