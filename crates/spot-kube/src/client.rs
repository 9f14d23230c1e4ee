//! API client bootstrap.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::{info, warn};

use crate::error::{KubeError, Result};

/// Wire encoding requested from the API server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContentType {
    /// `application/json`
    #[default]
    Json,
    /// `application/vnd.kubernetes.protobuf`
    Protobuf,
}

impl ContentType {
    /// Returns the media type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Protobuf => "application/vnd.kubernetes.protobuf",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = KubeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "application/json" => Ok(Self::Json),
            "protobuf" | "application/vnd.kubernetes.protobuf" => Ok(Self::Protobuf),
            other => Err(KubeError::config(format!("unsupported content type {other:?}"))),
        }
    }
}

/// How to reach the API server.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Use the pod's service account instead of a kubeconfig.
    pub running_in_cluster: bool,
    /// Explicit kubeconfig path; the default lookup is used when unset.
    pub kubeconfig: Option<PathBuf>,
    /// Kubeconfig context to use instead of the current one.
    pub context: Option<String>,
    /// Requested wire encoding.
    pub content_type: ContentType,
}

impl ClientOptions {
    /// Options for in-cluster access.
    #[must_use]
    pub fn in_cluster() -> Self {
        Self {
            running_in_cluster: true,
            ..Self::default()
        }
    }

    /// Sets the kubeconfig path.
    #[must_use]
    pub fn with_kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }

    /// Sets the kubeconfig context.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Sets the wire encoding.
    #[must_use]
    pub const fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }
}

/// Loads the client configuration described by `options`.
pub async fn load_config(options: &ClientOptions) -> Result<Config> {
    if options.running_in_cluster {
        return Config::incluster().map_err(KubeError::config);
    }

    let kube_options = KubeConfigOptions {
        context: options.context.clone(),
        ..KubeConfigOptions::default()
    };
    match &options.kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                KubeError::config(format!("reading {}: {e}", path.display()))
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &kube_options)
                .await
                .map_err(KubeError::config)
        }
        None => Config::from_kubeconfig(&kube_options)
            .await
            .map_err(KubeError::config),
    }
}

/// Creates an API client.
pub async fn connect(options: &ClientOptions) -> Result<Client> {
    if options.content_type == ContentType::Protobuf {
        warn!("protobuf encoding is not supported, using json");
    }
    let config = load_config(options).await?;
    info!(
        cluster = %config.cluster_url,
        in_cluster = options.running_in_cluster,
        "connecting to kubernetes"
    );
    Client::try_from(config).map_err(KubeError::config)
}
