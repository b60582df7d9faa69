//! Configuration types for kube-gateway-dns.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::GatewayError;
use crate::lookup::ResourceKind;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// DNS gateway configuration.
    pub gateway: GatewayConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// DNS gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Address for the DNS server to listen on (UDP and TCP).
    pub listen_addr: SocketAddr,

    /// Zones this instance is authoritative for (e.g. "example.com.").
    pub zones: Vec<String>,

    /// Resource kinds to serve, in priority order.
    #[serde(default = "default_resources")]
    pub resources: Vec<ResourceKind>,

    /// Allow-list of ingress classes (empty = all).
    #[serde(default)]
    pub ingress_classes: Vec<String>,

    /// Allow-list of gateway classes (empty = all).
    #[serde(default)]
    pub gateway_classes: Vec<String>,

    /// TTL for A/AAAA/TXT/CNAME records in seconds (0-3600).
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Apex label designating this instance's nameserver name within each
    /// zone (e.g. "dns1.kube-system").
    #[serde(default = "default_apex")]
    pub apex: String,

    /// Optional secondary nameserver label.
    #[serde(default)]
    pub secondary: Option<String>,

    /// Hostmaster local-part of the SOA RNAME.
    #[serde(default = "default_hostmaster")]
    pub hostmaster: String,

    /// SOA timer configuration.
    #[serde(default)]
    pub soa: SoaConfig,

    /// Zones for which no-data queries are delegated to the next handler.
    #[serde(default)]
    pub fallthrough_zones: Vec<String>,

    /// Maximum CNAME chain depth.
    #[serde(default = "default_cname_max_depth")]
    pub cname_max_depth: usize,

    /// External cluster access for the watcher.
    #[serde(default)]
    pub kubeconfig: Option<KubeconfigConfig>,
}

/// SOA (Start of Authority) timer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoaConfig {
    /// Refresh interval in seconds.
    #[serde(default = "default_refresh")]
    pub refresh: u32,

    /// Retry interval in seconds.
    #[serde(default = "default_retry")]
    pub retry: u32,

    /// Expire time in seconds.
    #[serde(default = "default_expire")]
    pub expire: u32,
}

impl Default for SoaConfig {
    fn default() -> Self {
        Self {
            refresh: default_refresh(),
            retry: default_retry(),
            expire: default_expire(),
        }
    }
}

/// Kubeconfig-based cluster access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubeconfigConfig {
    /// Path to the kubeconfig file.
    pub path: PathBuf,

    /// Optional context within the kubeconfig.
    #[serde(default)]
    pub context: Option<String>,
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g. "info", "kube_gateway_dns=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,

    /// OpenTelemetry configuration.
    #[serde(default)]
    pub opentelemetry: Option<OpenTelemetryConfig>,
}

/// OpenTelemetry exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTelemetryConfig {
    /// OTLP endpoint (e.g. "http://localhost:4317").
    pub endpoint: String,

    /// Service name for traces.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
            opentelemetry: None,
        }
    }
}

impl GatewayConfig {
    /// Check option values against their documented ranges.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.zones.is_empty() {
            return Err(GatewayError::Config("at least one zone is required".into()));
        }
        if self.ttl > 3600 {
            return Err(GatewayError::Config(format!(
                "ttl must be in range [0, 3600]: {}",
                self.ttl
            )));
        }
        if self.resources.is_empty() {
            return Err(GatewayError::Config(
                "at least one resource kind is required".into(),
            ));
        }
        if self.apex.is_empty() {
            return Err(GatewayError::Config("apex label must not be empty".into()));
        }
        if self.soa.refresh == 0 || self.soa.retry == 0 || self.soa.expire == 0 {
            return Err(GatewayError::Config(
                "soa refresh, retry and expire must be positive".into(),
            ));
        }
        if self.cname_max_depth == 0 {
            return Err(GatewayError::Config(
                "cname_max_depth must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "kube-gateway-dns".to_string()
}

fn default_resources() -> Vec<ResourceKind> {
    vec![ResourceKind::Ingress, ResourceKind::Service]
}

fn default_ttl() -> u32 {
    60
}

fn default_apex() -> String {
    "dns1.kube-system".to_string()
}

fn default_hostmaster() -> String {
    "hostmaster".to_string()
}

fn default_cname_max_depth() -> usize {
    10
}

fn default_refresh() -> u32 {
    7200
}

fn default_retry() -> u32 {
    1800
}

fn default_expire() -> u32 {
    86400
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> GatewayConfig {
        GatewayConfig {
            listen_addr: "127.0.0.1:5353".parse().unwrap(),
            zones: vec!["example.com.".to_string()],
            resources: default_resources(),
            ingress_classes: Vec::new(),
            gateway_classes: Vec::new(),
            ttl: default_ttl(),
            apex: default_apex(),
            secondary: None,
            hostmaster: default_hostmaster(),
            soa: SoaConfig::default(),
            fallthrough_zones: Vec::new(),
            cname_max_depth: default_cname_max_depth(),
            kubeconfig: None,
        }
    }

    #[test]
    fn defaults_pass_validation() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn ttl_out_of_range_is_rejected() {
        let mut config = base_config();
        config.ttl = 3601;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zones_are_required() {
        let mut config = base_config();
        config.zones.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn soa_timers_must_be_positive() {
        let mut config = base_config();
        config.soa.retry = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_resources_are_ingress_and_service() {
        assert_eq!(
            default_resources(),
            vec![ResourceKind::Ingress, ResourceKind::Service]
        );
    }
}
