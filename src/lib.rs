//! kube-gateway-dns - An authoritative DNS server over Kubernetes gateway state.
//!
//! This crate serves DNS records derived from the externally reachable
//! objects of a Kubernetes cluster: Ingresses, LoadBalancer Services,
//! Gateway-API routes (HTTP/TLS/gRPC) and DNSEndpoint custom resources. For
//! each configured zone it answers A, AAAA, TXT, CNAME, SOA and NS queries,
//! follows in-zone CNAME chains, serves wildcard records, and produces full
//! zone transfers (AXFR) with an IXFR serial fast path.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                       kube-gateway-dns                        │
//! │                                                               │
//! │  ┌──────────────────┐ lookup() ┌──────────────────┐           │
//! │  │ indexer layer    │◀─────────│  Gateway         │           │
//! │  │ (cluster watch,  │  list()  │  (dispatcher,    │           │
//! │  │  out of crate)   │◀─────────│   apex, CNAME,   │           │
//! │  └──────────────────┘          │   zone transfer) │           │
//! │        │ mark_dirty()          └────────▲─────────┘           │
//! │        └───────────────────────────────▲│                     │
//! │                                ┌───────┴┴─────────┐           │
//! │                                │  Hickory DNS     │◀─ UDP/TCP │
//! │                                │  server          │    :53    │
//! │                                └──────────────────┘           │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Resolution
//!
//! ```text
//! svc1.ns1.example.com. A
//!   → match longest zone suffix (example.com.)
//!   → probe resource tables with [svc1.ns1.example.com, svc1.ns1]
//!   → wildcard fallback [*.ns1.example.com, *.ns1] when nothing matched
//!   → assemble answer (chase CNAME chains for address queries)
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use kube_gateway_dns::{DnsServer, Gateway, GatewayConfig};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config: GatewayConfig = load_config();
//!     let mut gateway = Gateway::new(&config).unwrap();
//!     // the indexer layer attaches its per-resource indexes here
//!     let server = DnsServer::new(Arc::new(gateway), config.listen_addr);
//!
//!     let shutdown = CancellationToken::new();
//!     server.run(shutdown).await.unwrap();
//! }
//! ```

#![warn(missing_docs)]

pub mod apex;
pub mod cname;
pub mod config;
pub mod error;
pub mod gateway;
pub mod lookup;
pub mod metrics;
pub mod records;
pub mod server;
pub mod snapshot;
pub mod telemetry;
pub mod xfr;

// Re-export main types
pub use cname::CnameChainError;
pub use config::{Config, GatewayConfig, KubeconfigConfig, SoaConfig, TelemetryConfig};
pub use error::{GatewayError, PLUGIN_NAME};
pub use gateway::{DnsAnswer, ExternalAddrFn, Gateway, Resolution, SyncProbe};
pub use lookup::{LookupResult, ResourceIndex, ResourceKind, ResourceTable};
pub use server::{DnsServer, GatewayHandler};
pub use snapshot::{EndpointRecord, EndpointRecordType, ResourceFilters, StoredObject, IGNORE_LABEL};
