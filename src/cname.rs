//! Bounded CNAME chain resolution.
//!
//! The resolver re-enters the index lookup pipeline for each hop, carrying a
//! visited set of canonical names. A name stays visited for the duration of
//! the whole resolution, so no branch can revisit it. Targets outside every
//! configured zone resolve to success-with-empty: external resolution is the
//! next handler's job.

use std::collections::HashSet;
use std::net::IpAddr;
use thiserror::Error;
use tracing::debug;

use crate::gateway::Gateway;
use crate::lookup::{canonicalize, first_match, query_index_key_sets};

/// Why a CNAME chain could not be resolved.
#[derive(Debug, Error)]
pub enum CnameChainError {
    /// The chain exceeded the configured depth limit.
    #[error("CNAME chain depth limit ({limit}) reached at {target}")]
    DepthExceeded {
        /// Hop at which the limit was hit.
        target: String,
        /// The configured limit.
        limit: usize,
    },

    /// The chain revisited a name.
    #[error("CNAME loop detected at {target}")]
    LoopDetected {
        /// The revisited canonical name.
        target: String,
    },

    /// The chain ended on an in-zone name with no records.
    #[error("CNAME target {target} not found in zone {zone}")]
    DeadEnd {
        /// The dangling canonical target.
        target: String,
        /// The zone being served.
        zone: String,
    },
}

impl CnameChainError {
    /// Stable label for metrics.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            CnameChainError::DepthExceeded { .. } => "depth_exceeded",
            CnameChainError::LoopDetected { .. } => "loop",
            CnameChainError::DeadEnd { .. } => "dead_end",
        }
    }
}

impl Gateway {
    /// Follow a CNAME chain to final addresses. Returns an empty list when
    /// the chain leaves the zone.
    pub(crate) fn resolve_cname_chain(
        &self,
        target: &str,
        zone: &str,
    ) -> Result<Vec<IpAddr>, CnameChainError> {
        let mut visited = HashSet::new();
        self.resolve_cname_step(
            target,
            &canonicalize(zone),
            self.cname_max_depth,
            &mut visited,
        )
    }

    fn resolve_cname_step(
        &self,
        target: &str,
        zone: &str,
        remaining_depth: usize,
        visited: &mut HashSet<String>,
    ) -> Result<Vec<IpAddr>, CnameChainError> {
        let canonical = canonicalize(target);
        debug!(target = %canonical, remaining_depth, "resolving CNAME hop");

        if remaining_depth == 0 {
            return Err(CnameChainError::DepthExceeded {
                target: canonical,
                limit: self.cname_max_depth,
            });
        }
        if !visited.insert(canonical.clone()) {
            return Err(CnameChainError::LoopDetected { target: canonical });
        }

        let key_sets = query_index_key_sets(&canonical, zone);
        let result = first_match(&self.tables, &key_sets);

        if !result.addresses.is_empty() {
            return Ok(result.addresses);
        }
        if let Some(next) = result.cnames.first() {
            return self.resolve_cname_step(next, zone, remaining_depth - 1, visited);
        }
        if !canonical.ends_with(zone) {
            debug!(target = %canonical, zone, "CNAME target is external to the zone");
            return Ok(Vec::new());
        }

        Err(CnameChainError::DeadEnd {
            target: canonical,
            zone: zone.to_string(),
        })
    }
}
