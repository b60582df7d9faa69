//! Zone transfer (AXFR/IXFR) production.
//!
//! A transfer is a channel of record groups: opening SOA, apex NS and glue,
//! one group per owner name in ascending lexicographic order, closing SOA
//! identical to the opening one. When the caller's serial already matches,
//! the stream collapses to a single SOA. The producer closes the channel on
//! every exit path; a panic while walking a resource table is caught and
//! logged, and the consumer simply observes an early end of stream.

use hickory_proto::rr::{Name, RData, Record, RecordType};
use std::backtrace::Backtrace;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::lookup::{canonicalize, ResourceKind};
use crate::metrics;
use crate::records;
use crate::snapshot::{self, EndpointRecordType, StoredObject};

/// Capacity of the transfer channel; the producer blocks once the consumer
/// stops draining.
const TRANSFER_CHANNEL_CAPACITY: usize = 16;

impl Gateway {
    /// Start a zone transfer. `serial` is the caller's known serial; 0 means
    /// a full transfer. The returned channel yields one record group per
    /// send and closes after the final SOA.
    pub fn transfer(
        self: Arc<Self>,
        zone: &str,
        serial: u32,
    ) -> Result<mpsc::Receiver<Vec<Record>>, GatewayError> {
        let zone = canonicalize(zone);
        if !self.zones().contains(&zone) {
            return Err(GatewayError::NotAuthoritative(zone));
        }

        let soa = self.soa_record(&zone);
        let current = soa_serial(&soa);

        // IXFR fast path: the caller is already up to date.
        if serial != 0 && current == serial {
            metrics::record_transfer("ixfr_uptodate");
            let (tx, rx) = mpsc::channel(1);
            let _ = tx.try_send(vec![soa]);
            return Ok(rx);
        }

        metrics::record_transfer("axfr");
        let (tx, rx) = mpsc::channel(TRANSFER_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            self.produce_transfer(&zone, soa, tx).await;
        });
        Ok(rx)
    }

    async fn produce_transfer(&self, zone: &str, soa: Record, tx: mpsc::Sender<Vec<Record>>) {
        if tx.send(vec![soa.clone()]).await.is_err() {
            return;
        }

        for ns in self.nameservers(zone) {
            if tx.send(vec![ns]).await.is_err() {
                return;
            }
        }

        let mut glue = self.external_addresses(zone, RecordType::NS);
        for rr in &mut glue {
            rr.set_ttl(self.ttl_soa);
        }
        if !glue.is_empty() && tx.send(glue).await.is_err() {
            return;
        }

        let groups = match catch_unwind(AssertUnwindSafe(|| self.collect_zone_records(zone))) {
            Ok(groups) => groups,
            Err(panic) => {
                error!(
                    zone,
                    panic = panic_message(&*panic),
                    backtrace = %Backtrace::force_capture(),
                    "panic while collecting zone transfer records"
                );
                return;
            }
        };

        for (name, group) in groups {
            debug!(zone, %name, records = group.len(), "sending transfer group");
            if tx.send(group).await.is_err() {
                return;
            }
        }

        // Close the stream with the same SOA it opened with.
        let _ = tx.send(vec![soa]).await;
    }

    /// Walk every table's backing store and group records by owner name.
    /// BTreeMap iteration gives the lexicographic send order.
    fn collect_zone_records(&self, zone: &str) -> BTreeMap<String, Vec<Record>> {
        let mut groups = BTreeMap::new();

        if !self.is_synced() {
            warn!(zone, "indexer not synced, zone transfer contains apex records only");
            return groups;
        }

        for table in &self.tables {
            for object in table.index.list() {
                if snapshot::ignored(&object.labels) {
                    continue;
                }
                if !self.admits(table.kind, &object) {
                    continue;
                }
                self.collect_object_records(&mut groups, zone, &object);
            }
        }

        groups
    }

    fn admits(&self, kind: ResourceKind, object: &StoredObject) -> bool {
        match kind {
            ResourceKind::Ingress => self
                .filters
                .admits_ingress_class(object.ingress_class.as_deref()),
            ResourceKind::HTTPRoute | ResourceKind::TLSRoute | ResourceKind::GRPCRoute => self
                .filters
                .admits_gateway_class(object.gateway_class.as_deref()),
            _ => true,
        }
    }

    fn collect_object_records(
        &self,
        groups: &mut BTreeMap<String, Vec<Record>>,
        zone: &str,
        object: &StoredObject,
    ) {
        for host in &object.hosts {
            let Some((fqdn, owner)) = owner_in_zone(host, zone) else {
                continue;
            };
            add_group(groups, &fqdn, records::a_records(&owner, self.ttl_low, &object.addresses));
            add_group(
                groups,
                &fqdn,
                records::aaaa_records(&owner, self.ttl_low, &object.addresses),
            );
        }

        for endpoint in &object.endpoints {
            let Some((fqdn, owner)) = owner_in_zone(&endpoint.dns_name, zone) else {
                continue;
            };
            match endpoint.record_type {
                EndpointRecordType::A | EndpointRecordType::Aaaa => {
                    let addrs: Vec<_> = endpoint
                        .targets
                        .iter()
                        .filter_map(|t| match t.parse() {
                            Ok(addr) => Some(addr),
                            Err(err) => {
                                debug!(address = %t, %err, "skipping invalid endpoint address");
                                None
                            }
                        })
                        .collect();
                    let rrs = if endpoint.record_type == EndpointRecordType::A {
                        records::a_records(&owner, self.ttl_low, &addrs)
                    } else {
                        records::aaaa_records(&owner, self.ttl_low, &addrs)
                    };
                    add_group(groups, &fqdn, rrs);
                }
                EndpointRecordType::Txt => {
                    add_group(
                        groups,
                        &fqdn,
                        records::txt_records(&owner, self.ttl_low, &endpoint.targets),
                    );
                }
            }
        }
    }
}

/// Canonicalize a host string and keep it only when it lies within the zone.
fn owner_in_zone(host: &str, zone: &str) -> Option<(String, Name)> {
    let fqdn = canonicalize(host);
    if !fqdn.ends_with(zone) {
        return None;
    }
    match Name::from_ascii(&fqdn) {
        Ok(owner) => Some((fqdn, owner)),
        Err(err) => {
            debug!(host = %host, %err, "skipping unparseable host string");
            None
        }
    }
}

fn add_group(groups: &mut BTreeMap<String, Vec<Record>>, fqdn: &str, rrs: Vec<Record>) {
    if !rrs.is_empty() {
        groups.entry(fqdn.to_string()).or_default().extend(rrs);
    }
}

fn soa_serial(record: &Record) -> u32 {
    match record.data() {
        RData::SOA(soa) => soa.serial(),
        _ => 0,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}
