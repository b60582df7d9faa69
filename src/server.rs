//! DNS server setup and lifecycle management.
//!
//! [`GatewayHandler`] is the wire-facing side of the engine: it feeds
//! queries into [`Gateway::resolve`], writes the resulting sections back
//! with `AA=1`, and streams zone transfers over TCP. [`DnsServer`] owns the
//! sockets and runs until the cancellation token fires.

use async_trait::async_trait;
use hickory_proto::op::{Header, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::{RData, Record, RecordType};
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::proto::xfer::Protocol;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use hickory_server::ServerFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::GatewayError;
use crate::gateway::{Gateway, Resolution};
use crate::metrics::{self, QueryResult, Timer};

/// TCP connection timeout handed to the hickory listener.
const TCP_TIMEOUT: Duration = Duration::from_secs(30);

/// Records per response message when streaming a zone transfer.
const XFR_BATCH_SIZE: usize = 64;

/// Interval between readiness probes before serving starts.
const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// hickory `RequestHandler` backed by a [`Gateway`].
#[derive(Clone)]
pub struct GatewayHandler {
    gateway: Arc<Gateway>,
}

impl GatewayHandler {
    /// Wrap a gateway for serving.
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    async fn serve_query<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        let timer = Timer::start();
        let request_info = match request.request_info() {
            Ok(info) => info,
            Err(err) => {
                warn!(%err, "malformed query");
                return self
                    .respond_error(request, &mut response_handle, ResponseCode::FormErr)
                    .await;
            }
        };
        let qname = request_info.query.original().name().clone();
        let qtype = request_info.query.query_type();

        match self.gateway.resolve(&qname, qtype) {
            Ok(Resolution::Answer(answer)) => {
                let mut header = Header::response_from_request(request.header());
                header.set_authoritative(true);
                header.set_recursion_available(false);
                header.set_response_code(answer.rcode);

                let result = if answer.rcode == ResponseCode::NXDomain {
                    QueryResult::NxDomain
                } else {
                    QueryResult::Success
                };
                metrics::record_query(qtype, result, timer.elapsed());

                let response = MessageResponseBuilder::from_message_request(request).build(
                    header,
                    answer.answer.iter(),
                    answer.authority.iter(),
                    std::iter::empty(),
                    answer.extra.iter(),
                );
                match response_handle.send_response(response).await {
                    Ok(info) => info,
                    Err(err) => {
                        error!(%err, "failed to send a response");
                        serve_failed()
                    }
                }
            }
            Ok(Resolution::Delegate) => {
                // No next handler on this wire: surface the delegation as
                // REFUSED.
                debug!(name = %qname, "delegating query (answering REFUSED)");
                metrics::record_query(qtype, QueryResult::Delegated, timer.elapsed());
                self.respond_error(request, &mut response_handle, ResponseCode::Refused)
                    .await
            }
            Err(err) => {
                error!(%err, "query rejected");
                metrics::record_query(qtype, QueryResult::NotReady, timer.elapsed());
                self.respond_error(request, &mut response_handle, ResponseCode::ServFail)
                    .await
            }
        }
    }

    async fn serve_transfer<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        let request_info = match request.request_info() {
            Ok(info) => info,
            Err(err) => {
                warn!(%err, "malformed transfer request");
                return self
                    .respond_error(request, &mut response_handle, ResponseCode::FormErr)
                    .await;
            }
        };
        let zone = request_info.query.original().name().to_string();

        if request.protocol() != Protocol::Tcp {
            warn!(zone = %zone, "zone transfer requested over UDP, refusing");
            return self
                .respond_error(request, &mut response_handle, ResponseCode::Refused)
                .await;
        }

        // An IXFR carries the caller's SOA in the authority section; its
        // serial selects the fast path. AXFR means "from scratch".
        let serial = request
            .name_servers()
            .iter()
            .find_map(|rr| match rr.data() {
                RData::SOA(soa) => Some(soa.serial()),
                _ => None,
            })
            .unwrap_or(0);

        let mut stream = match Arc::clone(&self.gateway).transfer(&zone, serial) {
            Ok(stream) => stream,
            Err(err) => {
                warn!(zone = %zone, %err, "refusing zone transfer");
                return self
                    .respond_error(request, &mut response_handle, ResponseCode::Refused)
                    .await;
            }
        };

        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(true);
        header.set_recursion_available(false);

        let mut last_info = ResponseInfo::from(header);
        let mut batch: Vec<Record> = Vec::with_capacity(XFR_BATCH_SIZE);
        loop {
            let group = stream.recv().await;
            let flush = match &group {
                Some(records) => batch.len() + records.len() > XFR_BATCH_SIZE && !batch.is_empty(),
                None => !batch.is_empty(),
            };
            if flush {
                let response = MessageResponseBuilder::from_message_request(request).build(
                    header,
                    batch.iter(),
                    std::iter::empty(),
                    std::iter::empty(),
                    std::iter::empty(),
                );
                match response_handle.send_response(response).await {
                    Ok(info) => last_info = info,
                    Err(err) => {
                        error!(zone = %zone, %err, "failed to send transfer message");
                        return serve_failed();
                    }
                }
                batch.clear();
            }
            match group {
                Some(records) => batch.extend(records),
                None => break,
            }
        }

        last_info
    }

    async fn respond_error<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: &mut R,
        code: ResponseCode,
    ) -> ResponseInfo {
        let response =
            MessageResponseBuilder::from_message_request(request).error_msg(request.header(), code);
        match response_handle.send_response(response).await {
            Ok(info) => info,
            Err(err) => {
                error!(%err, "failed to send a response");
                serve_failed()
            }
        }
    }
}

#[async_trait]
impl RequestHandler for GatewayHandler {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        if request.message_type() != MessageType::Query || request.op_code() != OpCode::Query {
            debug!(op = ?request.op_code(), "unsupported request");
            return self
                .respond_error(request, &mut response_handle, ResponseCode::NotImp)
                .await;
        }

        let is_transfer = request
            .request_info()
            .map(|info| {
                matches!(
                    info.query.query_type(),
                    RecordType::AXFR | RecordType::IXFR
                )
            })
            .unwrap_or(false);

        if is_transfer {
            self.serve_transfer(request, response_handle).await
        } else {
            self.serve_query(request, response_handle).await
        }
    }
}

fn serve_failed() -> ResponseInfo {
    let mut header = Header::new();
    header.set_response_code(ResponseCode::ServFail);
    header.into()
}

/// DNS server serving a [`Gateway`] over UDP and TCP.
pub struct DnsServer {
    listen_addr: SocketAddr,
    gateway: Arc<Gateway>,
}

impl DnsServer {
    /// Create a new DNS server for an assembled gateway.
    pub fn new(gateway: Arc<Gateway>, listen_addr: SocketAddr) -> Self {
        Self {
            gateway,
            listen_addr,
        }
    }

    /// Get a reference to the gateway.
    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Run the DNS server until the token is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), GatewayError> {
        info!(
            listen_addr = %self.listen_addr,
            zones = ?self.gateway.zones(),
            "Starting kube-gateway-dns server"
        );

        // Wait for the indexer's initial sync before serving.
        info!("Waiting for initial resource sync...");
        loop {
            if shutdown.is_cancelled() {
                info!("Shutdown requested before resource sync completed");
                return Ok(());
            }
            if self.gateway.is_synced() {
                info!("Initial resource sync complete");
                break;
            }
            tokio::time::sleep(READINESS_POLL_INTERVAL).await;
        }

        let handler = GatewayHandler::new(Arc::clone(&self.gateway));
        let mut server = ServerFuture::new(handler);

        let udp_socket = UdpSocket::bind(self.listen_addr).await?;
        info!(addr = %self.listen_addr, "DNS UDP listening");
        server.register_socket(udp_socket);

        let tcp_listener = TcpListener::bind(self.listen_addr).await?;
        info!(addr = %self.listen_addr, "DNS TCP listening");
        server.register_listener(tcp_listener, TCP_TIMEOUT);

        info!("DNS server ready to serve queries");

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("DNS server shutdown requested");
            }
            result = server.block_until_done() => {
                if let Err(e) = result {
                    error!("DNS server error: {}", e);
                }
            }
        }

        info!("DNS server stopped");
        Ok(())
    }
}
