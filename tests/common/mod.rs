//! Shared test infrastructure for resolver and zone transfer integration
//! tests.

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder, BinEncoder};
use hickory_server::authority::{MessageRequest, MessageResponse};
use hickory_server::proto::rr::Record;
use hickory_server::proto::xfer::Protocol;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};

use kube_gateway_dns::config::{GatewayConfig, SoaConfig};
use kube_gateway_dns::gateway::Gateway;
use kube_gateway_dns::lookup::{LookupResult, ResourceIndex, ResourceKind};
use kube_gateway_dns::server::GatewayHandler;
use kube_gateway_dns::snapshot::StoredObject;

// --- Constants ---

pub const ZONE: &str = "example.com.";

/// 447 bytes, so TXT serving has to split it into two character strings.
pub const LOREM: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit, sed do \
    eiusmod tempor incididunt ut labore et dolore magna aliqua. Ut enim ad minim veniam, \
    quis nostrud exercitation ullamco laboris nisi ut aliquip ex ea commodo consequat. \
    Duis aute irure dolor in reprehenderit in voluptate velit esse cillum dolore eu \
    fugiat nulla pariatur. Excepteur sint occaecat cupidatat non proident, sunt in culpa \
    qui officia deserunt mollit anim id est laborum.";

// --- TestResponseHandler ---

/// Captures serialized DNS responses for inspection in tests.
///
/// Implements `ResponseHandler` so it can be passed to
/// `GatewayHandler::handle_request()`. Responses are serialized via
/// `MessageResponse::destructive_emit()` and stored as raw wire-format
/// bytes, which can then be parsed with `Message::from_vec()`. Zone
/// transfers send several messages per request, so the handler keeps them
/// all.
#[derive(Clone)]
pub struct TestResponseHandler {
    buffers: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl TestResponseHandler {
    pub fn new() -> Self {
        Self {
            buffers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Parse the single captured response into a `Message`.
    pub fn into_message(self) -> Message {
        let buffers = self.buffers.lock().unwrap();
        assert_eq!(buffers.len(), 1, "expected exactly one response message");
        Message::from_vec(&buffers[0]).expect("failed to parse captured DNS response")
    }

    /// Parse every captured response, in send order.
    pub fn into_messages(self) -> Vec<Message> {
        let buffers = self.buffers.lock().unwrap();
        buffers
            .iter()
            .map(|buf| Message::from_vec(buf).expect("failed to parse captured DNS response"))
            .collect()
    }
}

#[async_trait]
impl ResponseHandler for TestResponseHandler {
    async fn send_response<'a>(
        &mut self,
        response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        let mut buf = Vec::with_capacity(512);
        let mut encoder = BinEncoder::new(&mut buf);
        encoder.set_max_size(u16::MAX);
        let info = response
            .destructive_emit(&mut encoder)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        self.buffers.lock().unwrap().push(buf);
        Ok(info)
    }
}

// --- Table fixtures ---

/// In-memory resource index standing in for the cluster indexer.
#[derive(Default)]
pub struct TableFixture {
    addresses: HashMap<String, Vec<IpAddr>>,
    texts: HashMap<String, Vec<String>>,
    cnames: HashMap<String, Vec<String>>,
    objects: Vec<StoredObject>,
}

impl TableFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_addresses(mut self, key: &str, addrs: &[&str]) -> Self {
        self.addresses.insert(
            key.to_string(),
            addrs.iter().map(|ip| ip.parse().unwrap()).collect(),
        );
        self
    }

    pub fn with_text(mut self, key: &str, text: &str) -> Self {
        self.texts
            .entry(key.to_string())
            .or_default()
            .push(text.to_string());
        self
    }

    pub fn with_cname(mut self, key: &str, target: &str) -> Self {
        self.cnames
            .entry(key.to_string())
            .or_default()
            .push(target.to_string());
        self
    }

    pub fn with_object(mut self, object: StoredObject) -> Self {
        self.objects.push(object);
        self
    }
}

impl ResourceIndex for TableFixture {
    fn lookup(&self, keys: &[String]) -> LookupResult {
        let mut result = LookupResult::default();
        for key in keys {
            if let Some(addrs) = self.addresses.get(key) {
                result.addresses.extend(addrs.iter().copied());
            }
            if let Some(texts) = self.texts.get(key) {
                result.texts.extend(texts.iter().cloned());
            }
            if let Some(cnames) = self.cnames.get(key) {
                result.cnames.extend(cnames.iter().cloned());
            }
        }
        result
    }

    fn list(&self) -> Vec<StoredObject> {
        self.objects.clone()
    }
}

/// A stored object contributing plain host/address records.
pub fn host_object(host: &str, addrs: &[&str]) -> StoredObject {
    StoredObject {
        hosts: vec![host.to_string()],
        addresses: addrs.iter().map(|ip| ip.parse().unwrap()).collect(),
        ..StoredObject::default()
    }
}

// --- Gateway builders ---

pub fn test_gateway_config() -> GatewayConfig {
    GatewayConfig {
        listen_addr: "127.0.0.1:5353".parse().unwrap(),
        zones: vec![ZONE.to_string()],
        resources: vec![
            ResourceKind::HTTPRoute,
            ResourceKind::TLSRoute,
            ResourceKind::GRPCRoute,
            ResourceKind::Ingress,
            ResourceKind::Service,
            ResourceKind::DNSEndpoint,
        ],
        ingress_classes: Vec::new(),
        gateway_classes: Vec::new(),
        ttl: 60,
        apex: "dns1.kube-system".to_string(),
        secondary: None,
        hostmaster: "hostmaster".to_string(),
        soa: SoaConfig::default(),
        fallthrough_zones: Vec::new(),
        cname_max_depth: 10,
        kubeconfig: None,
    }
}

/// Gateway populated with the canonical test snapshot: services, ingresses
/// (with wildcard records), routes shadowing ingresses, and DNSEndpoints
/// carrying a long TXT value.
pub fn populated_gateway(config: GatewayConfig) -> Gateway {
    let mut gateway = Gateway::new(&config).expect("failed to build gateway");

    let services = TableFixture::new()
        .with_addresses("svc1.ns1", &["192.0.1.1", "fd12:3456:789a:1::"])
        .with_addresses("svc2.ns1", &["192.0.1.2"])
        .with_addresses("svc3.ns1", &[])
        .with_addresses("dns1.kube-system", &["192.0.1.53"])
        .with_object(host_object("svc1.ns1.example.com", &["192.0.1.1", "fd12:3456:789a:1::"]))
        .with_object(host_object("svc2.ns1.example.com", &["192.0.1.2"]));
    gateway.set_index(ResourceKind::Service, Arc::new(services));

    let ingresses = TableFixture::new()
        .with_addresses("domain.example.com", &["192.0.0.1"])
        .with_addresses("svc2.ns1.example.com", &["192.0.0.2"])
        .with_addresses("example.com", &["192.0.0.3"])
        .with_addresses("shadow.example.com", &["192.0.0.4"])
        .with_addresses("*.wildcard.example.com", &["192.0.0.6"])
        .with_addresses("specific-subdomain.wildcard.example.com", &["192.0.0.7"])
        .with_object(host_object("domain.example.com", &["192.0.0.1"]));
    gateway.set_index(ResourceKind::Ingress, Arc::new(ingresses));

    let routes = TableFixture::new()
        .with_addresses("domain.gw.example.com", &["192.0.2.1"])
        .with_addresses("shadow.example.com", &["192.0.2.4"]);
    gateway.set_index(ResourceKind::HTTPRoute, Arc::new(routes));

    let endpoints = TableFixture::new()
        .with_addresses("endpoint.example.com", &["192.0.4.4"])
        .with_text("endpoint.example.com", LOREM)
        .with_cname("www.example.com", "app.example.com")
        .with_cname("app.example.com", "service.example.com")
        .with_cname("service.example.com", "api.example.com")
        .with_addresses("api.example.com", &["10.0.1.100", "10.0.1.101"])
        .with_cname("loop1.example.com", "loop2.example.com")
        .with_cname("loop2.example.com", "loop1.example.com")
        .with_cname("external.example.com", "cdn.provider.net");
    gateway.set_index(ResourceKind::DNSEndpoint, Arc::new(endpoints));

    gateway
}

// --- Query/Request construction ---

/// Build wire-format bytes for a DNS query.
pub fn build_query_bytes(name: &str, record_type: RecordType, id: u16) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    let mut query = Query::new();
    query.set_name(Name::from_ascii(name).unwrap());
    query.set_query_type(record_type);
    query.set_query_class(DNSClass::IN);
    msg.add_query(query);
    msg.to_vec().unwrap()
}

/// Parse wire bytes into a MessageRequest.
pub fn parse_message_request(bytes: &[u8]) -> MessageRequest {
    let mut decoder = BinDecoder::new(bytes);
    MessageRequest::read(&mut decoder).expect("failed to parse MessageRequest")
}

/// Build a full `Request`.
pub fn build_request(name: &str, record_type: RecordType, protocol: Protocol) -> Request {
    let bytes = build_query_bytes(name, record_type, 4096);
    let msg = parse_message_request(&bytes);
    let src: SocketAddr = "127.0.0.1:53210".parse().unwrap();
    Request::new(msg, src, protocol)
}

// --- Response helpers ---

/// Execute a query through the handler and return the parsed response.
pub async fn execute_query(gateway: Arc<Gateway>, name: &str, record_type: RecordType) -> Message {
    let handler = GatewayHandler::new(gateway);
    let request = build_request(name, record_type, Protocol::Udp);
    let capture = TestResponseHandler::new();
    handler.handle_request(&request, capture.clone()).await;
    capture.into_message()
}

/// Execute a zone transfer request over TCP and return every message.
pub async fn execute_transfer(gateway: Arc<Gateway>, name: &str) -> Vec<Message> {
    let handler = GatewayHandler::new(gateway);
    let request = build_request(name, RecordType::AXFR, Protocol::Tcp);
    let capture = TestResponseHandler::new();
    handler.handle_request(&request, capture.clone()).await;
    capture.into_messages()
}

/// Extract IPv4 addresses from the answer section.
pub fn extract_a_ips(msg: &Message) -> Vec<Ipv4Addr> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::A(a) => Some(Ipv4Addr::from(*a)),
            _ => None,
        })
        .collect()
}

/// Extract IPv6 addresses from the answer section.
pub fn extract_aaaa_ips(msg: &Message) -> Vec<Ipv6Addr> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::AAAA(aaaa) => Some(Ipv6Addr::from(*aaaa)),
            _ => None,
        })
        .collect()
}

/// Assert response code.
pub fn assert_response_code(msg: &Message, expected: ResponseCode) {
    assert_eq!(
        msg.response_code(),
        expected,
        "expected {:?}, got {:?}",
        expected,
        msg.response_code()
    );
}

/// Assert the response is authoritative and successful with exactly the
/// expected IPv4 addresses.
pub fn assert_a_response(msg: &Message, expected_ips: &[&str]) {
    assert_response_code(msg, ResponseCode::NoError);
    assert!(msg.authoritative(), "expected AA=1");
    let mut actual = extract_a_ips(msg);
    actual.sort();
    let mut expected: Vec<Ipv4Addr> = expected_ips.iter().map(|ip| ip.parse().unwrap()).collect();
    expected.sort();
    assert_eq!(
        actual, expected,
        "A records mismatch.\nactual:   {:?}\nexpected: {:?}",
        actual, expected
    );
}

/// The single SOA record in the authority section, if any.
pub fn authority_soa(msg: &Message) -> Option<&Record> {
    msg.name_servers()
        .iter()
        .find(|r| r.record_type() == RecordType::SOA)
}
