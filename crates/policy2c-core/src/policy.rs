//! In-memory secure-streams policy graph.
//!
//! The graph is an arena: shared objects (retry tables, trust stores, certificates,
//! auth records) live in their own vectors and are referenced from stream types by
//! typed index. An id is the object's identity; two retry tables with identical
//! contents but different ids are different objects.
//!
//! `policies`, `auths` and each policy's `metadata` are kept in list order. Lists are
//! linked head-first as they are parsed, so list order is the reverse of declaration
//! order.

use serde::Serialize;

/// Number of header-blob name slots on an HTTP stream type.
pub const BLOB_HEADER_SLOTS: usize = 4;

/// Capacity of the certificate reference array in a trust store.
pub const MAX_TRUST_STORE_CERTS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RetryId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TrustStoreId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CertId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AuthId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolKind {
    H1,
    H2,
    Ws,
    Mqtt,
    /// Raw sockets. Parsed, but has no static representation.
    Raw,
}

impl ProtocolKind {
    pub fn tag(self) -> u8 {
        match self {
            ProtocolKind::H1 => 0,
            ProtocolKind::H2 => 1,
            ProtocolKind::Ws => 2,
            ProtocolKind::Mqtt => 3,
            ProtocolKind::Raw => 4,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ProtocolKind::H1),
            1 => Some(ProtocolKind::H2),
            2 => Some(ProtocolKind::Ws),
            3 => Some(ProtocolKind::Mqtt),
            4 => Some(ProtocolKind::Raw),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "h1" => Some(ProtocolKind::H1),
            "h2" => Some(ProtocolKind::H2),
            "ws" => Some(ProtocolKind::Ws),
            "mqtt" => Some(ProtocolKind::Mqtt),
            "raw" => Some(ProtocolKind::Raw),
            _ => None,
        }
    }

    pub fn is_web(self) -> bool {
        matches!(self, ProtocolKind::H1 | ProtocolKind::H2 | ProtocolKind::Ws)
    }
}

/// Stream type bit flags, as carried in `StreamPolicy::flags`.
pub mod flags {
    pub const OPPORTUNISTIC: u32 = 1 << 0;
    pub const NAILED_UP: u32 = 1 << 1;
    pub const URGENT_TX: u32 = 1 << 2;
    pub const URGENT_RX: u32 = 1 << 3;
    pub const TLS: u32 = 1 << 4;
    pub const LONG_POLL: u32 = 1 << 5;
    pub const AUTH_BEARER: u32 = 1 << 6;
    pub const HTTP_NO_CONTENT_LENGTH: u32 = 1 << 7;
    pub const QUIRK_NGHTTP2_END_STREAM: u32 = 1 << 8;
    pub const H2_QUIRK_OVERFLOWS_TXCR: u32 = 1 << 9;
    pub const H2_QUIRK_UNCLEAN_HPACK_STATE: u32 = 1 << 10;
    pub const HTTP_MULTIPART: u32 = 1 << 11;
    pub const HTTP_X_WWW_FORM_URLENCODED: u32 = 1 << 12;
    pub const LOCAL_SINK: u32 = 1 << 13;
    pub const WAKE_SUSPEND_VALIDITY: u32 = 1 << 14;
    pub const SERVER: u32 = 1 << 15;
    pub const ALLOW_REDIRECTS: u32 = 1 << 16;
    pub const HTTP_MULTIPART_IN: u32 = 1 << 17;

    /// JSON key for each boolean flag.
    pub const BY_KEY: &[(&str, u32)] = &[
        ("opportunistic", OPPORTUNISTIC),
        ("nailed_up", NAILED_UP),
        ("urgent_tx", URGENT_TX),
        ("urgent_rx", URGENT_RX),
        ("tls", TLS),
        ("long_poll", LONG_POLL),
        ("auth_bearer", AUTH_BEARER),
        ("http_no_content_length", HTTP_NO_CONTENT_LENGTH),
        ("nghttp2_quirk_end_stream", QUIRK_NGHTTP2_END_STREAM),
        ("h2q_oflow_txcr", H2_QUIRK_OVERFLOWS_TXCR),
        ("h2q_unclean_hpack", H2_QUIRK_UNCLEAN_HPACK_STATE),
        ("http_multipart", HTTP_MULTIPART),
        ("http_www_form_urlencoded", HTTP_X_WWW_FORM_URLENCODED),
        ("local_sink", LOCAL_SINK),
        ("swake_validity", WAKE_SUSPEND_VALIDITY),
        ("server", SERVER),
        ("allow_redirects", ALLOW_REDIRECTS),
        ("http_multipart_ss_in", HTTP_MULTIPART_IN),
    ];

    pub fn by_key(key: &str) -> Option<u32> {
        BY_KEY.iter().find(|(k, _)| *k == key).map(|(_, bit)| *bit)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryBackoff {
    pub name: String,
    pub retry_ms_table: Vec<u32>,
    pub conceal_count: u16,
    pub secs_since_valid_ping: u16,
    pub secs_since_valid_hangup: u16,
    pub jitter_percent: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct X509Cert {
    pub vhost_name: String,
    pub ca_der: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustStore {
    pub name: String,
    /// Certificates in store order.
    pub ssx509: Vec<CertId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthRecord {
    pub name: String,
    pub auth_type: String,
    pub streamtype: String,
    pub blob_index: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub name: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WsPolicy {
    pub subprotocol: Option<String>,
    pub binary: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpPolicy {
    pub method: Option<String>,
    pub url: Option<String>,
    pub multipart_name: Option<String>,
    pub multipart_filename: Option<String>,
    pub multipart_content_type: Option<String>,
    pub auth_preamble: Option<String>,
    pub blob_header: [Option<String>; BLOB_HEADER_SLOTS],
    pub ws: WsPolicy,
    pub resp_expect: u16,
    pub fail_redirect: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MqttPolicy {
    pub topic: Option<String>,
    pub subscribe: Option<String>,
    pub will_topic: Option<String>,
    pub will_message: Option<String>,
    pub keep_alive: u16,
    pub qos: u8,
    pub clean_start: bool,
    pub will_qos: u8,
    pub will_retain: bool,
}

/// Protocol-specific part of a stream type, selected by `StreamPolicy::protocol`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolPolicy {
    Http(HttpPolicy),
    Mqtt(MqttPolicy),
    Opaque,
}

impl ProtocolPolicy {
    pub fn http(&self) -> Option<&HttpPolicy> {
        match self {
            ProtocolPolicy::Http(h) => Some(h),
            _ => None,
        }
    }

    pub fn mqtt(&self) -> Option<&MqttPolicy> {
        match self {
            ProtocolPolicy::Mqtt(m) => Some(m),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPolicy {
    pub streamtype: String,
    pub endpoint: Option<String>,
    pub rideshare_streamtype: Option<String>,
    pub payload_fmt: Option<String>,
    pub socks5_proxy: Option<String>,
    pub auth: Option<AuthId>,
    /// Metadata list in list order.
    pub metadata: Vec<Metadata>,
    pub retry_bo: Option<RetryId>,
    pub trust_store: Option<TrustStoreId>,
    /// Raw protocol tag; see [`ProtocolKind::from_tag`].
    pub protocol: u8,
    pub u: ProtocolPolicy,
    pub timeout_ms: u32,
    pub flags: u32,
    pub port: u16,
    pub metadata_count: u8,
    pub client_cert: u8,
}

impl StreamPolicy {
    pub fn new(streamtype: impl Into<String>, protocol: ProtocolKind) -> Self {
        let u = if protocol.is_web() {
            ProtocolPolicy::Http(HttpPolicy::default())
        } else if protocol == ProtocolKind::Mqtt {
            ProtocolPolicy::Mqtt(MqttPolicy::default())
        } else {
            ProtocolPolicy::Opaque
        };
        StreamPolicy {
            streamtype: streamtype.into(),
            endpoint: None,
            rideshare_streamtype: None,
            payload_fmt: None,
            socks5_proxy: None,
            auth: None,
            metadata: Vec::new(),
            retry_bo: None,
            trust_store: None,
            protocol: protocol.tag(),
            u,
            timeout_ms: 0,
            flags: 0,
            port: 0,
            metadata_count: 0,
            client_cert: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyGraph {
    pub policies: Vec<StreamPolicy>,
    pub auths: Vec<AuthRecord>,
    pub retries: Vec<RetryBackoff>,
    pub trust_stores: Vec<TrustStore>,
    pub certs: Vec<X509Cert>,
}

impl PolicyGraph {
    pub fn retry(&self, id: RetryId) -> Option<&RetryBackoff> {
        self.retries.get(id.0)
    }

    pub fn trust_store(&self, id: TrustStoreId) -> Option<&TrustStore> {
        self.trust_stores.get(id.0)
    }

    pub fn cert(&self, id: CertId) -> Option<&X509Cert> {
        self.certs.get(id.0)
    }

    pub fn auth(&self, id: AuthId) -> Option<&AuthRecord> {
        self.auths.get(id.0)
    }

    pub fn add_retry(&mut self, retry: RetryBackoff) -> RetryId {
        self.retries.push(retry);
        RetryId(self.retries.len() - 1)
    }

    pub fn add_cert(&mut self, cert: X509Cert) -> CertId {
        self.certs.push(cert);
        CertId(self.certs.len() - 1)
    }

    pub fn add_trust_store(&mut self, store: TrustStore) -> TrustStoreId {
        self.trust_stores.push(store);
        TrustStoreId(self.trust_stores.len() - 1)
    }

    pub fn add_auth(&mut self, auth: AuthRecord) -> AuthId {
        self.auths.push(auth);
        AuthId(self.auths.len() - 1)
    }
}
