//! Policy JSON ingestion.
//!
//! `PolicyParser` is fed the input in chunks and produces the linked [`PolicyGraph`]
//! once the input is exhausted. Name references between sections (`retry`,
//! `tls_trust_store`, `use_auth`, trust store `stack`) are resolved here, so the graph
//! only ever holds ids.

use std::collections::{BTreeMap, BTreeSet};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::compile::{CompileErrorKind, CompileOptions, CompilerError};
use crate::policy::{
    flags, AuthId, AuthRecord, CertId, HttpPolicy, Metadata, MqttPolicy, PolicyGraph,
    ProtocolKind, ProtocolPolicy, RetryBackoff, RetryId, StreamPolicy, TrustStore,
    TrustStoreId, WsPolicy, X509Cert, MAX_TRUST_STORE_CERTS,
};

#[derive(Debug, Deserialize)]
struct PolicyDoc {
    #[serde(default)]
    release: Option<Value>,
    #[serde(default)]
    product: Option<Value>,
    #[serde(default, rename = "schema-version")]
    schema_version: Option<Value>,
    #[serde(default, rename = "via-socks5")]
    via_socks5: Option<String>,
    #[serde(default)]
    retry: Vec<Map<String, Value>>,
    #[serde(default)]
    certs: Vec<Map<String, Value>>,
    #[serde(default)]
    trust_stores: Vec<TrustStoreDoc>,
    #[serde(default)]
    auth: Vec<AuthDoc>,
    #[serde(default)]
    s: Vec<Map<String, Value>>,
    #[serde(flatten)]
    unknown: BTreeMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RetryDoc {
    backoff: Vec<u32>,
    conceal: u16,
    jitterpc: u8,
    svalidping: u16,
    svalidhup: u16,
    #[serde(flatten)]
    unknown: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct TrustStoreDoc {
    name: String,
    #[serde(default)]
    stack: Vec<String>,
    #[serde(flatten)]
    unknown: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct AuthDoc {
    name: String,
    #[serde(default, rename = "type")]
    auth_type: String,
    #[serde(default)]
    streamtype: String,
    #[serde(default)]
    blob: u8,
    #[serde(flatten)]
    unknown: BTreeMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StreamDoc {
    endpoint: Option<String>,
    port: u16,
    protocol: Option<String>,
    rideshare: Option<String>,
    payload_fmt: Option<String>,
    timeout_ms: u32,
    client_cert: u8,
    retry: Option<String>,
    tls_trust_store: Option<String>,
    use_auth: Option<String>,
    metadata: Vec<Map<String, Value>>,

    http_method: Option<String>,
    http_url: Option<String>,
    http_multipart_name: Option<String>,
    http_multipart_filename: Option<String>,
    http_multipart_content_type: Option<String>,
    http_auth_preamble: Option<String>,
    http_auth_header: Option<String>,
    http_dsn_header: Option<String>,
    http_fwv_header: Option<String>,
    http_devtype_header: Option<String>,
    http_expect: u16,
    http_fail_redirect: bool,
    ws_subprotocol: Option<String>,
    ws_binary: bool,

    mqtt_topic: Option<String>,
    mqtt_subscribe: Option<String>,
    mqtt_will_topic: Option<String>,
    mqtt_will_message: Option<String>,
    mqtt_keep_alive: u16,
    mqtt_qos: u8,
    mqtt_clean_start: bool,
    mqtt_will_qos: u8,
    mqtt_will_retain: bool,

    /// Flag keys and anything unrecognised.
    #[serde(flatten)]
    rest: BTreeMap<String, Value>,
}

impl StreamDoc {
    fn has_http_keys(&self) -> bool {
        [
            &self.http_method,
            &self.http_url,
            &self.http_multipart_name,
            &self.http_multipart_filename,
            &self.http_multipart_content_type,
            &self.http_auth_preamble,
            &self.http_auth_header,
            &self.http_dsn_header,
            &self.http_fwv_header,
            &self.http_devtype_header,
            &self.ws_subprotocol,
        ]
        .iter()
        .any(|v| v.is_some())
            || self.http_expect != 0
            || self.http_fail_redirect
            || self.ws_binary
    }

    fn has_mqtt_keys(&self) -> bool {
        [
            &self.mqtt_topic,
            &self.mqtt_subscribe,
            &self.mqtt_will_topic,
            &self.mqtt_will_message,
        ]
        .iter()
        .any(|v| v.is_some())
            || self.mqtt_keep_alive != 0
            || self.mqtt_qos != 0
            || self.mqtt_clean_start
            || self.mqtt_will_qos != 0
            || self.mqtt_will_retain
    }
}

fn ingest_error(message: String) -> CompilerError {
    CompilerError::new(CompileErrorKind::Ingest, message)
}

/// Decodes one `{name: value}` entry of a named section. Section objects are
/// ordered maps, so entries come out in declaration order.
fn entry_doc<T: DeserializeOwned>(
    what: &str,
    name: &str,
    value: Value,
) -> Result<T, CompilerError> {
    serde_json::from_value(value).map_err(|e| ingest_error(format!("{what} {name:?}: {e}")))
}

fn warn_unknown(context: &str, unknown: &BTreeMap<String, Value>) {
    for key in unknown.keys() {
        warn!(context, key = key.as_str(), "ignoring unknown policy key");
    }
}

#[derive(Debug)]
pub struct ParsedPolicy {
    /// The input exactly as it was fed.
    pub source: Vec<u8>,
    pub graph: PolicyGraph,
}

#[derive(Debug)]
pub struct PolicyParser {
    buf: Vec<u8>,
    max_bytes: usize,
    saw_start: bool,
}

impl PolicyParser {
    pub fn begin(options: &CompileOptions) -> Result<Self, CompilerError> {
        options.validate()?;
        Ok(PolicyParser {
            buf: Vec::new(),
            max_bytes: options.max_policy_bytes,
            saw_start: false,
        })
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), CompilerError> {
        let total = self.buf.len().saturating_add(chunk.len());
        if total > self.max_bytes {
            return Err(CompilerError::new(
                CompileErrorKind::Budget,
                format!(
                    "policy too large: max_policy_bytes={} got at least {total}",
                    self.max_bytes
                ),
            ));
        }
        if !self.saw_start {
            if let Some(&b) = chunk.iter().find(|b| !b.is_ascii_whitespace()) {
                if b != b'{' {
                    return Err(ingest_error(
                        "policy must be a JSON object starting with '{'".to_string(),
                    ));
                }
                self.saw_start = true;
            }
        }
        self.buf.try_reserve(chunk.len()).map_err(|e| {
            CompilerError::new(CompileErrorKind::Alloc, format!("policy buffer: {e}"))
        })?;
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    pub fn source(&self) -> &[u8] {
        &self.buf
    }

    pub fn finish(self) -> Result<ParsedPolicy, CompilerError> {
        let doc: PolicyDoc = serde_json::from_slice(&self.buf)
            .map_err(|e| ingest_error(format!("policy parse failed: {e}")))?;
        let graph = GraphBuilder::default().build(doc)?;
        Ok(ParsedPolicy {
            source: self.buf,
            graph,
        })
    }
}

#[derive(Default)]
struct GraphBuilder {
    graph: PolicyGraph,
    retry_ids: BTreeMap<String, RetryId>,
    cert_ids: BTreeMap<String, CertId>,
    trust_ids: BTreeMap<String, TrustStoreId>,
    auth_ids: BTreeMap<String, AuthId>,
}

impl GraphBuilder {
    fn build(mut self, doc: PolicyDoc) -> Result<PolicyGraph, CompilerError> {
        for (key, v) in [
            ("release", &doc.release),
            ("product", &doc.product),
            ("schema-version", &doc.schema_version),
        ] {
            if let Some(v) = v {
                debug!(key, value = %v, "policy header");
            }
        }
        warn_unknown("policy", &doc.unknown);

        for entry in doc.retry {
            for (name, retry) in entry {
                let retry = entry_doc("retry policy", &name, retry)?;
                self.add_retry(name, retry)?;
            }
        }
        for entry in doc.certs {
            for (name, der_b64) in entry {
                let der_b64: String = entry_doc("certificate", &name, der_b64)?;
                self.add_cert(name, &der_b64)?;
            }
        }
        for store in doc.trust_stores {
            self.add_trust_store(store)?;
        }

        // Auth records and stream types are linked head-first.
        let mut auth_names = BTreeSet::new();
        for a in &doc.auth {
            if !auth_names.insert(a.name.as_str()) {
                return Err(ingest_error(format!("duplicate auth record {:?}", a.name)));
            }
        }
        for a in doc.auth.into_iter().rev() {
            warn_unknown("auth", &a.unknown);
            let id = self.graph.add_auth(AuthRecord {
                name: a.name.clone(),
                auth_type: a.auth_type,
                streamtype: a.streamtype,
                blob_index: a.blob,
            });
            self.auth_ids.insert(a.name, id);
        }

        let mut seen = BTreeSet::new();
        let mut policies = Vec::new();
        for entry in doc.s {
            for (name, st) in entry {
                let st = entry_doc("stream type", &name, st)?;
                if !seen.insert(name.clone()) {
                    return Err(ingest_error(format!("duplicate stream type {name:?}")));
                }
                policies.push(self.stream_policy(name, st, doc.via_socks5.as_deref())?);
            }
        }
        policies.reverse();
        self.graph.policies = policies;

        debug!(
            stream_types = self.graph.policies.len(),
            retry_tables = self.graph.retries.len(),
            trust_stores = self.graph.trust_stores.len(),
            certificates = self.graph.certs.len(),
            auth_records = self.graph.auths.len(),
            "linked policy graph"
        );
        Ok(self.graph)
    }

    fn add_retry(&mut self, name: String, doc: RetryDoc) -> Result<(), CompilerError> {
        if self.retry_ids.contains_key(&name) {
            return Err(ingest_error(format!("duplicate retry policy {name:?}")));
        }
        warn_unknown("retry", &doc.unknown);
        if doc.backoff.is_empty() {
            return Err(ingest_error(format!(
                "retry policy {name:?} has an empty backoff table"
            )));
        }
        if doc.backoff.len() > usize::from(u16::MAX) {
            return Err(ingest_error(format!(
                "retry policy {name:?} has {} backoff entries, at most {} are supported",
                doc.backoff.len(),
                u16::MAX
            )));
        }
        let id = self.graph.add_retry(RetryBackoff {
            name: name.clone(),
            retry_ms_table: doc.backoff,
            conceal_count: doc.conceal,
            secs_since_valid_ping: doc.svalidping,
            secs_since_valid_hangup: doc.svalidhup,
            jitter_percent: doc.jitterpc,
        });
        self.retry_ids.insert(name, id);
        Ok(())
    }

    fn add_cert(&mut self, name: String, der_b64: &str) -> Result<(), CompilerError> {
        if self.cert_ids.contains_key(&name) {
            return Err(ingest_error(format!("duplicate certificate {name:?}")));
        }
        let compact: String = der_b64
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let ca_der = STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| ingest_error(format!("certificate {name:?}: bad base64 DER: {e}")))?;
        if ca_der.is_empty() {
            return Err(ingest_error(format!("certificate {name:?} is empty")));
        }
        let id = self.graph.add_cert(X509Cert {
            vhost_name: name.clone(),
            ca_der,
        });
        self.cert_ids.insert(name, id);
        Ok(())
    }

    fn add_trust_store(&mut self, doc: TrustStoreDoc) -> Result<(), CompilerError> {
        if self.trust_ids.contains_key(&doc.name) {
            return Err(ingest_error(format!("duplicate trust store {:?}", doc.name)));
        }
        warn_unknown("trust store", &doc.unknown);
        if doc.stack.len() > MAX_TRUST_STORE_CERTS {
            return Err(ingest_error(format!(
                "trust store {:?} has {} certificates, at most {MAX_TRUST_STORE_CERTS} are supported",
                doc.name,
                doc.stack.len()
            )));
        }
        let mut ssx509 = Vec::with_capacity(doc.stack.len());
        for cert in &doc.stack {
            let id = self.cert_ids.get(cert).copied().ok_or_else(|| {
                ingest_error(format!(
                    "trust store {:?} references unknown certificate {cert:?}",
                    doc.name
                ))
            })?;
            ssx509.push(id);
        }
        let id = self.graph.add_trust_store(TrustStore {
            name: doc.name.clone(),
            ssx509,
        });
        self.trust_ids.insert(doc.name, id);
        Ok(())
    }

    fn stream_policy(
        &self,
        name: String,
        st: StreamDoc,
        socks5: Option<&str>,
    ) -> Result<StreamPolicy, CompilerError> {
        let kind = match st.protocol.as_deref() {
            None => ProtocolKind::H1,
            Some(p) => ProtocolKind::from_name(p).ok_or_else(|| {
                ingest_error(format!("stream type {name:?}: unknown protocol {p:?}"))
            })?,
        };
        if !kind.is_web() && st.has_http_keys() {
            return Err(ingest_error(format!(
                "stream type {name:?}: http_*/ws_* keys need protocol h1, h2 or ws"
            )));
        }
        if kind != ProtocolKind::Mqtt && st.has_mqtt_keys() {
            return Err(ingest_error(format!(
                "stream type {name:?}: mqtt_* keys need protocol mqtt"
            )));
        }
        if kind != ProtocolKind::Ws && (st.ws_subprotocol.is_some() || st.ws_binary) {
            warn!(streamtype = name.as_str(), "ws_* keys ignored on a non-ws stream type");
        }

        let mut p = StreamPolicy::new(name.clone(), kind);
        p.endpoint = st.endpoint;
        p.rideshare_streamtype = st.rideshare;
        p.payload_fmt = st.payload_fmt;
        p.socks5_proxy = socks5.map(str::to_string);
        p.timeout_ms = st.timeout_ms;
        p.port = st.port;
        p.client_cert = st.client_cert;

        if let Some(retry) = &st.retry {
            p.retry_bo = Some(self.retry_ids.get(retry).copied().ok_or_else(|| {
                ingest_error(format!("stream type {name:?}: unknown retry policy {retry:?}"))
            })?);
        }
        if let Some(store) = &st.tls_trust_store {
            p.trust_store = Some(self.trust_ids.get(store).copied().ok_or_else(|| {
                ingest_error(format!("stream type {name:?}: unknown trust store {store:?}"))
            })?);
        }
        if let Some(auth) = &st.use_auth {
            p.auth = Some(self.auth_ids.get(auth).copied().ok_or_else(|| {
                ingest_error(format!("stream type {name:?}: unknown auth record {auth:?}"))
            })?);
        }

        let mut md_names = BTreeSet::new();
        let mut metadata = Vec::new();
        for entry in st.metadata {
            for (md_name, value) in entry {
                let value: Option<String> = entry_doc("metadata", &md_name, value)?;
                if !md_names.insert(md_name.clone()) {
                    return Err(ingest_error(format!(
                        "stream type {name:?}: duplicate metadata {md_name:?}"
                    )));
                }
                metadata.push(Metadata {
                    name: md_name,
                    value,
                });
            }
        }
        p.metadata_count = u8::try_from(metadata.len()).map_err(|_| {
            ingest_error(format!(
                "stream type {name:?}: {} metadata entries, at most {} are supported",
                metadata.len(),
                u8::MAX
            ))
        })?;
        metadata.reverse();
        p.metadata = metadata;

        for (key, value) in &st.rest {
            match flags::by_key(key) {
                Some(bit) => match value.as_bool() {
                    Some(true) => p.flags |= bit,
                    Some(false) => {}
                    None => {
                        return Err(ingest_error(format!(
                            "stream type {name:?}: flag {key:?} must be a boolean"
                        )))
                    }
                },
                None => warn!(
                    streamtype = name.as_str(),
                    key = key.as_str(),
                    "ignoring unknown stream type key"
                ),
            }
        }

        p.u = match kind {
            ProtocolKind::H1 | ProtocolKind::H2 | ProtocolKind::Ws => {
                ProtocolPolicy::Http(HttpPolicy {
                    method: st.http_method,
                    url: st.http_url,
                    multipart_name: st.http_multipart_name,
                    multipart_filename: st.http_multipart_filename,
                    multipart_content_type: st.http_multipart_content_type,
                    auth_preamble: st.http_auth_preamble,
                    blob_header: [
                        st.http_auth_header,
                        st.http_dsn_header,
                        st.http_fwv_header,
                        st.http_devtype_header,
                    ],
                    ws: WsPolicy {
                        subprotocol: st.ws_subprotocol,
                        binary: st.ws_binary,
                    },
                    resp_expect: st.http_expect,
                    fail_redirect: st.http_fail_redirect,
                })
            }
            ProtocolKind::Mqtt => ProtocolPolicy::Mqtt(MqttPolicy {
                topic: st.mqtt_topic,
                subscribe: st.mqtt_subscribe,
                will_topic: st.mqtt_will_topic,
                will_message: st.mqtt_will_message,
                keep_alive: st.mqtt_keep_alive,
                qos: st.mqtt_qos,
                clean_start: st.mqtt_clean_start,
                will_qos: st.mqtt_will_qos,
                will_retain: st.mqtt_will_retain,
            }),
            ProtocolKind::Raw => ProtocolPolicy::Opaque,
        };
        Ok(p)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse(v: serde_json::Value) -> Result<PolicyGraph, CompilerError> {
        let mut parser = PolicyParser::begin(&CompileOptions::default())?;
        parser.feed(&serde_json::to_vec(&v).expect("encode"))?;
        parser.finish().map(|p| p.graph)
    }

    #[test]
    fn shared_retry_resolves_to_one_id() {
        let g = parse(json!({
            "retry": [{"default": {"backoff": [100, 200], "conceal": 3, "jitterpc": 20}}],
            "s": [
                {"a": {"endpoint": "a.example", "retry": "default"}},
                {"b": {"endpoint": "b.example", "retry": "default"}}
            ]
        }))
        .expect("parse");
        assert_eq!(g.retries.len(), 1);
        assert_eq!(g.policies[0].retry_bo, Some(RetryId(0)));
        assert_eq!(g.policies[1].retry_bo, Some(RetryId(0)));
        let r = g.retry(RetryId(0)).expect("retry");
        assert_eq!(r.retry_ms_table, vec![100, 200]);
        assert_eq!(r.conceal_count, 3);
        assert_eq!(r.jitter_percent, 20);
    }

    #[test]
    fn lists_are_linked_head_first() {
        let g = parse(json!({
            "s": [
                {"first": {"metadata": [{"m0": "x-m0:"}, {"m1": "x-m1:"}, {"m2": null}]}},
                {"second": {}}
            ]
        }))
        .expect("parse");
        let names: Vec<&str> = g.policies.iter().map(|p| p.streamtype.as_str()).collect();
        assert_eq!(names, vec!["second", "first"]);
        let md: Vec<&str> = g.policies[1].metadata.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(md, vec!["m2", "m1", "m0"]);
        assert_eq!(g.policies[1].metadata_count, 3);
        assert_eq!(g.policies[1].metadata[0].value, None);
    }

    fn parse_text(text: &str) -> Result<PolicyGraph, CompilerError> {
        let mut parser = PolicyParser::begin(&CompileOptions::default())?;
        parser.feed(text.as_bytes())?;
        parser.finish().map(|p| p.graph)
    }

    #[test]
    fn keys_sharing_an_object_keep_declaration_order() {
        let g = parse_text(
            r#"{
                "retry": [{"slow": {"backoff": [900]}, "fast": {"backoff": [10]}}],
                "certs": [{"zroot": "AQID", "aroot": "BAUG"}],
                "s": [
                    {"st": {"metadata": [{"zeta": "z:", "alpha": "a:"}, {"mid": null}]}},
                    {"zz": {}, "aa": {}}
                ]
            }"#,
        )
        .expect("parse");
        let names: Vec<&str> = g.policies.iter().map(|p| p.streamtype.as_str()).collect();
        assert_eq!(names, vec!["aa", "zz", "st"]);
        let md: Vec<&str> = g.policies[2].metadata.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(md, vec!["mid", "alpha", "zeta"]);
        assert_eq!(g.retry(RetryId(0)).expect("retry").name, "slow");
        assert_eq!(g.cert(CertId(0)).expect("cert").vhost_name, "zroot");
    }

    #[test]
    fn mistyped_section_entry_names_the_entry() {
        let err = parse_text(r#"{"s": [{"a": {"port": "https"}}]}"#).expect_err("must fail");
        assert_eq!(err.kind, CompileErrorKind::Ingest);
        assert!(err.message.starts_with("stream type \"a\""), "{}", err.message);
    }

    #[test]
    fn trust_store_keeps_stack_order() {
        let g = parse(json!({
            "certs": [{"c0": "AQID"}, {"c1": "BAUG"}, {"c2": "BwgJ"}],
            "trust_stores": [{"name": "ts", "stack": ["c0", "c1", "c2"]}],
            "s": [{"a": {"tls": true, "tls_trust_store": "ts"}}]
        }))
        .expect("parse");
        let store = g.trust_store(TrustStoreId(0)).expect("store");
        assert_eq!(store.ssx509, vec![CertId(0), CertId(1), CertId(2)]);
        assert_eq!(g.cert(CertId(0)).unwrap().ca_der, vec![1, 2, 3]);
        assert_eq!(g.policies[0].flags, flags::TLS);
    }

    #[test]
    fn protocol_fields_land_in_union() {
        let g = parse(json!({
            "s": [
                {"w": {"protocol": "ws", "ws_subprotocol": "lws-chat", "ws_binary": true,
                       "http_url": "/chat", "http_auth_header": "authorization:"}},
                {"m": {"protocol": "mqtt", "mqtt_topic": "t", "mqtt_qos": 1}}
            ]
        }))
        .expect("parse");
        let m = g.policies[0].u.mqtt().expect("mqtt arm");
        assert_eq!(m.topic.as_deref(), Some("t"));
        assert_eq!(m.qos, 1);
        let h = g.policies[1].u.http().expect("http arm");
        assert_eq!(h.ws.subprotocol.as_deref(), Some("lws-chat"));
        assert!(h.ws.binary);
        assert_eq!(h.blob_header[0].as_deref(), Some("authorization:"));
        assert_eq!(g.policies[1].protocol, ProtocolKind::Ws.tag());
    }

    #[test]
    fn socks5_applies_to_every_stream_type() {
        let g = parse(json!({
            "via-socks5": "127.0.0.1:1337",
            "s": [{"a": {}}, {"b": {}}]
        }))
        .expect("parse");
        assert!(g
            .policies
            .iter()
            .all(|p| p.socks5_proxy.as_deref() == Some("127.0.0.1:1337")));
    }

    #[test]
    fn unknown_references_fail() {
        for doc in [
            json!({"s": [{"a": {"retry": "nope"}}]}),
            json!({"s": [{"a": {"tls_trust_store": "nope"}}]}),
            json!({"s": [{"a": {"use_auth": "nope"}}]}),
            json!({"trust_stores": [{"name": "ts", "stack": ["nope"]}]}),
        ] {
            let err = parse(doc).expect_err("must fail");
            assert_eq!(err.kind, CompileErrorKind::Ingest);
        }
    }

    #[test]
    fn rejects_bad_documents() {
        for doc in [
            json!({"s": [{"a": {"protocol": "quic"}}]}),
            json!({"s": [{"a": {"protocol": "mqtt", "http_url": "/x"}}]}),
            json!({"s": [{"a": {"protocol": "h2", "mqtt_topic": "t"}}]}),
            json!({"s": [{"a": {"tls": "yes"}}]}),
            json!({"s": [{"a": {}}, {"a": {}}]}),
            json!({"certs": [{"c": "!!!"}]}),
            json!({"retry": [{"r": {"backoff": [1]}}, {"r": {"backoff": [2]}}]}),
            json!({"retry": [{"r": {"backoff": []}}]}),
        ] {
            let err = parse(doc).expect_err("must fail");
            assert_eq!(err.kind, CompileErrorKind::Ingest);
        }
    }

    #[test]
    fn feed_rejects_non_object_early() {
        let mut parser = PolicyParser::begin(&CompileOptions::default()).unwrap();
        parser.feed(b"  \n").expect("whitespace only");
        let err = parser.feed(b"[1, 2]").expect_err("array");
        assert_eq!(err.kind, CompileErrorKind::Ingest);
    }

    #[test]
    fn feed_enforces_budget() {
        let options = CompileOptions {
            max_policy_bytes: 8,
            ..CompileOptions::default()
        };
        let mut parser = PolicyParser::begin(&options).unwrap();
        parser.feed(b"{\"s\":").expect("fits");
        let err = parser.feed(b" []}").expect_err("over budget");
        assert_eq!(err.kind, CompileErrorKind::Budget);
    }

    #[test]
    fn raw_protocol_parses_as_opaque() {
        let g = parse(json!({"s": [{"r": {"protocol": "raw"}}]})).expect("parse");
        assert_eq!(g.policies[0].protocol, ProtocolKind::Raw.tag());
        assert_eq!(g.policies[0].u, ProtocolPolicy::Opaque);
    }
}
