use super::*;
use crate::policy::{
    AuthId, AuthRecord, Metadata, ProtocolPolicy, RetryBackoff, TrustStore, X509Cert,
};

fn layout() -> CLayout {
    CLayout::new(8)
}

fn emit(graph: &PolicyGraph) -> Result<String, CompilerError> {
    let mut e = Emitter::new(graph, layout());
    e.emit_graph()?;
    Ok(e.into_output())
}

fn retry(name: &str, table: &[u32]) -> RetryBackoff {
    RetryBackoff {
        name: name.to_string(),
        retry_ms_table: table.to_vec(),
        conceal_count: 5,
        secs_since_valid_ping: 30,
        secs_since_valid_hangup: 35,
        jitter_percent: 20,
    }
}

fn cert(name: &str, der: &[u8]) -> X509Cert {
    X509Cert {
        vhost_name: name.to_string(),
        ca_der: der.to_vec(),
    }
}

fn web(name: &str) -> StreamPolicy {
    StreamPolicy::new(name, ProtocolKind::H1)
}

#[test]
fn trust_store_references_are_reversed() {
    let mut g = PolicyGraph::default();
    let c0 = g.add_cert(cert("c0", &[1]));
    let c1 = g.add_cert(cert("c1", &[2]));
    let c2 = g.add_cert(cert("c2", &[3]));
    let ts = g.add_trust_store(TrustStore {
        name: "store".to_string(),
        ssx509: vec![c0, c1, c2],
    });
    let mut p = web("s");
    p.trust_store = Some(ts);
    g.policies.push(p);

    let out = emit(&g).expect("emit");
    // Certificates themselves go out in store order.
    let d0 = out.find("_ss_der_c0[]").unwrap();
    let d2 = out.find("_ss_der_c2[]").unwrap();
    assert!(d0 < d2);
    assert!(out.contains(
        "\t.ssx509 = {\n\t\t&_ss_x509_c2,\n\t\t&_ss_x509_c1,\n\t\t&_ss_x509_c0,\n\t}\n};\n"
    ));
    assert!(out.contains("\t.trust = {.store = &_ss_ts_store},\n"));
}

#[test]
fn certificate_shared_between_stores_is_emitted_once() {
    let mut g = PolicyGraph::default();
    let shared = g.add_cert(cert("root", &[0xAA, 0xBB]));
    let other = g.add_cert(cert("leaf", &[0xCC]));
    let a = g.add_trust_store(TrustStore {
        name: "a".to_string(),
        ssx509: vec![shared],
    });
    let b = g.add_trust_store(TrustStore {
        name: "b".to_string(),
        ssx509: vec![shared, other],
    });
    let mut p1 = web("one");
    p1.trust_store = Some(a);
    let mut p2 = web("two");
    p2.trust_store = Some(b);
    g.policies = vec![p1, p2];

    let mut e = Emitter::new(&g, layout());
    e.emit_graph().expect("emit");
    let out = e.output();
    assert_eq!(out.matches("static const uint8_t _ss_der_root[]").count(), 1);
    assert_eq!(out.matches("static const lws_ss_trust_store_t").count(), 2);
    assert_eq!(e.stats(0).certificates, 2);
    assert_eq!(e.stats(0).trust_stores, 2);
}

#[test]
fn shared_retry_is_emitted_once_and_referenced_twice() {
    let mut g = PolicyGraph::default();
    let r = g.add_retry(retry("default", &[1000, 2000, 3000]));
    let mut p1 = web("one");
    p1.retry_bo = Some(r);
    let mut p2 = web("two");
    p2.retry_bo = Some(r);
    g.policies = vec![p1, p2];

    let out = emit(&g).expect("emit");
    assert_eq!(out.matches("static const uint32_t _rbo_bo_").count(), 1);
    assert_eq!(out.matches("static const lws_retry_bo_t ").count(), 1);
    assert_eq!(out.matches("\t.retry_bo = &_rbo_0,\n").count(), 2);
    assert!(out.contains(
        "static const uint32_t _rbo_bo_0[] = {\n 1000,  2000,  3000, \n};\n\
         static const lws_retry_bo_t _rbo_0 = {\n\
         \t.retry_ms_table = _rbo_bo_0,\n\
         \t.retry_ms_table_count = 3,\n\
         \t.conceal_count = 5,\n\
         \t.secs_since_valid_ping = 30,\n\
         \t.secs_since_valid_hangup = 35,\n\
         \t.jitter_percent = 20,\n\
         };\n"
    ));
}

#[test]
fn identical_retry_tables_with_distinct_identity_are_not_merged() {
    let mut g = PolicyGraph::default();
    let r1 = g.add_retry(retry("a", &[10]));
    let r2 = g.add_retry(retry("b", &[10]));
    let mut p1 = web("one");
    p1.retry_bo = Some(r1);
    let mut p2 = web("two");
    p2.retry_bo = Some(r2);
    g.policies = vec![p1, p2];

    let out = emit(&g).expect("emit");
    assert!(out.contains("_rbo_bo_0[]"));
    assert!(out.contains("_rbo_bo_1[]"));
    assert!(out.contains("\t.retry_bo = &_rbo_1,\n"));
}

#[test]
fn metadata_chain_points_back_and_tail_is_referenced() {
    let mut g = PolicyGraph::default();
    let mut p = web("st");
    p.metadata = ["c", "b", "a"]
        .iter()
        .map(|n| Metadata {
            name: n.to_string(),
            value: Some(format!("x-{n}:")),
        })
        .collect();
    p.metadata_count = 3;
    g.policies.push(p);

    let out = emit(&g).expect("emit");
    assert!(out.contains(
        "\nstatic const lws_ss_metadata_t _md_st_c = {\n\
         \t.name = \"c\",\n\
         \t.value = (void *)\"x-c:\",\n\
         \t.length = 0,\n\
         },\n\
         _md_st_b = {\n\
         \t.next = (void *)&_md_st_c, \n"
    ));
    assert!(out.contains("_md_st_a = {\n\t.next = (void *)&_md_st_b, \n"));
    assert!(out.contains("\t.length = 2,\n};\n\n"));
    assert!(out.contains("\t.metadata = (void *)&_md_st_a,\n"));
    assert!(out.contains("\t.metadata_count = 3,\n"));
}

#[test]
fn policy_list_links_back_and_aliases_last() {
    let mut g = PolicyGraph::default();
    g.policies = vec![web("b"), web("a")];
    let out = emit(&g).expect("emit");
    assert!(out.contains("\nstatic const lws_ss_policy_t _ssp_b = {\n"));
    assert!(out.contains("},\n_ssp_a = {\n\t.next = (void *)&_ssp_b,\n"));
    assert!(out.contains("};\n#define _ss_static_policy_entry _ssp_a\n"));
    assert!(out.ends_with("/* estimated footprint 400 (when sizeof void * = 8) */\n"));
}

#[test]
fn protocol_is_always_emitted() {
    let mut g = PolicyGraph::default();
    g.policies.push(web("plain"));
    let out = emit(&g).expect("emit");
    assert!(out.contains("\t.protocol = 0,\n"));
    assert!(!out.contains(".port"));
    assert!(!out.contains(".flags"));
}

#[test]
fn scalars_and_strings() {
    let mut g = PolicyGraph::default();
    let mut p = web("full");
    p.endpoint = Some("api.example.com".to_string());
    p.rideshare_streamtype = Some("other".to_string());
    p.payload_fmt = Some("json".to_string());
    p.socks5_proxy = Some("127.0.0.1:1080".to_string());
    p.timeout_ms = 5000;
    p.flags = 0x10011;
    p.port = 443;
    p.client_cert = 2;
    g.policies.push(p);

    let out = emit(&g).expect("emit");
    for needle in [
        "\t.endpoint = \"api.example.com\",\n",
        "\t.rideshare_streamtype = \"other\",\n",
        "\t.payload_fmt = \"json\",\n",
        "\t.socks5_proxy = \"127.0.0.1:1080\",\n",
        "\t.timeout_ms = 5000,\n\t.flags = 0x10011,\n\t.port = 443,\n\t.protocol = 0,\n\t.client_cert = 2,\n",
    ] {
        assert!(out.contains(needle), "missing {needle:?} in\n{out}");
    }
}

#[test]
fn http_fields_and_ws_substruct() {
    let mut g = PolicyGraph::default();
    let mut p = StreamPolicy::new("chat", ProtocolKind::Ws);
    if let ProtocolPolicy::Http(h) = &mut p.u {
        h.method = Some("GET".to_string());
        h.url = Some("/ws".to_string());
        h.blob_header = [
            Some("authorization:".to_string()),
            None,
            Some("x-fw:".to_string()),
            None,
        ];
        h.ws.subprotocol = Some("lws-chat".to_string());
        h.ws.binary = true;
        h.resp_expect = 101;
    }
    g.policies.push(p);

    let out = emit(&g).expect("emit");
    assert!(out.contains(
        "\t.u = {\n\t\t.http = {\n\
         \t\t\t.method = \"GET\",\n\
         \t\t\t.url = \"/ws\",\n\
         \t\t\t.blob_header = {\n\
         \t\t\t\t\"authorization:\",\n\
         \t\t\t\t\"x-fw:\",\n\
         \t\t\t},\n\
         \t\t\t.u = {\n\t\t\t\t.ws = {\n\
         \t\t\t\t\t.subprotocol = \"lws-chat\",\n\
         \t\t\t\t\t.binary = 1\n\
         \t\t\t\t}\n\t\t\t},\n\
         \t\t\t.resp_expect = 101,\n\
         \t\t}\n\t},\n"
    ));
    assert!(out.contains("\t.protocol = 2,\n"));
}

#[test]
fn blob_headers_need_first_slot() {
    let mut g = PolicyGraph::default();
    let mut p = StreamPolicy::new("h2only", ProtocolKind::H2);
    if let ProtocolPolicy::Http(h) = &mut p.u {
        h.blob_header[1] = Some("x-dsn:".to_string());
    }
    g.policies.push(p);
    let out = emit(&g).expect("emit");
    assert!(!out.contains("blob_header"));
    assert!(!out.contains(".ws"));
}

#[test]
fn mqtt_fields() {
    let mut g = PolicyGraph::default();
    let mut p = StreamPolicy::new("telemetry", ProtocolKind::Mqtt);
    if let ProtocolPolicy::Mqtt(m) = &mut p.u {
        m.topic = Some("dev/1".to_string());
        m.will_message = Some("bye".to_string());
        m.keep_alive = 60;
        m.qos = 1;
        m.clean_start = true;
    }
    g.policies.push(p);

    let out = emit(&g).expect("emit");
    assert!(out.contains(
        "\t.u = {\n\t\t.mqtt = {\n\
         \t\t\t.topic = \"dev/1\",\n\
         \t\t\t.will_message = \"bye\",\n\
         \t\t\t.keep_alive = 60,\n\
         \t\t\t.qos = 1,\n\
         \t\t\t.clean_start = 1,\n\
         \t\t}\n\t},\n"
    ));
    assert!(out.contains("\t.protocol = 3,\n"));
}

#[test]
fn unknown_protocol_stops_before_the_offending_struct() {
    let mut g = PolicyGraph::default();
    let mut bad = web("bad");
    bad.protocol = 9;
    g.policies = vec![web("good"), bad, web("after")];

    let mut e = Emitter::new(&g, layout());
    let err = e.emit_graph().expect_err("must fail");
    assert_eq!(err.kind, CompileErrorKind::UnknownProtocol);
    let out = e.output();
    assert!(out.contains("_ssp_good = {"));
    assert!(!out.contains("_ssp_bad"));
    assert!(!out.contains("_ssp_after"));
    assert!(!out.contains(STATIC_POLICY_ENTRY));
    assert_eq!(e.stats(0).stream_types, 1);
}

#[test]
fn raw_protocol_has_no_static_form() {
    let mut g = PolicyGraph::default();
    g.policies.push(StreamPolicy::new("sock", ProtocolKind::Raw));
    let err = emit(&g).expect_err("must fail");
    assert_eq!(err.kind, CompileErrorKind::UnknownProtocol);
}

#[test]
fn dangling_auth_is_unresolved() {
    let mut g = PolicyGraph::default();
    let mut p = web("s");
    p.auth = Some(AuthId(3));
    g.policies.push(p);
    let err = emit(&g).expect_err("must fail");
    assert_eq!(err.kind, CompileErrorKind::Unresolved);
}

#[test]
fn dangling_retry_is_unresolved() {
    let mut g = PolicyGraph::default();
    let mut p = web("s");
    p.retry_bo = Some(RetryId(0));
    g.policies.push(p);
    let err = emit(&g).expect_err("must fail");
    assert_eq!(err.kind, CompileErrorKind::Unresolved);
}

#[test]
fn auth_list_is_back_linked() {
    let mut g = PolicyGraph::default();
    g.add_auth(AuthRecord {
        name: "second".to_string(),
        auth_type: "sigv4".to_string(),
        streamtype: "s2".to_string(),
        blob_index: 1,
    });
    let first = g.add_auth(AuthRecord {
        name: "first".to_string(),
        auth_type: "sigv4".to_string(),
        streamtype: "s1".to_string(),
        blob_index: 0,
    });
    let mut p = web("s1");
    p.auth = Some(first);
    g.policies.push(p);

    let out = emit(&g).expect("emit");
    assert!(out.contains(
        "\nstatic const lws_ss_auth_t _ssau_second = {\n\
         \t.name = \"second\",\n\
         \t.streamtype = \"s2\",\n\
         \t.blob = 1,\n\
         },\n\
         _ssau_first = {\n\
         \t.next = (void *)&_ssau_second,\n\
         \t.name = \"first\",\n\
         \t.streamtype = \"s1\",\n\
         \t.blob = 0,\n\
         };\n\n"
    ));
    assert!(out.contains("\t.auth = &_ssau_first,\n"));
}

#[test]
fn der_bytes_are_rows_of_eight() {
    let mut g = PolicyGraph::default();
    let c = g.add_cert(cert("host.example", &[1, 2, 3, 4, 5, 6, 7, 8, 9, 0xAB]));
    let ts = g.add_trust_store(TrustStore {
        name: "ts".to_string(),
        ssx509: vec![c],
    });
    let mut p = web("s");
    p.trust_store = Some(ts);
    g.policies.push(p);

    let out = emit(&g).expect("emit");
    assert!(out.contains(
        "static const uint8_t _ss_der_host_example[] = {\n\
         \t/* 0x  0 */ 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, \n\
         \t/* 0x  8 */ 0x09, 0xAB, \n\
         };\n\
         static const lws_ss_x509_t _ss_x509_host_example = {\n\
         \t.vhost_name = \"host.example\",\n\
         \t.ca_der = _ss_der_host_example,\n\
         \t.ca_der_len = 10,\n\
         };\n"
    ));
}

#[test]
fn footprint_is_sum_of_emitted_entities() {
    let mut g = PolicyGraph::default();
    let r = g.add_retry(retry("r", &[1, 2, 3]));
    let c = g.add_cert(cert("c", &[0; 20]));
    let ts = g.add_trust_store(TrustStore {
        name: "ts".to_string(),
        ssx509: vec![c],
    });
    let mut p = web("s");
    p.retry_bo = Some(r);
    p.trust_store = Some(ts);
    p.metadata = vec![Metadata {
        name: "m".to_string(),
        value: None,
    }];
    p.metadata_count = 1;
    g.policies = vec![p, web("t")];

    let l = layout();
    let mut e = Emitter::new(&g, l);
    e.emit_graph().expect("emit");
    let expected = l.metadata()
        + l.retry_table(3)
        + l.retry_bo()
        + l.x509()
        + 20
        + l.trust_store()
        + 2 * l.policy();
    assert_eq!(e.footprint().total(), expected);
    assert_eq!(e.footprint().entities(), 7);
    assert!(e
        .output()
        .contains(&format!("/* estimated footprint {expected} (when sizeof void * = 8) */")));
}

#[test]
fn overlong_names_are_fatal() {
    let mut g = PolicyGraph::default();
    g.policies.push(web(&"x".repeat(SYMBOL_CAPACITY)));
    let err = emit(&g).expect_err("must fail");
    assert_eq!(err.kind, CompileErrorKind::Symbol);
}

#[test]
fn empty_graph_has_no_policy_list() {
    let g = PolicyGraph::default();
    let out = emit(&g).expect("emit");
    assert!(!out.contains("lws_ss_policy_t"));
    assert!(!out.contains(STATIC_POLICY_ENTRY));
    assert_eq!(out, "/* estimated footprint 0 (when sizeof void * = 8) */\n");
}

#[test]
fn source_echo_block() {
    let g = PolicyGraph::default();
    let mut e = Emitter::new(&g, layout());
    e.emit_source_echo(b"{}");
    assert_eq!(
        e.output(),
        "/*\n * Autogenerated from the following JSON policy\n */\n\n#if 0\n{}\n\n \
         Original JSON size: 2\n \
         Original JSON sha256: 44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a\n\
         #endif\n\n"
    );
}
