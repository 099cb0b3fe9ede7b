use super::*;

impl<'a> Emitter<'a> {
    pub(super) fn emit_auths(&mut self) -> Result<(), CompilerError> {
        let graph = self.graph;
        if graph.auths.is_empty() {
            return Ok(());
        }

        self.push_str("\nstatic const lws_ss_auth_t ");
        let mut prev: Option<String> = None;
        let count = graph.auths.len();
        for (idx, auth) in graph.auths.iter().enumerate() {
            let curr = auth_symbol(&auth.name)?;
            self.push_str(&format!("{curr} = {{\n"));
            if let Some(prev) = &prev {
                self.push_str(&format!("\t.next = (void *)&{prev},\n"));
            }
            self.push_str(&format!("\t.name = \"{}\",\n", c_escape_string(&auth.name)));
            self.push_str(&format!(
                "\t.streamtype = \"{}\",\n",
                c_escape_string(&auth.streamtype)
            ));
            self.push_str(&format!("\t.blob = {},\n", auth.blob_index));
            self.push_str("}");
            self.push_str(if idx + 1 < count { "," } else { ";" });
            self.push_str("\n");

            self.auth_records += 1;
            prev = Some(curr);
        }
        self.push_str("\n");
        Ok(())
    }

    /// Second walk: one struct per stream type, then the entry alias.
    pub(super) fn emit_policies(&mut self) -> Result<(), CompilerError> {
        let graph = self.graph;
        if graph.policies.is_empty() {
            debug!("no stream types, skipping policy list");
            return Ok(());
        }

        self.push_str("\nstatic const lws_ss_policy_t ");
        let mut prev: Option<String> = None;
        let count = graph.policies.len();
        for (idx, policy) in graph.policies.iter().enumerate() {
            let curr = policy_symbol(&policy.streamtype)?;
            // A stream type that cannot be serialized leaves no partial struct behind.
            let mark = self.out.len();
            if let Err(err) = self.emit_policy(policy, &curr, prev.as_deref()) {
                self.out.truncate(mark);
                return Err(err);
            }
            if idx + 1 < count {
                self.push_str(",\n");
            }

            self.footprint.add(FootprintKind::Policy, self.layout.policy());
            self.policy_structs += 1;
            prev = Some(curr);
        }
        self.push_str(";\n");

        if let Some(entry) = prev {
            self.push_str(&format!("#define {STATIC_POLICY_ENTRY} {entry}\n"));
        }
        Ok(())
    }

    fn emit_policy(
        &mut self,
        policy: &'a StreamPolicy,
        curr: &str,
        prev: Option<&str>,
    ) -> Result<(), CompilerError> {
        let graph = self.graph;

        self.push_str(&format!("{curr} = {{\n"));
        if let Some(prev) = prev {
            self.push_str(&format!("\t.next = (void *)&{prev},\n"));
        }
        self.push_str(&format!(
            "\t.streamtype = \"{}\",\n",
            c_escape_string(&policy.streamtype)
        ));
        self.opt_str_field("\t", "endpoint", &policy.endpoint);
        self.opt_str_field("\t", "rideshare_streamtype", &policy.rideshare_streamtype);
        self.opt_str_field("\t", "payload_fmt", &policy.payload_fmt);
        self.opt_str_field("\t", "socks5_proxy", &policy.socks5_proxy);

        if let Some(auth_id) = policy.auth {
            let auth = graph.auth(auth_id).ok_or_else(|| {
                unresolved(format!(
                    "stream type {:?} uses auth record {auth_id:?}, which is not in the auth list",
                    policy.streamtype
                ))
            })?;
            self.push_str(&format!("\t.auth = &{},\n", auth_symbol(&auth.name)?));
        }

        // Only the tail is referenced; the chain is walked through `next`.
        if let Some(last) = policy.metadata.last() {
            self.push_str(&format!(
                "\t.metadata = (void *)&{},\n",
                metadata_symbol(&policy.streamtype, &last.name)?
            ));
        }

        self.emit_protocol(policy)?;

        if let Some(id) = policy.retry_bo {
            let handle = self.retry_map.resolve(id)?;
            self.push_str(&format!("\t.retry_bo = &{},\n", retry_symbol(handle.0)));
        }

        self.nonzero_field("\t", "timeout_ms", policy.timeout_ms);
        if policy.flags != 0 {
            self.push_str(&format!("\t.flags = 0x{:x},\n", policy.flags));
        }
        self.nonzero_field("\t", "port", u32::from(policy.port));
        self.nonzero_field("\t", "metadata_count", u32::from(policy.metadata_count));
        self.push_str(&format!("\t.protocol = {},\n", policy.protocol));
        self.nonzero_field("\t", "client_cert", u32::from(policy.client_cert));

        if let Some(id) = policy.trust_store {
            self.trust_map.resolve(id)?;
            let store = graph
                .trust_store(id)
                .ok_or_else(|| unresolved(format!("trust store {id:?} is not in the graph")))?;
            self.push_str(&format!(
                "\t.trust = {{.store = &{}}},\n",
                trust_store_symbol(&store.name)?
            ));
        }

        self.push_str("}");
        Ok(())
    }

    fn emit_protocol(&mut self, policy: &'a StreamPolicy) -> Result<(), CompilerError> {
        match ProtocolKind::from_tag(policy.protocol) {
            Some(kind @ (ProtocolKind::H1 | ProtocolKind::H2 | ProtocolKind::Ws)) => {
                self.emit_http(policy, kind == ProtocolKind::Ws)
            }
            Some(ProtocolKind::Mqtt) => self.emit_mqtt(policy),
            Some(ProtocolKind::Raw) | None => Err(CompilerError::new(
                CompileErrorKind::UnknownProtocol,
                format!(
                    "stream type {:?}: unknown ss protocol index {}",
                    policy.streamtype, policy.protocol
                ),
            )),
        }
    }

    fn emit_http(&mut self, policy: &'a StreamPolicy, ws: bool) -> Result<(), CompilerError> {
        let http = policy.u.http().ok_or_else(|| {
            CompilerError::new(
                CompileErrorKind::Internal,
                format!(
                    "stream type {:?}: protocol {} carries no http fields",
                    policy.streamtype, policy.protocol
                ),
            )
        })?;
        const IND: &str = "\t\t\t";

        self.push_str("\t.u = {\n\t\t.http = {\n");
        self.opt_str_field(IND, "method", &http.method);
        self.opt_str_field(IND, "url", &http.url);
        self.opt_str_field(IND, "multipart_name", &http.multipart_name);
        self.opt_str_field(IND, "multipart_filename", &http.multipart_filename);
        self.opt_str_field(IND, "multipart_content_type", &http.multipart_content_type);
        self.opt_str_field(IND, "auth_preamble", &http.auth_preamble);

        if http.blob_header[0].is_some() {
            self.push_str("\t\t\t.blob_header = {\n");
            for header in http.blob_header.iter().flatten() {
                self.push_str(&format!("\t\t\t\t\"{}\",\n", c_escape_string(header)));
            }
            self.push_str("\t\t\t},\n");
        }

        if ws {
            self.push_str("\t\t\t.u = {\n\t\t\t\t.ws = {\n");
            self.opt_str_field("\t\t\t\t\t", "subprotocol", &http.ws.subprotocol);
            self.push_str(&format!(
                "\t\t\t\t\t.binary = {}\n",
                u8::from(http.ws.binary)
            ));
            self.push_str("\t\t\t\t}\n\t\t\t},\n");
        }

        self.nonzero_field(IND, "resp_expect", u32::from(http.resp_expect));
        self.nonzero_field(IND, "fail_redirect", u32::from(http.fail_redirect));
        self.push_str("\t\t}\n\t},\n");
        Ok(())
    }

    fn emit_mqtt(&mut self, policy: &'a StreamPolicy) -> Result<(), CompilerError> {
        let mqtt = policy.u.mqtt().ok_or_else(|| {
            CompilerError::new(
                CompileErrorKind::Internal,
                format!(
                    "stream type {:?}: protocol {} carries no mqtt fields",
                    policy.streamtype, policy.protocol
                ),
            )
        })?;
        const IND: &str = "\t\t\t";

        self.push_str("\t.u = {\n\t\t.mqtt = {\n");
        self.opt_str_field(IND, "topic", &mqtt.topic);
        self.opt_str_field(IND, "subscribe", &mqtt.subscribe);
        self.opt_str_field(IND, "will_topic", &mqtt.will_topic);
        self.opt_str_field(IND, "will_message", &mqtt.will_message);
        self.nonzero_field(IND, "keep_alive", u32::from(mqtt.keep_alive));
        self.nonzero_field(IND, "qos", u32::from(mqtt.qos));
        self.nonzero_field(IND, "clean_start", u32::from(mqtt.clean_start));
        self.nonzero_field(IND, "will_qos", u32::from(mqtt.will_qos));
        self.nonzero_field(IND, "will_retain", u32::from(mqtt.will_retain));
        self.push_str("\t\t}\n\t},\n");
        Ok(())
    }
}
