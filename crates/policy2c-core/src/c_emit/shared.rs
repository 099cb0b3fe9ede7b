use super::*;

impl<'a> Emitter<'a> {
    /// First walk: everything `policy` references that must precede its struct.
    pub(super) fn emit_shared(&mut self, policy: &'a StreamPolicy) -> Result<(), CompilerError> {
        self.emit_metadata(policy)?;
        if let Some(id) = policy.retry_bo {
            self.emit_retry(id)?;
        }
        if let Some(id) = policy.trust_store {
            self.emit_trust_store(id)?;
        }
        Ok(())
    }

    fn emit_metadata(&mut self, policy: &'a StreamPolicy) -> Result<(), CompilerError> {
        if policy.metadata.is_empty() {
            return Ok(());
        }

        self.push_str("\nstatic const lws_ss_metadata_t ");
        let mut prev: Option<String> = None;
        let count = policy.metadata.len();
        for (idx, md) in policy.metadata.iter().enumerate() {
            let curr = metadata_symbol(&policy.streamtype, &md.name)?;
            self.push_str(&format!("{curr} = {{\n"));
            if let Some(prev) = &prev {
                self.push_str(&format!("\t.next = (void *)&{prev}, \n"));
            }
            self.push_str(&format!("\t.name = \"{}\",\n", c_escape_string(&md.name)));
            if let Some(value) = &md.value {
                self.push_str(&format!(
                    "\t.value = (void *)\"{}\",\n",
                    c_escape_string(value)
                ));
            }
            self.push_str(&format!("\t.length = {idx},\n"));
            self.push_str("}");
            if idx + 1 < count {
                self.push_str(",\n");
            }

            self.footprint
                .add(FootprintKind::Metadata, self.layout.metadata());
            self.metadata_records += 1;
            prev = Some(curr);
        }
        self.push_str(";\n\n");
        Ok(())
    }

    fn emit_retry(&mut self, id: RetryId) -> Result<(), CompilerError> {
        let interned = self.retry_map.lookup_or_insert(id)?;
        if !interned.fresh {
            return Ok(());
        }
        let graph = self.graph;
        let retry = graph
            .retry(id)
            .ok_or_else(|| unresolved(format!("retry/backoff {id:?} is not in the graph")))?;
        let h = interned.handle.0;

        self.push_str(&format!(
            "static const uint32_t {}[] = {{\n",
            retry_table_symbol(h)
        ));
        for ms in &retry.retry_ms_table {
            self.push_str(&format!(" {ms}, "));
        }
        self.footprint.add(
            FootprintKind::RetryTable,
            self.layout.retry_table(retry.retry_ms_table.len()),
        );

        self.push_str(&format!(
            "\n}};\nstatic const lws_retry_bo_t {} = {{\n",
            retry_symbol(h)
        ));
        self.push_str(&format!("\t.retry_ms_table = {},\n", retry_table_symbol(h)));
        self.push_str(&format!(
            "\t.retry_ms_table_count = {},\n",
            retry.retry_ms_table.len()
        ));
        self.push_str(&format!("\t.conceal_count = {},\n", retry.conceal_count));
        self.push_str(&format!(
            "\t.secs_since_valid_ping = {},\n",
            retry.secs_since_valid_ping
        ));
        self.push_str(&format!(
            "\t.secs_since_valid_hangup = {},\n",
            retry.secs_since_valid_hangup
        ));
        self.push_str(&format!("\t.jitter_percent = {},\n", retry.jitter_percent));
        self.push_str("};\n");
        self.footprint.add(FootprintKind::RetryBo, self.layout.retry_bo());

        debug!(retry = retry.name.as_str(), handle = h, "emitted retry/backoff");
        Ok(())
    }

    fn emit_trust_store(&mut self, id: TrustStoreId) -> Result<(), CompilerError> {
        if !self.trust_map.lookup_or_insert(id)?.fresh {
            return Ok(());
        }
        let graph = self.graph;
        let store = graph
            .trust_store(id)
            .ok_or_else(|| unresolved(format!("trust store {id:?} is not in the graph")))?;

        for &cert in &store.ssx509 {
            self.emit_cert(cert)?;
        }

        self.push_str(&format!(
            "static const lws_ss_trust_store_t {} = {{\n",
            trust_store_symbol(&store.name)?
        ));
        self.push_str(&format!("\t.name = \"{}\",\n", c_escape_string(&store.name)));
        self.push_str("\t.ssx509 = {\n");
        // References go out last certificate first.
        for &cert_id in store.ssx509.iter().rev() {
            let cert = graph.cert(cert_id).ok_or_else(|| {
                unresolved(format!("certificate {cert_id:?} is not in the graph"))
            })?;
            self.push_str(&format!("\t\t&{},\n", x509_symbol(&cert.vhost_name)?));
        }
        self.push_str("\t}\n};\n");
        self.footprint
            .add(FootprintKind::TrustStore, self.layout.trust_store());

        debug!(
            trust_store = store.name.as_str(),
            certificates = store.ssx509.len(),
            "emitted trust store"
        );
        Ok(())
    }

    fn emit_cert(&mut self, id: CertId) -> Result<(), CompilerError> {
        if !self.cert_map.lookup_or_insert(id)?.fresh {
            return Ok(());
        }
        let graph = self.graph;
        let cert = graph
            .cert(id)
            .ok_or_else(|| unresolved(format!("certificate {id:?} is not in the graph")))?;
        let der = der_symbol(&cert.vhost_name)?;

        self.push_str(&format!("static const uint8_t {der}[] = {{\n"));
        for (m, b) in cert.ca_der.iter().enumerate() {
            if m & 7 == 0 {
                self.push_str(&format!("\t/* 0x{m:3x} */ "));
            }
            self.push_str(&format!("0x{b:02X}, "));
            if m & 7 == 7 {
                self.push_str("\n");
            }
        }
        self.push_str(&format!(
            "\n}};\nstatic const lws_ss_x509_t {} = {{\n",
            x509_symbol(&cert.vhost_name)?
        ));
        self.push_str(&format!(
            "\t.vhost_name = \"{}\",\n",
            c_escape_string(&cert.vhost_name)
        ));
        self.push_str(&format!("\t.ca_der = {der},\n"));
        self.push_str(&format!("\t.ca_der_len = {},\n", cert.ca_der.len()));
        self.push_str("};\n");
        self.footprint.add(
            FootprintKind::Certificate,
            self.layout.x509() + cert.ca_der.len(),
        );

        debug!(
            certificate = cert.vhost_name.as_str(),
            der_bytes = cert.ca_der.len(),
            "emitted x.509 certificate"
        );
        Ok(())
    }
}
