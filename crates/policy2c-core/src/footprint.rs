//! Running estimate of the memory the emitted static policy occupies on the target.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::policy::{BLOB_HEADER_SLOTS, MAX_TRUST_STORE_CERTS};

fn align_up(n: usize, align: usize) -> usize {
    n.div_ceil(align) * align
}

/// Natural-alignment C struct layout for one pointer width.
struct StructLayout {
    size: usize,
    align: usize,
}

impl StructLayout {
    fn new() -> Self {
        StructLayout { size: 0, align: 1 }
    }

    fn field(mut self, size: usize, align: usize) -> Self {
        self.size = align_up(self.size, align) + size;
        self.align = self.align.max(align);
        self
    }

    fn fields(mut self, count: usize, size: usize, align: usize) -> Self {
        for _ in 0..count {
            self = self.field(size, align);
        }
        self
    }

    fn finish(&self) -> (usize, usize) {
        (align_up(self.size, self.align), self.align)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CLayout {
    pointer_width: usize,
}

impl CLayout {
    pub fn new(pointer_width: usize) -> Self {
        CLayout { pointer_width }
    }

    pub fn pointer_width(&self) -> usize {
        self.pointer_width
    }

    fn ptrs(&self, layout: StructLayout, count: usize) -> StructLayout {
        layout.fields(count, self.pointer_width, self.pointer_width)
    }

    /// `lws_ss_metadata_t`: next, name, value, length, one flag byte.
    pub fn metadata(&self) -> usize {
        let l = self.ptrs(StructLayout::new(), 3);
        self.ptrs(l, 1).field(1, 1).finish().0
    }

    /// `lws_retry_bo_t` without its millisecond table.
    pub fn retry_bo(&self) -> usize {
        self.ptrs(StructLayout::new(), 1)
            .fields(4, 2, 2)
            .field(1, 1)
            .finish()
            .0
    }

    pub fn retry_table(&self, entries: usize) -> usize {
        entries * 4
    }

    /// `lws_ss_x509_t` without its DER bytes.
    pub fn x509(&self) -> usize {
        self.ptrs(StructLayout::new(), 3).field(1, 1).finish().0
    }

    pub fn trust_store(&self) -> usize {
        self.ptrs(StructLayout::new(), 1 + MAX_TRUST_STORE_CERTS)
            .field(4, 4)
            .finish()
            .0
    }

    fn http_union_arm(&self) -> (usize, usize) {
        let ws = self.ptrs(StructLayout::new(), 1).field(1, 1).finish();
        self.ptrs(StructLayout::new(), 6 + BLOB_HEADER_SLOTS)
            .field(ws.0, ws.1)
            .field(2, 2)
            .field(1, 1)
            .finish()
    }

    fn mqtt_union_arm(&self) -> (usize, usize) {
        self.ptrs(StructLayout::new(), 4)
            .field(2, 2)
            .fields(4, 1, 1)
            .finish()
    }

    /// `lws_ss_policy_t`.
    pub fn policy(&self) -> usize {
        let http = self.http_union_arm();
        let mqtt = self.mqtt_union_arm();
        let align = http.1.max(mqtt.1);
        let union_size = align_up(http.0.max(mqtt.0), align);

        let l = self.ptrs(StructLayout::new(), 8).field(union_size, align);
        self.ptrs(l, 2)
            .fields(2, 4, 4)
            .field(2, 2)
            .fields(3, 1, 1)
            .finish()
            .0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum FootprintKind {
    Metadata,
    RetryTable,
    RetryBo,
    Certificate,
    TrustStore,
    Policy,
}

/// Additive-only byte accumulator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Footprint {
    total: usize,
    entities: usize,
    by_kind: BTreeMap<FootprintKind, usize>,
}

impl Footprint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: FootprintKind, bytes: usize) {
        self.total = self.total.saturating_add(bytes);
        self.entities += 1;
        let slot = self.by_kind.entry(kind).or_insert(0);
        *slot = slot.saturating_add(bytes);
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn entities(&self) -> usize {
        self.entities
    }

    pub fn by_kind(&self) -> &BTreeMap<FootprintKind, usize> {
        &self.by_kind
    }
}
