// wireprint/src/state/cache.rs
//
// Flow correlation cache — assembles one fingerprint record per logical
// flow from handshake messages that arrive in either order and across
// packets. DashMap = sharded concurrent HashMap, so a driver that fans out
// across flow keys needs no extra locking; the reference pipeline feeds it
// single-threaded in arrival order, which the update rules depend on.
//
// Update discipline:
//   - scalars are first-write-wins (a replayed packet cannot overwrite)
//   - the protocol-stack string is additive: longer value wins
//   - timing marker C is refused once D is present
//   - the server side is written at most once — a populated `server` field
//     is the duplicate-Server-Hello guard, nothing counts delimiters
//   - the JA4X list only ever grows

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

// ── Flow identity ─────────────────────────────────────────────────────────────

/// Directionless flow identity. TCP/QUIC flows use the transport 4-tuple;
/// streams multiplexed over one connection (HTTP/2) use their stream id.
/// A Client Hello's key and its Server Hello's key collide via `reversed`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FlowKey {
    Tuple {
        src: String,
        dst: String,
        src_port: String,
        dst_port: String,
    },
    Stream(u64),
}

impl FlowKey {
    pub fn tuple(src: &str, dst: &str, src_port: &str, dst_port: &str) -> Self {
        FlowKey::Tuple {
            src: src.to_string(),
            dst: dst.to_string(),
            src_port: src_port.to_string(),
            dst_port: dst_port.to_string(),
        }
    }

    /// Swap the directional halves. Involution: `k.reversed().reversed() == k`.
    pub fn reversed(&self) -> FlowKey {
        match self {
            FlowKey::Tuple { src, dst, src_port, dst_port } => FlowKey::Tuple {
                src: dst.clone(),
                dst: src.clone(),
                src_port: dst_port.clone(),
                dst_port: src_port.clone(),
            },
            FlowKey::Stream(id) => FlowKey::Stream(*id),
        }
    }
}

// ── Timing markers ────────────────────────────────────────────────────────────

/// A = client SYN / QUIC Initial, B = server SYN-ACK / response,
/// C = first data-bearing ACK or QUIC short packet from the server,
/// D = first QUIC short packet toward the server (terminal marker).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingMarks {
    pub a: Option<f64>,
    pub b: Option<f64>,
    pub c: Option<f64>,
    pub d: Option<f64>,
}

impl TimingMarks {
    pub fn set_a(&mut self, ts: f64) {
        self.a.get_or_insert(ts);
    }

    pub fn set_b(&mut self, ts: f64) {
        self.b.get_or_insert(ts);
    }

    /// C must be the last timestamp before D: refuse it once D is present.
    pub fn set_c(&mut self, ts: f64) {
        if self.d.is_none() {
            self.c.get_or_insert(ts);
        }
    }

    /// Returns true when this call set D (first sighting of the terminal
    /// marker) — the caller short-circuits the rest of that record.
    pub fn set_d(&mut self, ts: f64) -> bool {
        if self.d.is_none() {
            self.d = Some(ts);
            true
        } else {
            false
        }
    }
}

// ── Per-side handshake fields ─────────────────────────────────────────────────

/// Client Hello side: normalized fields plus raw values for the extended
/// output row, and the computed client fingerprints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientFields {
    pub proto: String,
    pub sni: String,
    pub org_name: String,
    pub version_dec: u32,
    pub ciphers_dec: String,
    pub extensions_dec: String,
    pub supported_groups: String,
    pub ec_formats: String,
    pub alpn: String,
    pub sig_algs: String,
    pub supported_versions: String,
    pub ja3: String,
    pub ja4: String,
    pub ja4_raw: String,
    pub app_name: String,
    pub app_type: String,
}

/// Server Hello side. Written at most once per flow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerFields {
    pub version_dec: u32,
    pub cipher_dec: String,
    pub extensions_dec: String,
    pub supported_versions: String,
    pub ja3s: String,
    pub ja4s: String,
    pub ja4s_raw: String,
}

// ── Flow entry ────────────────────────────────────────────────────────────────

/// The accumulating per-flow record, always client-oriented: `src` is the
/// side that initiated the flow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowEntry {
    pub src: String,
    pub dst: String,
    pub src_port: String,
    pub dst_port: String,
    pub protos: String,
    pub marks: TimingMarks,
    pub client_ttl: Option<String>,
    pub server_ttl: Option<String>,
    pub client: Option<ClientFields>,
    pub server: Option<ServerFields>,
    pub ja4ts: Option<String>,
    pub ja4x: Vec<String>,
    pub issuers: Vec<String>,
    pub subjects: Vec<String>,
    // Wired for per-stream SSH statistics; no hash is computed from these
    // (the upstream formula was never finished).
    pub ssh_count: Option<u64>,
    pub ssh_stats: Option<Vec<f64>>,
}

impl FlowEntry {
    fn for_key(key: &FlowKey) -> Self {
        let mut entry = FlowEntry::default();
        if let FlowKey::Tuple { src, dst, src_port, dst_port } = key {
            entry.src = src.clone();
            entry.dst = dst.clone();
            entry.src_port = src_port.clone();
            entry.dst_port = dst_port.clone();
        }
        entry
    }

    /// Endpoints for entries whose key carries none (stream-keyed flows).
    /// First write wins.
    pub fn set_endpoints(&mut self, src: &str, dst: &str, src_port: &str, dst_port: &str) {
        if self.src.is_empty() {
            self.src = src.to_string();
            self.dst = dst.to_string();
            self.src_port = src_port.to_string();
            self.dst_port = dst_port.to_string();
        }
    }

    /// "More information wins": a longer protocol-stack string replaces a
    /// shorter one, never the other way around.
    pub fn merge_protos(&mut self, protos: &str) {
        if protos.len() > self.protos.len() {
            self.protos = protos.to_string();
        }
    }

    pub fn set_client_ttl(&mut self, ttl: &str) {
        self.client_ttl.get_or_insert_with(|| ttl.to_string());
    }

    pub fn set_server_ttl(&mut self, ttl: &str) {
        self.server_ttl.get_or_insert_with(|| ttl.to_string());
    }

    pub fn set_ja4ts(&mut self, fp: String) {
        self.ja4ts.get_or_insert(fp);
    }

    /// Initialize the SSH per-stream counters once.
    pub fn init_ssh_stats(&mut self) {
        self.ssh_count.get_or_insert(0);
        self.ssh_stats.get_or_insert_with(Vec::new);
    }

    /// A flow is worth a row once both connection-setup timestamps exist,
    /// or as soon as a Client Hello fingerprint does (short flows).
    pub fn emit_ready(&self) -> bool {
        self.client.is_some() || (self.marks.a.is_some() && self.marks.b.is_some())
    }
}

/// What happened to a Server Hello merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    /// No Client Hello was seen for the reversed key — not an error, the
    /// record is simply unlinkable.
    Unlinkable,
    /// The server side was already populated; the update was rejected.
    Duplicate,
}

// ── The cache ─────────────────────────────────────────────────────────────────

pub struct FlowCache {
    entries: DashMap<FlowKey, FlowEntry>,
    pub total_records: AtomicU64,
}

impl FlowCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            total_records: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn record_seen(&self) {
        self.total_records.fetch_add(1, Ordering::Relaxed);
    }

    /// Get-or-create the entry for `key` and apply `f` to it.
    pub fn with_entry<R>(&self, key: &FlowKey, f: impl FnOnce(&mut FlowEntry) -> R) -> R {
        let mut entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| FlowEntry::for_key(key));
        f(entry.value_mut())
    }

    /// Apply `f` to an existing entry under `key` or its reverse; None when
    /// neither orientation is known.
    pub fn with_either<R>(&self, key: &FlowKey, f: impl FnOnce(&mut FlowEntry) -> R) -> Option<R> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            return Some(f(entry.value_mut()));
        }
        if let Some(mut entry) = self.entries.get_mut(&key.reversed()) {
            return Some(f(entry.value_mut()));
        }
        None
    }

    /// Client Hello: create (or extend) the entry under the forward key.
    /// First write wins — replaying the same hello is a no-op.
    pub fn record_client_hello(&self, key: &FlowKey, fields: ClientFields) {
        self.with_entry(key, |entry| {
            if entry.client.is_none() {
                entry.client = Some(fields);
            }
        });
    }

    /// Server Hello: the caller passes the CLIENT-oriented key (the packet's
    /// tuple reversed). Absent entry → unlinkable; populated server side →
    /// duplicate; otherwise the fields are appended.
    pub fn record_server_hello(&self, client_key: &FlowKey, fields: ServerFields) -> MergeOutcome {
        match self.entries.get_mut(client_key) {
            None => MergeOutcome::Unlinkable,
            Some(mut entry) => {
                let entry = entry.value_mut();
                if entry.server.is_some() {
                    MergeOutcome::Duplicate
                } else {
                    entry.server = Some(fields);
                    MergeOutcome::Merged
                }
            }
        }
    }

    /// Clone out every entry, sorted by key for deterministic emission.
    pub fn snapshot(&self) -> Vec<FlowEntry> {
        let mut flows: Vec<(FlowKey, FlowEntry)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        flows.sort_by(|a, b| a.0.cmp(&b.0));
        flows.into_iter().map(|(_, entry)| entry).collect()
    }
}

impl Default for FlowCache {
    fn default() -> Self {
        Self::new()
    }
}
