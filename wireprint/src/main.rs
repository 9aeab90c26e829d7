// wireprint/src/main.rs
//
// wireprint — JA3/JA4-family fingerprints from decoded capture records.
//
// Consumes NDJSON from an external capture decoder (one object per
// handshake-bearing packet), correlates both sides of each handshake in an
// in-memory flow cache, and writes one row per flow at end of stream:
// tls.csv (JA3/JA3S/JA4/JA4S), ja4x.csv, ja4ts.csv, optionally joined.csv.
//
// Usage:
//   decoder capture.pcap | wireprint --output ./out
//   wireprint --input decoded.ndjson --short --adlist ad-servers.txt
//   wireprint --input decoded.ndjson --join --whois whois.txt

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod error;
mod fingerprint;
mod lookup;
mod output;
mod records;
mod state;

use fingerprint::{canon, ja3, ja4, ja4ts, ja4x};
use lookup::Lookups;
use output::emit::{EmitConfig, Emitter};
use records::{DecodedRecord, LayerKind, TCP_ACK, TCP_SYN};
use state::cache::{ClientFields, FlowCache, FlowKey, MergeOutcome, ServerFields};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name    = "wireprint",
    about   = "JA3/JA4-family network fingerprints from decoded capture records",
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    #[arg(long, default_value = "-",
          help = "NDJSON input from the capture decoder (\"-\" = stdin)")]
    input: String,

    #[arg(long, default_value = "./wireprint_out", help = "Output directory")]
    output: PathBuf,

    #[arg(long, default_value = ";", help = "Output column delimiter")]
    delimiter: char,

    #[arg(long, help = "Reduced column set")]
    short: bool,

    #[arg(long, help = "Also write the outer-joined tls/ja4x/ja4ts view")]
    join: bool,

    #[arg(long, default_value = "Unknown", help = "Application name tag")]
    app: String,

    #[arg(long = "type", value_enum, default_value = "normal",
          help = "Traffic type tag")]
    traffic_type: TrafficType,

    #[arg(long, help = "Port-to-application resolution file (port,app)")]
    res: Option<PathBuf>,

    #[arg(long, help = "WHOIS file (ip;org)")]
    whois: Option<PathBuf>,

    #[arg(long, help = "Ad-server SNI list")]
    adlist: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum TrafficType {
    Normal,  // "0"
    Ads,     // "A"
    Malware, // "M"
}

impl TrafficType {
    fn tag(self) -> &'static str {
        match self {
            Self::Normal => "0",
            Self::Ads => "A",
            Self::Malware => "M",
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

struct Pipeline {
    cache: FlowCache,
    lookups: Lookups,
    app_name: String,
    traffic_type: &'static str,
}

impl Pipeline {
    fn new(lookups: Lookups, app_name: String, traffic_type: &'static str) -> Self {
        Self {
            cache: FlowCache::new(),
            lookups,
            app_name,
            traffic_type,
        }
    }

    /// One record, processed to completion. Correlation correctness depends
    /// on arrival order, so the caller feeds records strictly sequentially.
    fn process(&self, rec: &DecodedRecord) {
        self.cache.record_seen();

        if self.record_transport_markers(rec) {
            return; // terminal QUIC marker D — flow is complete
        }

        match rec.layer() {
            Some(LayerKind::Tls) => self.handle_tls(rec),
            Some(LayerKind::X509) => self.handle_x509(rec),
            Some(LayerKind::Http) => self.handle_stream(rec),
            _ => {}
        }
    }

    /// TCP flag and QUIC packet-type markers: timing fields A–D, TTLs,
    /// JA4TS, SSH scratch. Returns true when this record newly set the
    /// terminal marker D.
    fn record_transport_markers(&self, rec: &DecodedRecord) -> bool {
        let Some(key) = packet_key(rec) else { return false };
        let ts = rec.timestamp();

        if let Some(tcp) = &rec.tcp {
            if let Some(flags) = tcp.flag_bits() {
                let syn = flags & TCP_SYN != 0;
                let ack = flags & TCP_ACK != 0;

                if syn && !ack {
                    self.cache.with_entry(&key, |e| {
                        e.merge_protos(rec.protocols());
                        if let Some(ts) = ts {
                            e.marks.set_a(ts);
                        }
                        if let Some(ttl) = rec.ttl() {
                            e.set_client_ttl(ttl);
                        }
                    });
                } else if syn && ack {
                    // SYN-ACK travels server → client: entry lives under the
                    // client-oriented key
                    self.cache.with_entry(&key.reversed(), |e| {
                        e.merge_protos(rec.protocols());
                        if let Some(ts) = ts {
                            e.marks.set_b(ts);
                        }
                        if let Some(ttl) = rec.ttl() {
                            e.set_server_ttl(ttl);
                        }
                        if let Some(options) = tcp.options.as_deref() {
                            let opts = ja4ts::parse_options(options);
                            if let Some(err) = &opts.truncated {
                                warn!("ja4ts: {err}");
                            }
                            e.set_ja4ts(ja4ts::ja4ts(
                                tcp.window.as_deref().unwrap_or(""),
                                &opts,
                                tcp.mss.as_deref(),
                                tcp.wscale.as_deref(),
                            ));
                        }
                    });
                } else if ack
                    && tcp.seq.as_deref() == Some("1")
                    && tcp.ack.as_deref() == Some("1")
                {
                    // first data-bearing ACK of the connection
                    if let Some(ts) = ts {
                        self.cache.with_either(&key, |e| e.marks.set_c(ts));
                    }
                }
            }

            // Per-stream SSH statistics wiring. No hash is computed from
            // these fields; the formula upstream was never finished.
            if let Some((sp, dp)) = rec.ports() {
                if sp == "22" || dp == "22" {
                    self.cache.with_either(&key, |e| e.init_ssh_stats());
                }
            }
        }

        if let Some(quic) = &rec.quic {
            let packet_type = quic.packet_type.as_deref().unwrap_or("");
            let hello = rec.tls.as_ref().and_then(|t| t.first_type()).unwrap_or("");
            match (packet_type, hello) {
                ("0", "1") => {
                    self.cache.with_entry(&key, |e| {
                        e.merge_protos(rec.protocols());
                        if let Some(ts) = ts {
                            e.marks.set_a(ts);
                        }
                        if let Some(ttl) = rec.ttl() {
                            e.set_client_ttl(ttl);
                        }
                    });
                }
                ("0", "2") => {
                    self.cache.with_entry(&key.reversed(), |e| {
                        e.merge_protos(rec.protocols());
                        if let Some(ts) = ts {
                            e.marks.set_b(ts);
                        }
                        if let Some(ttl) = rec.ttl() {
                            e.set_server_ttl(ttl);
                        }
                    });
                }
                ("2", _) => {
                    let Some((sp, dp)) = rec.ports() else { return false };
                    if sp == "443" {
                        // short packet from the server
                        if let Some(ts) = ts {
                            self.cache.with_either(&key.reversed(), |e| e.marks.set_c(ts));
                        }
                    } else if dp == "443" {
                        // short packet toward the server — terminal marker
                        if let Some(ts) = ts {
                            let newly_set = self
                                .cache
                                .with_either(&key, |e| e.marks.set_d(ts))
                                .unwrap_or(false);
                            return newly_set;
                        }
                    }
                }
                _ => {}
            }
        }

        false
    }

    fn handle_tls(&self, rec: &DecodedRecord) {
        let Some(tls) = &rec.tls else { return };
        let Some(key) = packet_key(rec) else { return };

        let version_dec = canon::parse_version(tls.version.as_deref().unwrap_or(""));
        let ciphers = tls.ciphers.as_deref().unwrap_or("");
        let extensions = tls.extensions.as_deref().unwrap_or("");
        let supported_versions = tls.supported_versions.as_deref().unwrap_or("");
        let alpn_raw = tls.alpn.as_deref().unwrap_or("");

        let transport = if rec.is_quic() { 'q' } else { 't' };
        let version = canon::version_label(supported_versions, version_dec);
        let alpn = canon::alpn_code(alpn_raw);
        let ciphers_dec = canon::strip_grease_dec(&canon::hex_list_to_dec(ciphers));
        let ciphers_sorted = canon::ciphers_sorted_hex(ciphers);
        let extensions_dec = canon::extensions_dec(extensions);

        match tls.first_type() {
            Some("1") => {
                let ext_values = canon::extension_values(&extensions_dec, true);
                let ext_count = format!("{:02}", ext_values.len().min(99));
                let ext_string = canon::format_ja4_extensions(&ext_values);
                let sig = canon::strip_hex_prefix(tls.sig_algs.as_deref().unwrap_or(""));
                let groups_raw = tls.supported_groups.as_deref().unwrap_or("");
                let groups = canon::groups_dec(groups_raw);
                let ec_formats = tls.ec_formats.as_deref().unwrap_or("");
                let sni = tls.sni.as_deref().unwrap_or("");

                let ja3 = ja3::ja3(version_dec, &ciphers_dec, &extensions_dec, &groups, ec_formats);
                let fp = ja4::ja4(&ja4::Ja4Input {
                    transport,
                    version,
                    sni: canon::sni_flag(sni),
                    ciphers_sorted: &ciphers_sorted,
                    cipher_count: &canon::count2(&ciphers_sorted),
                    ext_string: &ext_string,
                    ext_count: &ext_count,
                    alpn: &alpn,
                    sig_algs: &sig,
                });

                let mut app_name = self.app_name.clone();
                let mut app_type = self.traffic_type.to_string();
                if let Some((src_port, _)) = rec.ports() {
                    if let Some(app) = self.lookups.app_for_port(src_port) {
                        app_name = app.to_string();
                        app_type = "0".to_string();
                    }
                }
                if !sni.is_empty() && self.lookups.is_ad_server(sni) {
                    app_type = "A".to_string();
                }

                self.cache.with_entry(&key, |e| e.merge_protos(rec.protocols()));
                self.cache.record_client_hello(&key, ClientFields {
                    proto: rec.proto_number().to_string(),
                    sni: sni.to_string(),
                    org_name: self.lookups.org_for(rec.dst().unwrap_or("")).to_string(),
                    version_dec,
                    ciphers_dec,
                    extensions_dec,
                    supported_groups: groups_raw.to_string(),
                    ec_formats: ec_formats.to_string(),
                    alpn: alpn_raw.to_string(),
                    sig_algs: sig,
                    supported_versions: supported_versions.to_string(),
                    ja3,
                    ja4: fp.hash,
                    ja4_raw: fp.raw,
                    app_name,
                    app_type,
                });
            }

            Some("2") => {
                let ext_values = canon::extension_values(&extensions_dec, false);
                let ext_count = format!("{:02}", ext_values.len().min(99));
                let ext_string = canon::format_ja4_extensions(&ext_values);

                let ja3s = ja3::ja3s(version_dec, &ciphers_dec, &extensions_dec);
                let fp = ja4::ja4s(&ja4::Ja4sInput {
                    transport,
                    version,
                    cipher: &ciphers_sorted,
                    ext_string: &ext_string,
                    ext_count: &ext_count,
                    alpn: &alpn,
                });

                let outcome = self.cache.record_server_hello(&key.reversed(), ServerFields {
                    version_dec,
                    cipher_dec: ciphers_dec,
                    extensions_dec,
                    supported_versions: supported_versions.to_string(),
                    ja3s,
                    ja4s: fp.hash,
                    ja4s_raw: fp.raw,
                });
                match outcome {
                    MergeOutcome::Merged => {}
                    MergeOutcome::Unlinkable => {
                        debug!("server hello with no matching client hello; dropped")
                    }
                    MergeOutcome::Duplicate => {
                        debug!("duplicated server hello rejected; entry retained")
                    }
                }
            }

            _ => {}
        }
    }

    fn handle_x509(&self, rec: &DecodedRecord) {
        let Some(x) = &rec.x509 else { return };
        let chain = ja4x::decode_chain(x);
        if chain.ja4x.is_empty() {
            return;
        }
        let Some(key) = packet_key(rec) else { return };

        // certificates travel server → client: the entry lives under the
        // client-oriented key
        self.cache.with_entry(&key.reversed(), |e| {
            e.merge_protos(rec.protocols());
            if !e.ja4x.is_empty() && chain.ja4x.iter().all(|fp| e.ja4x.contains(fp)) {
                return; // retransmitted certificate message
            }
            e.ja4x.extend(chain.ja4x.iter().cloned());
            e.issuers.extend(chain.issuers.iter().cloned());
            e.subjects.extend(chain.subjects.iter().cloned());
        });
    }

    /// Streams multiplexed over one connection (HTTP/2) are keyed by their
    /// stream id rather than the transport tuple.
    fn handle_stream(&self, rec: &DecodedRecord) {
        let Some(id) = rec.http_stream() else { return };
        self.cache.with_entry(&FlowKey::Stream(id), |e| {
            e.merge_protos(rec.protocols());
            if let (Some(src), Some(dst), Some((sp, dp))) = (rec.src(), rec.dst(), rec.ports()) {
                e.set_endpoints(src, dst, sp, dp);
            }
        });
    }
}

/// Flow key as the packet is oriented (src → dst).
fn packet_key(rec: &DecodedRecord) -> Option<FlowKey> {
    let (src_port, dst_port) = rec.ports()?;
    Some(FlowKey::tuple(rec.src()?, rec.dst()?, src_port, dst_port))
}

// ── Input ─────────────────────────────────────────────────────────────────────

async fn consume<R>(reader: R, pipeline: &Pipeline) -> Result<(u64, u64)>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let (mut parsed, mut skipped) = (0u64, 0u64);

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<DecodedRecord>(line) {
            Ok(rec) => {
                pipeline.process(&rec);
                parsed += 1;
            }
            Err(e) => {
                warn!("record skipped: {e}");
                skipped += 1;
            }
        }
    }
    Ok((parsed, skipped))
}

fn input_stem(input: &str) -> String {
    if input == "-" {
        return "stdin".to_string();
    }
    std::path::Path::new(input)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.to_string())
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env()
            .add_directive("wireprint=info".parse()?))
        .compact()
        .init();

    let cli = Cli::parse();
    let lookups = Lookups::load(
        cli.adlist.as_deref(),
        cli.whois.as_deref(),
        cli.res.as_deref(),
    );
    let pipeline = Pipeline::new(lookups, cli.app.clone(), cli.traffic_type.tag());
    let started = Utc::now();

    info!("reading {}", if cli.input == "-" { "stdin" } else { &cli.input });

    let (parsed, skipped) = if cli.input == "-" {
        consume(BufReader::new(tokio::io::stdin()), &pipeline).await?
    } else {
        let file = tokio::fs::File::open(&cli.input)
            .await
            .with_context(|| format!("cannot open input {}", cli.input))?;
        consume(BufReader::new(file), &pipeline).await?
    };

    let cfg = EmitConfig {
        delimiter: cli.delimiter,
        short: cli.short,
        filename: input_stem(&cli.input),
    };
    let emitter = Emitter::new(&cli.output)?;
    let summary = emitter.write_all(&pipeline.cache, &cfg, cli.join).await?;

    info!(
        "done in {}ms: {parsed} records ({skipped} skipped), {} flows, {} tls / {} ja4x / {} ja4ts rows",
        (Utc::now() - started).num_milliseconds(),
        pipeline.cache.len(),
        summary.tls_rows,
        summary.ja4x_rows,
        summary.ja4ts_rows
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: &str) -> DecodedRecord {
        serde_json::from_str(json).unwrap()
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(Lookups::default(), "Unknown".into(), "0")
    }

    fn client_hello() -> DecodedRecord {
        record(
            r#"{
            "frame": {"protocols": "eth:ip:tcp:tls", "time_epoch": "100.0"},
            "ip": {"src": "10.0.0.1", "dst": "93.184.216.34", "ttl": "64"},
            "tcp": {"srcport": "51234", "dstport": "443"},
            "tls": {
                "type": "1", "version": "0x0303",
                "ciphers": "0x1301,0x0a0a,0x1302",
                "extensions": "0,10,43,2570",
                "supported_versions": "0x0304,0x0303",
                "sni": "example.com"
            }
        }"#,
        )
    }

    fn server_hello() -> DecodedRecord {
        record(
            r#"{
            "frame": {"protocols": "eth:ip:tcp:tls", "time_epoch": "100.2"},
            "ip": {"src": "93.184.216.34", "dst": "10.0.0.1", "ttl": "57"},
            "tcp": {"srcport": "443", "dstport": "51234"},
            "tls": {
                "type": "2,11,14", "version": "0x0303",
                "ciphers": "0x1301",
                "extensions": "43,51",
                "supported_versions": "0x0304"
            }
        }"#,
        )
    }

    #[test]
    fn client_hello_segment_a_matches_the_published_shape() {
        let p = pipeline();
        p.process(&client_hello());

        let flows = p.cache.snapshot();
        assert_eq!(flows.len(), 1);
        let client = flows[0].client.as_ref().unwrap();

        // TLS1.3 via supported_versions, SNI=domain, 2 ciphers after GREASE
        // removal, 3 extensions counted, no ALPN
        assert!(client.ja4.starts_with("t13d020300_"));
        let parts: Vec<&str> = client.ja4.split('_').collect();
        assert_eq!(parts[0].len(), 10);
        assert_eq!(parts[1].len(), 12);
        assert_eq!(parts[2].len(), 12);
        // GREASE never reaches the raw output either
        assert!(!client.ja4_raw.contains("0a0a"));
        assert!(!client.ja4_raw.contains("2570"));
    }

    #[test]
    fn hellos_correlate_across_directions() {
        let p = pipeline();
        p.process(&client_hello());
        p.process(&server_hello());

        let flows = p.cache.snapshot();
        assert_eq!(flows.len(), 1);
        let entry = &flows[0];
        assert_eq!(entry.src, "10.0.0.1"); // client-oriented
        let server = entry.server.as_ref().unwrap();
        assert_eq!(server.ja3s.len(), 32);
        assert!(server.ja4s.starts_with("t13"));

        // replaying the server hello must not corrupt the entry
        let before = server.clone();
        p.process(&server_hello());
        assert_eq!(p.cache.snapshot()[0].server.as_ref().unwrap(), &before);
    }

    #[test]
    fn server_hello_alone_is_dropped() {
        let p = pipeline();
        p.process(&server_hello());
        assert!(p.cache.is_empty());
    }

    #[test]
    fn syn_and_synack_set_timing_and_ja4ts() {
        let p = pipeline();
        p.process(&record(
            r#"{
            "frame": {"protocols": "eth:ip:tcp", "time_epoch": "1.0"},
            "ip": {"src": "10.0.0.1", "dst": "93.184.216.34", "ttl": "64"},
            "tcp": {"flags": "0x0002", "srcport": "51234", "dstport": "443"}
        }"#,
        ));
        p.process(&record(
            r#"{
            "frame": {"protocols": "eth:ip:tcp", "time_epoch": "1.1"},
            "ip": {"src": "93.184.216.34", "dst": "10.0.0.1", "ttl": "57"},
            "tcp": {"flags": "0x0012", "srcport": "443", "dstport": "51234",
                    "window": "64240", "options": "020405b4010303030101080affffffffffffffff00"}
        }"#,
        ));

        let flows = p.cache.snapshot();
        assert_eq!(flows.len(), 1);
        let entry = &flows[0];
        assert_eq!(entry.marks.a, Some(1.0));
        assert_eq!(entry.marks.b, Some(1.1));
        assert_eq!(entry.client_ttl.as_deref(), Some("64"));
        assert_eq!(entry.server_ttl.as_deref(), Some("57"));
        assert_eq!(entry.ja4ts.as_deref(), Some("64240-2-1-3-1-1-8-0-1460-3"));
        assert!(entry.emit_ready());
    }

    #[test]
    fn quic_terminal_marker_blocks_later_c() {
        let p = pipeline();
        // QUIC short packet toward the server: D
        p.process(&record(
            r#"{
            "frame": {"protocols": "eth:ip:udp:quic", "time_epoch": "5.0"},
            "ip": {"src": "10.0.0.1", "dst": "93.184.216.34"},
            "udp": {"srcport": "51234", "dstport": "443"},
            "quic": {"packet_type": "0"},
            "tls": {"type": "1", "version": "0x0303", "ciphers": "0x1301"}
        }"#,
        ));
        p.process(&record(
            r#"{
            "frame": {"protocols": "eth:ip:udp:quic", "time_epoch": "5.3"},
            "ip": {"src": "10.0.0.1", "dst": "93.184.216.34"},
            "udp": {"srcport": "51234", "dstport": "443"},
            "quic": {"packet_type": "2"}
        }"#,
        ));
        // late short packet from the server: C must be refused
        p.process(&record(
            r#"{
            "frame": {"protocols": "eth:ip:udp:quic", "time_epoch": "5.4"},
            "ip": {"src": "93.184.216.34", "dst": "10.0.0.1"},
            "udp": {"srcport": "443", "dstport": "51234"},
            "quic": {"packet_type": "2"}
        }"#,
        ));

        let entry = &p.cache.snapshot()[0];
        assert_eq!(entry.marks.d, Some(5.3));
        assert_eq!(entry.marks.c, None);
    }

    #[test]
    fn certificate_chain_lands_on_the_client_oriented_entry() {
        let p = pipeline();
        p.process(&client_hello());
        p.process(&record(
            r#"{
            "frame": {"protocols": "eth:ip:tcp:tls:x509", "time_epoch": "100.4"},
            "ip": {"src": "93.184.216.34", "dst": "10.0.0.1"},
            "tcp": {"srcport": "443", "dstport": "51234"},
            "x509": {
                "issuer_sequence": ["2"], "subject_sequence": ["2"],
                "rdn_oids": ["2.5.4.10", "2.5.4.3", "2.5.4.10", "2.5.4.3"],
                "extension_lengths": ["1"],
                "cert_extensions": ["2.5.29.15"],
                "printable_strings": ["Example CA", "ca.example", "Example Org", "www.example.com"]
            }
        }"#,
        ));

        let flows = p.cache.snapshot();
        assert_eq!(flows.len(), 1);
        let entry = &flows[0];
        assert_eq!(entry.src, "10.0.0.1");
        assert_eq!(entry.ja4x.len(), 1);
        assert_eq!(entry.issuers[0], "CN=ca.example, ON=Example CA");
    }

    #[test]
    fn port_22_flows_get_ssh_scratch_but_no_hash() {
        let p = pipeline();
        p.process(&record(
            r#"{
            "frame": {"protocols": "eth:ip:tcp", "time_epoch": "2.0"},
            "ip": {"src": "10.0.0.1", "dst": "10.0.0.9"},
            "tcp": {"flags": "0x0002", "srcport": "50000", "dstport": "22"}
        }"#,
        ));
        let entry = &p.cache.snapshot()[0];
        assert_eq!(entry.ssh_count, Some(0));
        assert_eq!(entry.ssh_stats.as_deref(), Some(&[][..]));
    }
}
