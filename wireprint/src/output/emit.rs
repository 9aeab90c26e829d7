// wireprint/src/output/emit.rs
//
// End-of-stream emission. Walks the completed flow cache (sorted by key)
// and writes one row per flow in a fixed column order, plus the separate
// JA4X and JA4TS outputs. Delimiter configurable, default ';'. Rows are
// plain delimited text, no quoting — the upstream tooling expects it.

use std::path::PathBuf;

use anyhow::Result;
use tracing::info;

use crate::state::cache::{FlowCache, FlowEntry};

// Payload columns after the SrcIP;DstIP;SrcPort;DstPort key.
const TLS_COLUMNS_FULL: &[&str] = &[
    "Proto", "SNI", "OrgName", "TLSVersion", "ClientCipherSuite", "ClientExtensions",
    "ClientSupportedGroups", "EC_fmt", "ALPN", "SignatureAlgorithms",
    "ClientSupportedVersions", "JA3hash", "JA4hash", "JA4_raw", "AppName", "Type",
    "ServerCipherSuite", "ServerExtensions", "ServerSupportedVersions", "JA3Shash",
    "JA4Shash", "JA4S_raw", "Filename", "Version",
];

const TLS_COLUMNS_SHORT: &[&str] = &[
    "SNI", "OrgName", "JA3hash", "JA4hash", "AppName", "Type",
    "JA3Shash", "JA4Shash", "Filename", "Version",
];

const JA4X_COLUMNS: &[&str] = &["JA4X", "Issuer", "Subject"];
const JA4TS_COLUMNS: &[&str] = &["ja4ts"];
const KEY_COLUMNS: &[&str] = &["SrcIP", "DstIP", "SrcPort", "DstPort"];

#[derive(Debug, Clone)]
pub struct EmitConfig {
    pub delimiter: char,
    pub short: bool,
    /// Input file stem, carried into the Filename column.
    pub filename: String,
}

/// One output row: the transport 4-tuple key plus payload columns. The key
/// is kept apart so the join stage can merge families on it.
#[derive(Debug, Clone)]
pub struct Row {
    pub key: [String; 4],
    pub cols: Vec<String>,
}

impl Row {
    pub fn render(&self, delimiter: char) -> String {
        let mut fields: Vec<&str> = self.key.iter().map(String::as_str).collect();
        fields.extend(self.cols.iter().map(String::as_str));
        fields.join(&delimiter.to_string())
    }
}

pub fn tls_width(cfg: &EmitConfig) -> usize {
    if cfg.short { TLS_COLUMNS_SHORT.len() } else { TLS_COLUMNS_FULL.len() }
}

pub fn ja4x_width() -> usize {
    JA4X_COLUMNS.len()
}

pub fn ja4ts_width() -> usize {
    JA4TS_COLUMNS.len()
}

fn header(payload: &[&str], delimiter: char) -> String {
    let mut cols: Vec<&str> = KEY_COLUMNS.to_vec();
    cols.extend_from_slice(payload);
    cols.join(&delimiter.to_string())
}

pub fn tls_header(cfg: &EmitConfig) -> String {
    let payload = if cfg.short { TLS_COLUMNS_SHORT } else { TLS_COLUMNS_FULL };
    header(payload, cfg.delimiter)
}

pub fn ja4x_header(delimiter: char) -> String {
    header(JA4X_COLUMNS, delimiter)
}

pub fn ja4ts_header(delimiter: char) -> String {
    header(JA4TS_COLUMNS, delimiter)
}

pub fn join_header(cfg: &EmitConfig) -> String {
    let mut payload: Vec<&str> =
        if cfg.short { TLS_COLUMNS_SHORT.to_vec() } else { TLS_COLUMNS_FULL.to_vec() };
    payload.extend_from_slice(JA4X_COLUMNS);
    payload.extend_from_slice(JA4TS_COLUMNS);
    header(&payload, cfg.delimiter)
}

fn entry_key(entry: &FlowEntry) -> [String; 4] {
    [
        entry.src.clone(),
        entry.dst.clone(),
        entry.src_port.clone(),
        entry.dst_port.clone(),
    ]
}

/// TLS row for a flow, present once the Client Hello side exists. Server
/// columns stay empty for half-open handshakes; the Version column carries
/// the server's decimal handshake version when one was correlated.
pub fn tls_row(entry: &FlowEntry, cfg: &EmitConfig) -> Option<Row> {
    let client = entry.client.as_ref()?;
    let server = entry.server.as_ref();
    let server_version = server
        .map(|s| s.version_dec.to_string())
        .unwrap_or_default();

    let cols = if cfg.short {
        vec![
            client.sni.clone(),
            client.org_name.clone(),
            client.ja3.clone(),
            client.ja4.clone(),
            client.app_name.clone(),
            client.app_type.clone(),
            server.map(|s| s.ja3s.clone()).unwrap_or_default(),
            server.map(|s| s.ja4s.clone()).unwrap_or_default(),
            cfg.filename.clone(),
            server_version,
        ]
    } else {
        vec![
            client.proto.clone(),
            client.sni.clone(),
            client.org_name.clone(),
            client.version_dec.to_string(),
            client.ciphers_dec.clone(),
            client.extensions_dec.clone(),
            client.supported_groups.clone(),
            client.ec_formats.clone(),
            client.alpn.clone(),
            client.sig_algs.clone(),
            client.supported_versions.clone(),
            client.ja3.clone(),
            client.ja4.clone(),
            client.ja4_raw.clone(),
            client.app_name.clone(),
            client.app_type.clone(),
            server.map(|s| s.cipher_dec.clone()).unwrap_or_default(),
            server.map(|s| s.extensions_dec.clone()).unwrap_or_default(),
            server.map(|s| s.supported_versions.clone()).unwrap_or_default(),
            server.map(|s| s.ja3s.clone()).unwrap_or_default(),
            server.map(|s| s.ja4s.clone()).unwrap_or_default(),
            server.map(|s| s.ja4s_raw.clone()).unwrap_or_default(),
            cfg.filename.clone(),
            server_version,
        ]
    };

    Some(Row { key: entry_key(entry), cols })
}

/// JA4X row: the whole chain's fingerprints and annotations, comma-joined.
pub fn ja4x_row(entry: &FlowEntry) -> Option<Row> {
    if entry.ja4x.is_empty() {
        return None;
    }
    Some(Row {
        key: entry_key(entry),
        cols: vec![
            entry.ja4x.join(", "),
            entry.issuers.join(", "),
            entry.subjects.join(", "),
        ],
    })
}

pub fn ja4ts_row(entry: &FlowEntry) -> Option<Row> {
    entry.ja4ts.as_ref().map(|fp| Row {
        key: entry_key(entry),
        cols: vec![fp.clone()],
    })
}

// ── Writer ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct EmitSummary {
    pub tls_rows: usize,
    pub ja4x_rows: usize,
    pub ja4ts_rows: usize,
}

pub struct Emitter {
    out: PathBuf,
}

impl Emitter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let out: PathBuf = output_dir.into();
        std::fs::create_dir_all(&out)?;
        Ok(Self { out })
    }

    pub async fn write_all(
        &self,
        cache: &FlowCache,
        cfg: &EmitConfig,
        join: bool,
    ) -> Result<EmitSummary> {
        let flows: Vec<FlowEntry> = cache
            .snapshot()
            .into_iter()
            .filter(FlowEntry::emit_ready)
            .collect();

        let tls: Vec<Row> = flows.iter().filter_map(|e| tls_row(e, cfg)).collect();
        let ja4x: Vec<Row> = flows.iter().filter_map(ja4x_row).collect();
        let ja4ts: Vec<Row> = flows.iter().filter_map(ja4ts_row).collect();

        self.write_file("tls.csv", &tls_header(cfg), &tls, cfg.delimiter).await?;
        self.write_file("ja4x.csv", &ja4x_header(cfg.delimiter), &ja4x, cfg.delimiter).await?;
        self.write_file("ja4ts.csv", &ja4ts_header(cfg.delimiter), &ja4ts, cfg.delimiter).await?;

        if join {
            let joined = super::join::outer_join(
                &tls,
                &ja4x,
                &ja4ts,
                tls_width(cfg),
                ja4x_width(),
                ja4ts_width(),
            );
            self.write_file("joined.csv", &join_header(cfg), &joined, cfg.delimiter).await?;
        }

        info!(
            "wrote {} tls, {} ja4x, {} ja4ts rows to {}",
            tls.len(),
            ja4x.len(),
            ja4ts.len(),
            self.out.display()
        );
        Ok(EmitSummary {
            tls_rows: tls.len(),
            ja4x_rows: ja4x.len(),
            ja4ts_rows: ja4ts.len(),
        })
    }

    async fn write_file(
        &self,
        name: &str,
        header: &str,
        rows: &[Row],
        delimiter: char,
    ) -> Result<()> {
        let mut content = String::with_capacity(rows.len() * 128 + header.len() + 1);
        content.push_str(header);
        content.push('\n');
        for row in rows {
            content.push_str(&row.render(delimiter));
            content.push('\n');
        }
        tokio::fs::write(self.out.join(name), content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::cache::{ClientFields, ServerFields};

    fn cfg() -> EmitConfig {
        EmitConfig { delimiter: ';', short: false, filename: "capture01".into() }
    }

    fn entry_with_both_sides() -> FlowEntry {
        FlowEntry {
            src: "10.0.0.1".into(),
            dst: "93.184.216.34".into(),
            src_port: "51234".into(),
            dst_port: "443".into(),
            client: Some(ClientFields {
                proto: "6".into(),
                sni: "example.com".into(),
                version_dec: 771,
                ja3: "a".repeat(32),
                ja4: "t13d020300_b_c".into(),
                ..Default::default()
            }),
            server: Some(ServerFields {
                version_dec: 772,
                ja3s: "f".repeat(32),
                ja4s: "t1300h2_1301_x".into(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn full_row_has_every_column() {
        let cfg = cfg();
        let row = tls_row(&entry_with_both_sides(), &cfg).unwrap();
        assert_eq!(row.cols.len(), tls_width(&cfg));
        let rendered = row.render(';');
        assert_eq!(rendered.matches(';').count(), 4 + tls_width(&cfg) - 1);
        assert!(rendered.starts_with("10.0.0.1;93.184.216.34;51234;443;6;example.com"));
        assert!(rendered.ends_with("capture01;772"));
    }

    #[test]
    fn half_open_flow_leaves_server_columns_empty() {
        let mut entry = entry_with_both_sides();
        entry.server = None;
        let row = tls_row(&entry, &cfg()).unwrap();
        // ServerCipherSuite..JA4S_raw and Version are empty
        assert_eq!(row.cols[16], "");
        assert_eq!(row.cols[21], "");
        assert_eq!(*row.cols.last().unwrap(), "");
    }

    #[test]
    fn short_mode_uses_reduced_columns() {
        let cfg = EmitConfig { short: true, ..cfg() };
        let row = tls_row(&entry_with_both_sides(), &cfg).unwrap();
        assert_eq!(row.cols.len(), TLS_COLUMNS_SHORT.len());
        assert_eq!(row.cols[0], "example.com");
    }

    #[test]
    fn no_client_hello_means_no_tls_row() {
        let mut entry = entry_with_both_sides();
        entry.client = None;
        assert!(tls_row(&entry, &cfg()).is_none());
    }

    #[test]
    fn ja4x_row_joins_the_chain() {
        let mut entry = entry_with_both_sides();
        entry.ja4x = vec!["aaa_bbb_ccc".into(), "ddd_eee_fff".into()];
        entry.issuers = vec!["CN=leaf-ca.example".into()];
        let row = ja4x_row(&entry).unwrap();
        assert_eq!(row.cols[0], "aaa_bbb_ccc, ddd_eee_fff");
        assert_eq!(row.cols[1], "CN=leaf-ca.example");

        entry.ja4x.clear();
        assert!(ja4x_row(&entry).is_none());
    }

    #[test]
    fn headers_match_row_widths() {
        let cfg = cfg();
        assert_eq!(
            tls_header(&cfg).matches(';').count() + 1,
            4 + tls_width(&cfg)
        );
        assert_eq!(ja4x_header(';').matches(';').count() + 1, 4 + ja4x_width());
        assert_eq!(ja4ts_header(';').matches(';').count() + 1, 4 + ja4ts_width());
    }
}
