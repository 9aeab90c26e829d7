// wireprint/src/records.rs
//
// Typed model of one decoded packet record from the external capture decoder.
// One NDJSON object per handshake-bearing packet, one optional struct per
// protocol layer. Absent layers and absent fields are None — the decoder
// omits what it did not see, it never emits nulls.
//
// Every value stays a string end-to-end: the decoder produces field text
// (hex lists, comma-joined lists, decimal numbers) and the canonicalizer
// owns all conversions, so a malformed field degrades one fingerprint
// instead of poisoning deserialization of the whole record.

use serde::{Deserialize, Deserializer};

// ── TCP flag bits ─────────────────────────────────────────────────────────────

pub const TCP_FIN: u32 = 0x0001;
pub const TCP_SYN: u32 = 0x0002;
pub const TCP_ACK: u32 = 0x0010;

// ── Layer dispatch ────────────────────────────────────────────────────────────

/// Highest fingerprint-relevant layer of a record. Certificate payloads win
/// over the TLS layer that carries them; transport layers come last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    X509,
    Tls,
    Http,
    Ssh,
    Quic,
    Tcp,
    Udp,
}

// ── Per-layer field structs ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrameFields {
    /// Colon-joined protocol stack, e.g. "eth:ethertype:ip:tcp:tls".
    pub protocols: Option<String>,
    /// Capture timestamp, seconds since epoch with fractional part.
    pub time_epoch: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IpFields {
    pub src: Option<String>,
    pub dst: Option<String>,
    pub ttl: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TcpFields {
    /// Flag word as the decoder prints it ("0x0012" or decimal).
    pub flags: Option<String>,
    pub seq: Option<String>,
    pub ack: Option<String>,
    pub stream: Option<String>,
    pub srcport: Option<String>,
    pub dstport: Option<String>,
    /// Window size value from the SYN-ACK, for JA4TS.
    pub window: Option<String>,
    /// Raw option bytes as a hex string, for JA4TS.
    pub options: Option<String>,
    /// Decoder-extracted MSS / window-scale, fallbacks for JA4TS.
    pub mss: Option<String>,
    pub wscale: Option<String>,
}

impl TcpFields {
    /// Flag word as bits. Accepts "0x…" hex or plain decimal.
    pub fn flag_bits(&self) -> Option<u32> {
        let raw = self.flags.as_deref()?.trim();
        if let Some(hex) = raw.strip_prefix("0x") {
            u32::from_str_radix(hex, 16).ok()
        } else {
            raw.parse().ok()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UdpFields {
    pub stream: Option<String>,
    pub srcport: Option<String>,
    pub dstport: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuicFields {
    /// Long-header packet type ("0" initial, "2" short/1-RTT marker).
    pub packet_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsFields {
    /// Handshake type; Server Hello packets may carry "2,11,…" — only the
    /// first value is authoritative.
    #[serde(rename = "type")]
    pub handshake_type: Option<String>,
    /// Handshake version, e.g. "0x0303".
    pub version: Option<String>,
    /// Comma-joined hex cipher-suite list, e.g. "0x1301,0x1302".
    pub ciphers: Option<String>,
    /// Comma-joined decimal extension-type list, e.g. "0,10,43".
    pub extensions: Option<String>,
    pub sni: Option<String>,
    pub supported_groups: Option<String>,
    pub ec_formats: Option<String>,
    pub alpn: Option<String>,
    pub sig_algs: Option<String>,
    pub supported_versions: Option<String>,
}

impl TlsFields {
    /// First token of the handshake-type list.
    pub fn first_type(&self) -> Option<&str> {
        self.handshake_type
            .as_deref()
            .and_then(|t| t.split(',').next())
            .map(str::trim)
    }
}

/// Certificate-chain side channels. The RDN OID pool and the extension OID
/// pool are shared across the whole chain and consumed left-to-right; the
/// per-certificate lengths say how much each certificate owns.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct X509Fields {
    #[serde(default, deserialize_with = "one_or_many")]
    pub issuer_sequence: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub subject_sequence: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub rdn_oids: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub extension_lengths: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub cert_extensions: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub printable_strings: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpFields {
    pub stream: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SshFields {
    pub protocol: Option<String>,
}

// ── The record ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecodedRecord {
    #[serde(default)]
    pub frame: FrameFields,
    pub ip: Option<IpFields>,
    pub tcp: Option<TcpFields>,
    pub udp: Option<UdpFields>,
    pub quic: Option<QuicFields>,
    pub tls: Option<TlsFields>,
    pub x509: Option<X509Fields>,
    pub http: Option<HttpFields>,
    pub ssh: Option<SshFields>,
}

impl DecodedRecord {
    /// Which layer drives processing of this record.
    pub fn layer(&self) -> Option<LayerKind> {
        if self.x509.is_some() {
            Some(LayerKind::X509)
        } else if self.tls.is_some() {
            Some(LayerKind::Tls)
        } else if self.http.is_some() {
            Some(LayerKind::Http)
        } else if self.ssh.is_some() {
            Some(LayerKind::Ssh)
        } else if self.quic.is_some() {
            Some(LayerKind::Quic)
        } else if self.tcp.is_some() {
            Some(LayerKind::Tcp)
        } else if self.udp.is_some() {
            Some(LayerKind::Udp)
        } else {
            None
        }
    }

    pub fn is_quic(&self) -> bool {
        self.quic.is_some()
            || self
                .frame
                .protocols
                .as_deref()
                .map(|p| p.contains("quic"))
                .unwrap_or(false)
    }

    pub fn protocols(&self) -> &str {
        self.frame.protocols.as_deref().unwrap_or("")
    }

    pub fn timestamp(&self) -> Option<f64> {
        self.frame.time_epoch.as_deref()?.trim().parse().ok()
    }

    pub fn src(&self) -> Option<&str> {
        self.ip.as_ref()?.src.as_deref()
    }

    pub fn dst(&self) -> Option<&str> {
        self.ip.as_ref()?.dst.as_deref()
    }

    pub fn ttl(&self) -> Option<&str> {
        self.ip.as_ref()?.ttl.as_deref()
    }

    /// Transport ports, TCP first.
    pub fn ports(&self) -> Option<(&str, &str)> {
        if let Some(tcp) = &self.tcp {
            return Some((tcp.srcport.as_deref()?, tcp.dstport.as_deref()?));
        }
        let udp = self.udp.as_ref()?;
        Some((udp.srcport.as_deref()?, udp.dstport.as_deref()?))
    }

    /// Transport protocol number as the output expects it: "6" TCP, "17" UDP.
    pub fn proto_number(&self) -> &'static str {
        if self.tcp.is_some() {
            "6"
        } else {
            "17"
        }
    }

    /// Stream id of the multiplexed layer, when present.
    pub fn http_stream(&self) -> Option<u64> {
        self.http
            .as_ref()?
            .stream
            .as_deref()
            .or_else(|| self.tcp.as_ref()?.stream.as_deref())
            .and_then(|s| s.trim().parse().ok())
    }
}

// ── One-or-many deserializer ──────────────────────────────────────────────────
// The decoder emits repeated fields as a JSON list, but collapses a single
// occurrence to a bare string.

fn one_or_many<'de, D>(de: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(de)? {
        None => Vec::new(),
        Some(OneOrMany::One(v)) => vec![v],
        Some(OneOrMany::Many(v)) => v,
    })
}
