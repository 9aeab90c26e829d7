// wireprint/src/fingerprint/ja4ts.rs
//
// JA4TS — SYN-ACK TCP option walk. One byte of kind; EOL (0) and NOP (1)
// consume exactly one byte, every other kind reads a length byte and skips
// the whole option. Only the kind sequence survives into the fingerprint;
// MSS and window-scale values are pulled out on the way past.
//
// JA4TS = {window}-{kind-kind-…}-{mss}-{wscale}

use crate::error::FingerprintError;

const KIND_EOL: u8 = 0;
const KIND_NOP: u8 = 1;
const KIND_MSS: u8 = 2;
const KIND_WSCALE: u8 = 3;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct TcpOptions {
    /// Option kinds in wire order.
    pub kinds: Vec<u8>,
    pub mss: Option<u16>,
    pub wscale: Option<u8>,
    /// Set when a declared length ran past the end of the buffer; the kinds
    /// seen up to that point are kept.
    pub truncated: Option<FingerprintError>,
}

impl TcpOptions {
    pub fn kind_sequence(&self) -> String {
        self.kinds
            .iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join("-")
    }
}

/// Walk a raw hex option string. Never panics: malformed input terminates
/// the walk early with `truncated` set.
pub fn parse_options(hex_str: &str) -> TcpOptions {
    let mut out = TcpOptions::default();
    let hex_str = hex_str.trim();
    let mut i = 0;

    while i + 2 <= hex_str.len() {
        let Some(kind) = read_byte(hex_str, i) else {
            out.truncated = Some(FingerprintError::TruncatedOptions { kind: 0, offset: i / 2 });
            break;
        };
        out.kinds.push(kind);

        if kind == KIND_EOL || kind == KIND_NOP {
            i += 2;
            continue;
        }

        let Some(length) = read_byte(hex_str, i + 2) else {
            out.truncated = Some(FingerprintError::TruncatedOptions { kind, offset: i / 2 });
            break;
        };
        // length counts kind + length bytes; anything shorter overruns
        if length < 2 || i + length as usize * 2 > hex_str.len() {
            out.truncated = Some(FingerprintError::TruncatedOptions { kind, offset: i / 2 });
            break;
        }

        match (kind, length) {
            (KIND_MSS, 4) => {
                let hi = read_byte(hex_str, i + 4).unwrap_or(0) as u16;
                let lo = read_byte(hex_str, i + 6).unwrap_or(0) as u16;
                out.mss.get_or_insert(hi << 8 | lo);
            }
            (KIND_WSCALE, 3) => {
                let shift = read_byte(hex_str, i + 4).unwrap_or(0);
                out.wscale.get_or_insert(shift);
            }
            _ => {}
        }

        i += length as usize * 2;
    }

    out
}

/// Assemble the fingerprint string. Absent window/MSS/window-scale values
/// fall back to the decoder-supplied fields, then to "0".
pub fn ja4ts(window: &str, opts: &TcpOptions, mss_field: Option<&str>, wscale_field: Option<&str>) -> String {
    let window = if window.is_empty() { "0" } else { window };
    let mss = opts
        .mss
        .map(|v| v.to_string())
        .or_else(|| mss_field.map(str::to_string))
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "0".to_string());
    let wscale = opts
        .wscale
        .map(|v| v.to_string())
        .or_else(|| wscale_field.map(str::to_string))
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "0".to_string());

    format!("{window}-{}-{mss}-{wscale}", opts.kind_sequence())
}

fn read_byte(hex_str: &str, pos: usize) -> Option<u8> {
    u8::from_str_radix(hex_str.get(pos..pos + 2)?, 16).ok()
}
