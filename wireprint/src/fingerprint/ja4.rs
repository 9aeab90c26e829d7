// wireprint/src/fingerprint/ja4.rs
//
// JA4 / JA4S — three `_`-joined segments. Segment A is positional metadata,
// segments B and C are SHA-256 digests truncated to 12 hex characters. A
// parallel raw form carries the unhashed strings for analysis output; it is
// never used for matching.
//
// JA4  A: {t|q}{version}{d|i}{cipher_count:02}{ext_count:02}{alpn}
// JA4S A: {t|q}{version}{ext_count:02}{alpn}           (no SNI, no count)
// JA4S B is the single negotiated cipher suite, unhashed.

use sha2::{Digest, Sha256};

/// Canonicalized Client Hello fields, ready for segment assembly.
pub struct Ja4Input<'a> {
    pub transport: char, // 't' TCP, 'q' QUIC-over-UDP
    pub version: &'a str,
    pub sni: char, // 'd' | 'i'
    pub ciphers_sorted: &'a str,
    pub cipher_count: &'a str,
    pub ext_string: &'a str,
    pub ext_count: &'a str,
    pub alpn: &'a str,
    pub sig_algs: &'a str,
}

/// Canonicalized Server Hello fields.
pub struct Ja4sInput<'a> {
    pub transport: char,
    pub version: &'a str,
    pub cipher: &'a str, // negotiated suite, hex, unhashed
    pub ext_string: &'a str,
    pub ext_count: &'a str,
    pub alpn: &'a str,
}

pub struct Fingerprint {
    pub hash: String,
    pub raw: String,
}

pub fn ja4(input: &Ja4Input) -> Fingerprint {
    let a = format!(
        "{}{}{}{}{}{}",
        input.transport, input.version, input.sni, input.cipher_count, input.ext_count, input.alpn
    );
    let b = sha256_12(input.ciphers_sorted);
    let c = sha256_12(&format!("{}_{}", input.ext_string, input.sig_algs));

    Fingerprint {
        hash: format!("{a}_{b}_{c}"),
        raw: format!(
            "{a}_{}_{}_{}",
            input.ciphers_sorted, input.ext_string, input.sig_algs
        ),
    }
}

pub fn ja4s(input: &Ja4sInput) -> Fingerprint {
    let a = format!(
        "{}{}{}{}",
        input.transport, input.version, input.ext_count, input.alpn
    );
    let b = input.cipher;
    let c = sha256_12(input.ext_string);

    Fingerprint {
        hash: format!("{a}_{b}_{c}"),
        raw: format!("{a}_{b}_{}", input.ext_string),
    }
}

/// SHA-256, lowercase hex, truncated to 12 characters.
pub fn sha256_12(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let mut out = hex::encode(hasher.finalize());
    out.truncate(12);
    out
}
