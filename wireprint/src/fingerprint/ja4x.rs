// wireprint/src/fingerprint/ja4x.rs
//
// JA4X — per-certificate issuer/subject/extension fingerprints from the
// decoded X.509 side channels. The decoder flattens the whole chain into
// shared pools (RDN OIDs, extension OIDs, printable strings); each
// certificate owns a length-prefixed slice of each pool, consumed
// left-to-right in chain order. The pools are held behind cursors over
// immutable slices so the consumption order stays visible and testable.
//
// Per certificate: {issuer_hash}_{subject_hash}_{extension_hash}, each
// SHA-256 over the comma-joined DER-hex OID list, truncated to 12 chars.

use tracing::{debug, warn};

use crate::error::FingerprintError;
use crate::fingerprint::ja4::sha256_12;
use crate::records::X509Fields;

// Administrative RDN attributes, not fingerprint-relevant: countryName and
// organizationalUnitName. Removed before hashing and CN/ON extraction.
const OID_COUNTRY_NAME: &str = "550406";
const OID_ORG_UNIT_NAME: &str = "55040b";

const OID_ORG_NAME: &str = "55040a";
const OID_COMMON_NAME: &str = "550403";

/// Everything JA4X produces for one certificate message: one fingerprint
/// per chain certificate, plus the textual issuer/subject annotations that
/// could be resolved.
#[derive(Debug, Default)]
pub struct ChainFingerprints {
    pub ja4x: Vec<String>,
    pub issuers: Vec<String>,
    pub subjects: Vec<String>,
}

/// Cursor over an immutable pool, consumed left-to-right.
struct Cursor<'a> {
    items: &'a [String],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(items: &'a [String]) -> Self {
        Self { items, pos: 0 }
    }

    /// Advance by `n`, returning the consumed slice. Returns what remains
    /// when the pool is shorter than requested (truncated chain decode).
    fn take(&mut self, n: usize) -> &'a [String] {
        let end = (self.pos + n).min(self.items.len());
        let out = &self.items[self.pos..end];
        self.pos = end;
        out
    }

    fn next(&mut self) -> Option<&'a String> {
        let out = self.items.get(self.pos);
        if out.is_some() {
            self.pos += 1;
        }
        out
    }
}

/// Decode one certificate message into its chain of JA4X fingerprints.
pub fn decode_chain(x: &X509Fields) -> ChainFingerprints {
    let mut out = ChainFingerprints::default();
    if x.extension_lengths.is_empty() {
        return out;
    }

    // One issuer/subject RDN sequence per certificate, drawn from the
    // shared OID pool in chain order.
    let mut rdn_pool = Cursor::new(&x.rdn_oids);
    let mut issuer_oids: Vec<Vec<String>> = Vec::new();
    let mut subject_oids: Vec<Vec<String>> = Vec::new();

    for (issuer_len, subject_len) in x.issuer_sequence.iter().zip(&x.subject_sequence) {
        let issuer_len = issuer_len.trim().parse().unwrap_or(0);
        let subject_len = subject_len.trim().parse().unwrap_or(0);
        issuer_oids.push(encode_rdn_slice(rdn_pool.take(issuer_len)));
        subject_oids.push(encode_rdn_slice(rdn_pool.take(subject_len)));
    }

    // Administrative OIDs carry no fingerprint signal; drop them before
    // hashing and before walking the printable-string pool.
    for seq in issuer_oids.iter_mut().chain(subject_oids.iter_mut()) {
        seq.retain(|oid| oid != OID_COUNTRY_NAME && oid != OID_ORG_UNIT_NAME);
    }

    let issuer_hashes: Vec<String> = issuer_oids.iter().map(|s| sha256_12(&s.join(","))).collect();
    let subject_hashes: Vec<String> = subject_oids.iter().map(|s| sha256_12(&s.join(","))).collect();

    // Textual CN/ON annotations from the shared printable-string pool.
    // NoIdentityFound is non-fatal: the annotation is omitted, hashing
    // has already happened.
    let mut printables = Cursor::new(&x.printable_strings);
    for (issuer, subject) in issuer_oids.iter().zip(&subject_oids) {
        match resolve_identity(issuer, &mut printables) {
            Ok(name) => out.issuers.push(name),
            Err(e) => debug!("issuer annotation skipped: {e}"),
        }
        match resolve_identity(subject, &mut printables) {
            Ok(name) => out.subjects.push(name),
            Err(e) => debug!("subject annotation skipped: {e}"),
        }
    }

    // One JA4X string per certificate, extension OIDs drawn from the shared
    // extension pool in chain order.
    let mut ext_pool = Cursor::new(&x.cert_extensions);
    for (idx, len) in x.extension_lengths.iter().enumerate() {
        if idx >= issuer_hashes.len() || idx >= subject_hashes.len() {
            warn!("certificate {idx} has extensions but no RDN sequences; skipped");
            continue;
        }
        let len = len.trim().parse().unwrap_or(0);
        let ext_hex: Vec<String> = ext_pool
            .take(len)
            .iter()
            .filter_map(|oid| match oid_to_hex(oid) {
                Ok(hex) => Some(hex),
                Err(e) => {
                    warn!("extension OID dropped: {e}");
                    None
                }
            })
            .collect();

        out.ja4x.push(format!(
            "{}_{}_{}",
            issuer_hashes[idx],
            subject_hashes[idx],
            sha256_12(&ext_hex.join(","))
        ));
    }

    out
}

fn encode_rdn_slice(oids: &[String]) -> Vec<String> {
    oids.iter()
        .filter_map(|oid| match oid_to_hex(oid) {
            Ok(hex) => Some(hex),
            Err(e) => {
                warn!("RDN OID dropped: {e}");
                None
            }
        })
        .collect()
}

/// Walk one RDN OID sequence against the printable-string pool, consuming
/// one string per attribute, and pick out commonName / organizationName.
fn resolve_identity(
    oid_seq: &[String],
    printables: &mut Cursor<'_>,
) -> Result<String, FingerprintError> {
    let mut cn = None;
    let mut on = None;
    for oid in oid_seq {
        let value = printables.next();
        match oid.as_str() {
            OID_ORG_NAME => on = value,
            OID_COMMON_NAME => cn = value,
            _ => {}
        }
    }
    match (cn, on) {
        (Some(cn), Some(on)) => Ok(format!("CN={cn}, ON={on}")),
        (Some(cn), None) => Ok(format!("CN={cn}")),
        (None, Some(on)) => Ok(format!("ON={on}")),
        (None, None) => Err(FingerprintError::NoIdentityFound),
    }
}

/// Dotted OID → DER content-octet hex. The first two components merge into
/// one octet (x*40 + y); the rest are base-128 varints, high bit set on all
/// but the last octet. The 2-byte tag/length prefix is not part of the
/// fingerprint and is never emitted.
pub fn oid_to_hex(oid: &str) -> Result<String, FingerprintError> {
    let components: Vec<u64> = oid
        .trim()
        .split('.')
        .map(|c| c.parse().map_err(|_| FingerprintError::CorruptOid(oid.to_string())))
        .collect::<Result<_, _>>()?;
    if components.len() < 2 {
        return Err(FingerprintError::CorruptOid(oid.to_string()));
    }

    let mut bytes = vec![(components[0] * 40 + components[1]) as u8];
    for &component in &components[2..] {
        bytes.extend(encode_base128(component));
    }
    Ok(hex::encode(bytes))
}

fn encode_base128(mut value: u64) -> Vec<u8> {
    let mut out = vec![(value & 0x7f) as u8];
    value >>= 7;
    while value > 0 {
        out.insert(0, (value & 0x7f) as u8 | 0x80);
        value >>= 7;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oid_encoding_known_values() {
        // commonName
        assert_eq!(oid_to_hex("2.5.4.3").unwrap(), "550403");
        // sha256WithRSAEncryption — exercises the multi-octet varint path
        assert_eq!(oid_to_hex("1.2.840.113549.1.1.11").unwrap(), "2a864886f70d01010b");
        // authorityInfoAccess
        assert_eq!(oid_to_hex("1.3.6.1.5.5.7.1.1").unwrap(), "2b06010505070101");
    }

    #[test]
    fn corrupt_oid_is_reported_not_panicked() {
        assert_eq!(
            oid_to_hex("2"),
            Err(FingerprintError::CorruptOid("2".into()))
        );
        assert!(oid_to_hex("2.5.bogus").is_err());
    }

    fn two_cert_chain() -> X509Fields {
        X509Fields {
            issuer_sequence: vec!["3".into(), "2".into()],
            subject_sequence: vec!["3".into(), "2".into()],
            rdn_oids: vec![
                // cert 1 issuer: C, O, CN
                "2.5.4.6".into(), "2.5.4.10".into(), "2.5.4.3".into(),
                // cert 1 subject: C, O, CN
                "2.5.4.6".into(), "2.5.4.10".into(), "2.5.4.3".into(),
                // cert 2 issuer: O, CN
                "2.5.4.10".into(), "2.5.4.3".into(),
                // cert 2 subject: O, CN
                "2.5.4.10".into(), "2.5.4.3".into(),
            ],
            extension_lengths: vec!["2".into(), "1".into()],
            cert_extensions: vec![
                "2.5.29.15".into(), "2.5.29.19".into(), // cert 1
                "2.5.29.15".into(),                      // cert 2
            ],
            printable_strings: vec![
                // two strings per sequence: O then CN (countryName is not
                // a printable-string attribute in this decoder contract)
                "Leaf CA".into(), "leaf-ca.example".into(),
                "Example Org".into(), "www.example.com".into(),
                "Root CA".into(), "root-ca.example".into(),
                "Example Org".into(), "leaf-ca.example".into(),
            ],
        }
    }

    #[test]
    fn one_ja4x_per_certificate() {
        let chain = decode_chain(&two_cert_chain());
        assert_eq!(chain.ja4x.len(), 2);
        for fp in &chain.ja4x {
            let parts: Vec<&str> = fp.split('_').collect();
            assert_eq!(parts.len(), 3);
            for p in parts {
                assert_eq!(p.len(), 12);
            }
        }
    }

    #[test]
    fn administrative_oids_do_not_reach_the_hash() {
        let with_admin = decode_chain(&two_cert_chain());

        // same chain but without the countryName attributes at all
        let mut stripped = two_cert_chain();
        stripped.issuer_sequence = vec!["2".into(), "2".into()];
        stripped.subject_sequence = vec!["2".into(), "2".into()];
        stripped.rdn_oids = vec![
            "2.5.4.10".into(), "2.5.4.3".into(),
            "2.5.4.10".into(), "2.5.4.3".into(),
            "2.5.4.10".into(), "2.5.4.3".into(),
            "2.5.4.10".into(), "2.5.4.3".into(),
        ];
        let without_admin = decode_chain(&stripped);

        assert_eq!(with_admin.ja4x, without_admin.ja4x);
    }

    #[test]
    fn identity_annotations_resolved_in_chain_order() {
        let chain = decode_chain(&two_cert_chain());
        assert_eq!(chain.issuers[0], "CN=leaf-ca.example, ON=Leaf CA");
        assert_eq!(chain.subjects[0], "CN=www.example.com, ON=Example Org");
        assert_eq!(chain.issuers[1], "CN=root-ca.example, ON=Root CA");
    }

    #[test]
    fn missing_identity_is_nonfatal() {
        let mut x = two_cert_chain();
        // issuer of cert 1 carries neither CN nor ON
        x.rdn_oids[1] = "2.5.4.7".into(); // localityName
        x.rdn_oids[2] = "2.5.4.8".into(); // stateOrProvinceName
        let chain = decode_chain(&x);
        // hashing still produced a fingerprint per certificate
        assert_eq!(chain.ja4x.len(), 2);
        // and the missing annotation was simply omitted
        assert_eq!(chain.issuers.len(), 1);
        assert_eq!(chain.issuers[0], "CN=root-ca.example, ON=Root CA");
    }

    #[test]
    fn empty_message_produces_nothing() {
        let chain = decode_chain(&X509Fields::default());
        assert!(chain.ja4x.is_empty());
    }
}
