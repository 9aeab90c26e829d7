// wireprint/src/fingerprint/ja3.rs
//
// JA3 / JA3S — MD5 over the comma-joined canonical field string, full
// 32-hex-character digest. Field lists are decimal, hyphen-joined, GREASE
// already filtered, wire order preserved (JA3 never sorts).

/// JA3 (Client Hello):
/// md5("{version},{ciphers},{extensions},{supported_groups},{ec_formats}")
pub fn ja3(version: u32, ciphers_dec: &str, extensions_dec: &str, groups_dec: &str, ec_formats: &str) -> String {
    md5_hex(&format!(
        "{version},{ciphers_dec},{extensions_dec},{groups_dec},{ec_formats}"
    ))
}

/// JA3S (Server Hello): md5("{version},{cipher},{extensions}")
pub fn ja3s(version: u32, cipher_dec: &str, extensions_dec: &str) -> String {
    md5_hex(&format!("{version},{cipher_dec},{extensions_dec}"))
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ja3_digest_is_full_md5() {
        let hash = ja3(771, "4865-4866", "0-10-43", "29-23", "0");
        assert_eq!(hash.len(), 32);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        // stable for a fixed input
        assert_eq!(hash, ja3(771, "4865-4866", "0-10-43", "29-23", "0"));
    }

    #[test]
    fn ja3s_differs_from_ja3_for_same_fields() {
        let client = ja3(771, "4865", "43", "29", "0");
        let server = ja3s(771, "4865", "43");
        assert_ne!(client, server);
    }

    #[test]
    fn field_order_matters() {
        assert_ne!(
            ja3s(771, "4865", "43-51"),
            ja3s(771, "4865", "51-43")
        );
    }
}
