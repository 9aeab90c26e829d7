// wireprint/src/fingerprint/canon.rs
//
// Field canonicalization — pure transforms from raw decoded field strings
// to the normalized tokens the fingerprint formulas hash. Every function
// here is side-effect free; GREASE filtering is token-wise, so no doubled
// or dangling separator can survive it.

/// The 16 reserved GREASE values (RFC 8701), hex form as the decoder prints
/// cipher suites and supported versions.
pub const GREASE_HEX: [&str; 16] = [
    "0x0a0a", "0x1a1a", "0x2a2a", "0x3a3a", "0x4a4a", "0x5a5a", "0x6a6a", "0x7a7a",
    "0x8a8a", "0x9a9a", "0xaaaa", "0xbaba", "0xcaca", "0xdada", "0xeaea", "0xfafa",
];

/// Same values in decimal, as they appear in extension and converted lists.
pub const GREASE_DEC: [&str; 16] = [
    "2570", "6682", "10794", "14906", "19018", "23130", "27242", "31354",
    "35466", "39578", "43690", "47802", "51914", "56026", "60138", "64250",
];

pub fn is_grease_hex(token: &str) -> bool {
    GREASE_HEX.contains(&token.trim().to_ascii_lowercase().as_str())
}

pub fn is_grease_dec(token: &str) -> bool {
    GREASE_DEC.contains(&token.trim())
}

/// Drop GREASE and empty tokens from a comma-joined hex list.
pub fn strip_grease_hex(list: &str) -> String {
    list.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty() && !is_grease_hex(t))
        .collect::<Vec<_>>()
        .join(",")
}

/// Drop GREASE and empty tokens from a hyphen-joined decimal list.
pub fn strip_grease_dec(list: &str) -> String {
    list.split('-')
        .map(str::trim)
        .filter(|t| !t.is_empty() && !is_grease_dec(t))
        .collect::<Vec<_>>()
        .join("-")
}

/// Comma-joined hex list → hyphen-joined decimal list (JA3 form).
/// Unparseable tokens are dropped rather than aborting the record.
pub fn hex_list_to_dec(list: &str) -> String {
    list.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .filter_map(parse_u32_token)
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("-")
}

/// Comma-joined decimal extension list → hyphen-joined (JA3 form),
/// GREASE-filtered, wire order preserved.
pub fn extensions_dec(list: &str) -> String {
    strip_grease_dec(&list.replace(',', "-"))
}

/// JA4 cipher-suite string: GREASE-filtered, sorted lexicographically as
/// hex strings, "0x" prefixes stripped.
pub fn ciphers_sorted_hex(list: &str) -> String {
    let mut suites: Vec<String> = strip_grease_hex(list)
        .split(',')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
        .collect();
    suites.sort();
    suites.join(",").replace("0x", "")
}

/// Count of comma-separated tokens, two-digit zero-padded, capped at 99.
pub fn count2(list: &str) -> String {
    let n = list.split(',').filter(|t| !t.trim().is_empty()).count().min(99);
    format!("{n:02}")
}

/// Extension tokens for the JA4 extension string and count.
///
/// Client Hello: non-numeric tokens dropped, remainder sorted ascending by
/// value. Server Hello: wire order preserved, tokens parsed as-is.
pub fn extension_values(ext_dashed: &str, client_hello: bool) -> Vec<u32> {
    let mut values: Vec<u32> = ext_dashed
        .split('-')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .filter_map(|t| t.parse().ok())
        .collect();
    if client_hello {
        values.sort_unstable();
    }
    values
}

/// The JA4 extension string: 4-hex-digit tokens, comma-joined, with SNI (0)
/// and ALPN (16) excluded. The extension COUNT is taken before this
/// exclusion — use `extension_values().len()` for it.
pub fn format_ja4_extensions(values: &[u32]) -> String {
    values
        .iter()
        .filter(|&&v| v != 0x0000 && v != 0x0010)
        .map(|v| format!("{v:04x}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// JA4 version label. Prefers the highest value of the GREASE-filtered
/// supported_versions list (string-sorted, last element); falls back to the
/// handshake version formatted as "0x%04x".
pub fn version_label(supported_versions: &str, handshake_version: u32) -> &'static str {
    let filtered = strip_grease_hex(supported_versions);
    let chosen = if filtered.is_empty() {
        format!("0x{handshake_version:04x}")
    } else {
        let mut versions: Vec<&str> = filtered.split(',').collect();
        versions.sort_unstable();
        versions.last().unwrap().to_string()
    };
    map_version(&chosen)
}

fn map_version(version: &str) -> &'static str {
    match version {
        "256" => "s1",
        "512" => "s2",
        "0x0300" => "s3",
        "0x0301" => "10",
        "0x0302" => "11",
        "0x0303" => "12",
        "0x0304" => "13",
        _ => "00",
    }
}

/// Two-character ALPN code: "00" when absent; else the first comma-separated
/// value, collapsed to its first and last character when longer than two.
pub fn alpn_code(alpn: &str) -> String {
    let first = alpn.split(',').next().unwrap_or("").trim();
    if first.is_empty() {
        return "00".to_string();
    }
    let chars: Vec<char> = first.chars().collect();
    if chars.len() > 2 {
        format!("{}{}", chars[0], chars[chars.len() - 1])
    } else {
        first.to_string()
    }
}

/// 'd' when an SNI value is present (domain), 'i' otherwise (bare IP).
pub fn sni_flag(sni: &str) -> char {
    if sni.is_empty() {
        'i'
    } else {
        'd'
    }
}

/// Supported-groups list for JA3: hex → decimal, hyphen-joined, literal "0"
/// when empty, GREASE-filtered.
pub fn groups_dec(supported_groups: &str) -> String {
    let dec = hex_list_to_dec(supported_groups);
    if dec.is_empty() {
        return "0".to_string();
    }
    strip_grease_dec(&dec)
}

/// Signature-algorithm list for JA4: "0x" prefixes stripped, commas and
/// wire order kept.
pub fn strip_hex_prefix(list: &str) -> String {
    list.replace("0x", "")
}

/// Handshake version field ("0x0303") → decimal value for JA3.
pub fn parse_version(version: &str) -> u32 {
    parse_u32_token(version.trim()).unwrap_or(0)
}

fn parse_u32_token(token: &str) -> Option<u32> {
    if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        u32::from_str_radix(token, 16).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_sixteen_grease_values_filtered_from_hex_list() {
        let list = GREASE_HEX.join(",") + ",0x1301";
        let out = strip_grease_hex(&list);
        assert_eq!(out, "0x1301");
        for g in GREASE_HEX {
            assert!(!out.contains(g));
        }
    }

    #[test]
    fn grease_filter_leaves_no_dangling_separator() {
        assert_eq!(strip_grease_hex("0x0a0a,0x1301,0xfafa,0x1302"), "0x1301,0x1302");
        assert_eq!(strip_grease_dec("2570-10-64250-43"), "10-43");
        assert_eq!(strip_grease_hex("0x0a0a"), "");
        assert!(!strip_grease_dec("2570-10-2570").contains("--"));
    }

    #[test]
    fn ja3_cipher_conversion_keeps_wire_order() {
        assert_eq!(hex_list_to_dec("0x1302,0x1301"), "4866-4865");
    }

    #[test]
    fn ja4_ciphers_sorted_as_hex_strings() {
        let out = ciphers_sorted_hex("0x1302,0x0a0a,0x1301,0xc02b");
        assert_eq!(out, "1301,1302,c02b");
        assert!(!out.contains("0a0a"));
    }

    #[test]
    fn client_hello_extension_order_is_canonical() {
        let a = extension_values("43-10-0", true);
        let b = extension_values("0-43-10", true);
        assert_eq!(a, b);
        assert_eq!(a, vec![0, 10, 43]);
    }

    #[test]
    fn server_hello_extension_order_is_preserved() {
        let a = extension_values("43-51", false);
        let b = extension_values("51-43", false);
        assert_ne!(a, b);
        assert_eq!(a, vec![43, 51]);
    }

    #[test]
    fn ja4_extension_string_excludes_sni_and_alpn_but_count_does_not() {
        let values = extension_values("0-10-16-43", true);
        assert_eq!(values.len(), 4); // count keeps 0 and 16
        assert_eq!(format_ja4_extensions(&values), "000a,002b");
    }

    #[test]
    fn non_numeric_extension_tokens_are_dropped() {
        assert_eq!(extension_values("10-junk--43", true), vec![10, 43]);
    }

    #[test]
    fn version_prefers_highest_supported_version() {
        assert_eq!(version_label("0x0303,0x0304", 0x0303), "13");
        assert_eq!(version_label("0x0a0a,0x0303", 0x0304), "12");
    }

    #[test]
    fn version_falls_back_to_handshake_version() {
        assert_eq!(version_label("", 0x0303), "12");
        assert_eq!(version_label("", 0x0300), "s3");
        assert_eq!(version_label("", 0x9999), "00");
    }

    #[test]
    fn alpn_codes() {
        assert_eq!(alpn_code(""), "00");
        assert_eq!(alpn_code("h2,http/1.1"), "h2");
        assert_eq!(alpn_code("http/1.1"), "h1");
    }

    #[test]
    fn sni_flag_domain_or_ip() {
        assert_eq!(sni_flag("example.com"), 'd');
        assert_eq!(sni_flag(""), 'i');
    }

    #[test]
    fn counts_are_zero_padded() {
        assert_eq!(count2("0x1301,0x1302"), "02");
        assert_eq!(count2(""), "00");
    }

    #[test]
    fn empty_groups_become_zero() {
        assert_eq!(groups_dec(""), "0");
        assert_eq!(groups_dec("0x001d,0x0017"), "29-23");
    }
}
