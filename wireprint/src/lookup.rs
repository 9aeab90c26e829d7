// wireprint/src/lookup.rs
//
// Auxiliary key→value tables: ad-server SNI list, WHOIS (dst IP → org
// name), port-to-application resolution. All optional; a missing or
// unreadable file degrades to an empty table with a warning, never a
// hard failure.
//
// File formats:
//   ad-list     one SNI per line
//   whois       "ip;org" per line
//   resolution  "port,app" per line

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct Lookups {
    ad_servers: HashSet<String>,
    whois: HashMap<String, String>,
    resolution: HashMap<String, String>,
}

impl Lookups {
    pub fn load(
        adlist: Option<&Path>,
        whois: Option<&Path>,
        resolution: Option<&Path>,
    ) -> Self {
        let mut lookups = Lookups::default();

        if let Some(path) = adlist {
            for line in read_lines(path) {
                lookups.ad_servers.insert(line);
            }
            info!("ad-list: {} entries", lookups.ad_servers.len());
        }
        if let Some(path) = whois {
            for line in read_lines(path) {
                if let Some((ip, org)) = line.split_once(';') {
                    lookups.whois.insert(ip.to_string(), org.to_string());
                }
            }
            info!("whois: {} entries", lookups.whois.len());
        }
        if let Some(path) = resolution {
            for line in read_lines(path) {
                if let Some((port, app)) = line.split_once(',') {
                    lookups.resolution.insert(port.to_string(), app.to_string());
                }
            }
            info!("resolution: {} entries", lookups.resolution.len());
        }

        lookups
    }

    /// Organization name for a destination IP, empty when unknown.
    pub fn org_for(&self, ip: &str) -> &str {
        self.whois.get(ip).map(String::as_str).unwrap_or("")
    }

    /// Application name mapped to a local port, if the resolution file
    /// knows it.
    pub fn app_for_port(&self, port: &str) -> Option<&str> {
        self.resolution.get(port).map(String::as_str)
    }

    /// Whether an SNI belongs to a known ad server.
    pub fn is_ad_server(&self, sni: &str) -> bool {
        self.ad_servers.contains(sni)
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        Err(e) => {
            warn!("{} not found, skipping ({e})", path.display());
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_degrade_to_empty_lookups() {
        let lookups = Lookups::load(
            Some(Path::new("/nonexistent/ads")),
            Some(Path::new("/nonexistent/whois")),
            None,
        );
        assert_eq!(lookups.org_for("1.2.3.4"), "");
        assert!(!lookups.is_ad_server("ads.example.com"));
        assert_eq!(lookups.app_for_port("443"), None);
    }

    #[test]
    fn tables_resolve_after_load() {
        let dir = std::env::temp_dir().join("wireprint_lookup_test");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("ads"), "ads.example.com\ntracker.example.net\n").unwrap();
        std::fs::write(dir.join("whois"), "93.184.216.34;EDGECAST\n").unwrap();
        std::fs::write(dir.join("res"), "8443,backup-agent\n").unwrap();

        let lookups = Lookups::load(
            Some(&dir.join("ads")),
            Some(&dir.join("whois")),
            Some(&dir.join("res")),
        );
        assert!(lookups.is_ad_server("tracker.example.net"));
        assert_eq!(lookups.org_for("93.184.216.34"), "EDGECAST");
        assert_eq!(lookups.app_for_port("8443"), Some("backup-agent"));
    }
}
