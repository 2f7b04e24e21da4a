//! Disk-backed cookie jar.
//!
//! GolfBox sessions survive process restarts by persisting cookies to a JSON
//! file. Writes go through a temp file and rename so a crash mid-write never
//! leaves a corrupt jar; only the session owns the file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use cookie::Cookie;
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCookie {
    name: String,
    value: String,
    domain: String,
    path: String,
    secure: bool,
}

/// A minimal [`CookieStore`] that mirrors itself to disk.
#[derive(Debug)]
pub struct PersistentJar {
    path: PathBuf,
    // Keyed by (domain, name); later Set-Cookie headers replace earlier ones.
    cookies: Mutex<HashMap<(String, String), StoredCookie>>,
}

impl PersistentJar {
    /// Load the jar from `path`, starting empty when the file is missing or
    /// unreadable (a stale jar only costs one extra login).
    pub fn load_or_default(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cookies = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Vec<StoredCookie>>(&raw) {
                Ok(stored) => {
                    debug!(count = stored.len(), path = %path.display(), "loaded cookie jar");
                    stored
                        .into_iter()
                        .map(|c| ((c.domain.clone(), c.name.clone()), c))
                        .collect()
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cookie jar unreadable, starting fresh");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Self {
            path,
            cookies: Mutex::new(cookies),
        }
    }

    /// Write the jar to disk atomically (temp file + rename).
    pub fn persist(&self) -> Result<()> {
        let stored: Vec<StoredCookie> = {
            let cookies = self.cookies.lock().unwrap();
            cookies.values().cloned().collect()
        };

        let json = serde_json::to_string_pretty(&stored)?;
        write_atomic(&self.path, json.as_bytes())
            .with_context(|| format!("failed to persist cookie jar to {}", self.path.display()))
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.lock().unwrap().is_empty()
    }

    pub fn clear(&self) {
        self.cookies.lock().unwrap().clear();
    }

    fn matching_pairs(&self, url: &Url) -> Vec<(String, String)> {
        let host = url.host_str().unwrap_or_default();
        let request_path = url.path();
        let https = url.scheme() == "https";

        let cookies = self.cookies.lock().unwrap();
        let mut pairs: Vec<(String, String)> = cookies
            .values()
            .filter(|c| domain_matches(host, &c.domain))
            .filter(|c| request_path.starts_with(&c.path))
            .filter(|c| !c.secure || https)
            .map(|c| (c.name.clone(), c.value.clone()))
            .collect();
        pairs.sort();
        pairs
    }
}

impl CookieStore for PersistentJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let default_domain = url.host_str().unwrap_or_default().to_string();

        {
            let mut cookies = self.cookies.lock().unwrap();
            for header in cookie_headers {
                let Ok(raw) = header.to_str() else { continue };
                let Ok(parsed) = Cookie::parse(raw.to_string()) else {
                    continue;
                };

                let domain = parsed
                    .domain()
                    .map(|d| d.trim_start_matches('.').to_string())
                    .unwrap_or_else(|| default_domain.clone());
                let stored = StoredCookie {
                    name: parsed.name().to_string(),
                    value: parsed.value().to_string(),
                    path: parsed.path().unwrap_or("/").to_string(),
                    secure: parsed.secure().unwrap_or(false),
                    domain: domain.clone(),
                };
                cookies.insert((domain, stored.name.clone()), stored);
            }
        }

        if let Err(e) = self.persist() {
            warn!(error = %e, "failed to persist cookie jar");
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let pairs = self.matching_pairs(url);
        if pairs.is_empty() {
            return None;
        }
        let header = pairs
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        HeaderValue::from_str(&header).ok()
    }
}

/// RFC 6265 style domain matching: exact host or a dot-boundary suffix.
fn domain_matches(host: &str, cookie_domain: &str) -> bool {
    host == cookie_domain || host.ends_with(&format!(".{cookie_domain}"))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jar_at(name: &str) -> (PersistentJar, PathBuf) {
        let path = std::env::temp_dir().join(format!("teewatch-jar-{name}-{}.json", std::process::id()));
        let _ = fs::remove_file(&path);
        (PersistentJar::load_or_default(&path), path)
    }

    fn set(jar: &PersistentJar, url: &str, header: &str) {
        let value = HeaderValue::from_str(header).unwrap();
        let headers = [&value];
        jar.set_cookies(&mut headers.into_iter(), &Url::parse(url).unwrap());
    }

    #[test]
    fn cookies_round_trip_through_disk() {
        let (jar, path) = jar_at("roundtrip");
        set(&jar, "https://www.golfbox.no/login", "session=abc123; Path=/");

        let reloaded = PersistentJar::load_or_default(&path);
        let header = reloaded
            .cookies(&Url::parse("https://www.golfbox.no/grid.asp").unwrap())
            .unwrap();
        assert_eq!(header.to_str().unwrap(), "session=abc123");

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn domain_suffix_matching() {
        let (jar, path) = jar_at("domain");
        set(
            &jar,
            "https://www.golfbox.no/",
            "token=t; Domain=golfbox.no; Path=/",
        );

        assert!(jar.cookies(&Url::parse("https://api.golfbox.no/x").unwrap()).is_some());
        assert!(jar.cookies(&Url::parse("https://example.com/").unwrap()).is_none());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn secure_cookies_skip_plain_http() {
        let (jar, path) = jar_at("secure");
        set(&jar, "https://www.golfbox.no/", "s=1; Secure; Path=/");

        assert!(jar.cookies(&Url::parse("http://www.golfbox.no/").unwrap()).is_none());
        assert!(jar.cookies(&Url::parse("https://www.golfbox.no/").unwrap()).is_some());

        let _ = fs::remove_file(&path);
    }
}
