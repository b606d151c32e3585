//! Credential jar materialization
//!
//! Picks the best configured cookie source, trims it to the allowed
//! domains and writes a private working copy the resolver can read.

use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::CredentialSettings;
use crate::credentials::CredentialSource;
use crate::{Error, Result};

const JAR_FILE_NAME: &str = "cookies.txt";
const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// Cookies that indicate a signed-in session
pub const AUTH_TOKENS: &[&str] = &[
    "SID",
    "HSID",
    "SSID",
    "APISID",
    "SAPISID",
    "__Secure-1PSID",
    "__Secure-3PSID",
    "__Secure-1PAPISID",
    "__Secure-3PAPISID",
    "LOGIN_INFO",
];

/// Consent and visitor cookies present even for anonymous sessions
pub const BASIC_TOKENS: &[&str] = &[
    "CONSENT",
    "SOCS",
    "PREF",
    "VISITOR_INFO1_LIVE",
    "YSC",
    "__Secure-YEC",
];

/// Materialized jar, immutable for the life of the process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialJar {
    path: PathBuf,
    byte_len: usize,
    source: &'static str,
    auth_tokens_present: bool,
    basic_tokens_present: bool,
}

impl CredentialJar {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn health(&self) -> CredentialHealth {
        CredentialHealth {
            configured: true,
            source: Some(self.source),
            byte_len: self.byte_len,
            auth_tokens_present: self.auth_tokens_present,
            basic_tokens_present: self.basic_tokens_present,
        }
    }
}

/// Jar summary safe to expose; never includes cookie content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CredentialHealth {
    pub configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<&'static str>,
    pub byte_len: usize,
    pub auth_tokens_present: bool,
    pub basic_tokens_present: bool,
}

impl CredentialHealth {
    /// Health for a service running without a jar
    pub fn absent() -> Self {
        Self::default()
    }
}

struct Candidate {
    source: &'static str,
    content: String,
    has_auth: bool,
}

pub struct CredentialManager;

impl CredentialManager {
    /// Decode, select, filter and persist the cookie jar
    ///
    /// Undecodable sources are logged and skipped. Returns `None` when no
    /// source yields a usable jar.
    pub fn materialize(settings: &CredentialSettings) -> Option<CredentialJar> {
        let candidates: Vec<Candidate> = CredentialSource::from_settings(settings)
            .into_iter()
            .filter_map(|source| match source.load() {
                Ok(content) => Some(Candidate {
                    source: source.label(),
                    has_auth: scan_tokens(&content, AUTH_TOKENS),
                    content,
                }),
                Err(e) => {
                    warn!("Skipping credential source: {}", e);
                    None
                }
            })
            .collect();

        let chosen = select(candidates)?;
        let content = if settings.filter_domains {
            filter_domains(&chosen.content, &settings.allowed_domains)
        } else {
            chosen.content
        };

        let jar = match persist(&settings.output_dir, &content) {
            Ok(path) => CredentialJar {
                path,
                byte_len: content.len(),
                source: chosen.source,
                auth_tokens_present: scan_tokens(&content, AUTH_TOKENS),
                basic_tokens_present: scan_tokens(&content, BASIC_TOKENS),
            },
            Err(e) => {
                warn!("Credential jar could not be written: {}", e);
                return None;
            }
        };

        info!(
            "Credential jar ready from {} source ({} bytes, auth tokens: {})",
            jar.source, jar.byte_len, jar.auth_tokens_present
        );
        if !jar.auth_tokens_present {
            warn!("Credential jar carries no sign-in cookies, auth walls will not be bypassed");
        }
        Some(jar)
    }
}

/// Prefer jars with sign-in cookies, largest first; else the first source
fn select(candidates: Vec<Candidate>) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;
    let mut first: Option<Candidate> = None;

    for candidate in candidates {
        if candidate.has_auth {
            let larger = best
                .as_ref()
                .is_none_or(|b| candidate.content.len() > b.content.len());
            if larger {
                best = Some(candidate);
            }
        } else if first.is_none() {
            first = Some(candidate);
        }
    }

    best.or(first)
}

/// Domain of a Netscape cookie line, without `#HttpOnly_` or a leading dot
fn cookie_domain(line: &str) -> Option<&str> {
    let line = line.strip_prefix(HTTP_ONLY_PREFIX).unwrap_or(line);
    let domain = line.split('\t').next()?.trim();
    let domain = domain.strip_prefix('.').unwrap_or(domain);
    (!domain.is_empty()).then_some(domain)
}

fn domain_allowed(domain: &str, allowed: &[String]) -> bool {
    let domain = domain.to_ascii_lowercase();
    allowed.iter().any(|a| {
        let a = a.trim_start_matches('.').to_ascii_lowercase();
        domain == a || domain.ends_with(&format!(".{a}"))
    })
}

/// Keep comments and cookie lines for allowed domains
pub fn filter_domains(content: &str, allowed: &[String]) -> String {
    let mut kept = String::with_capacity(content.len());
    for line in content.lines() {
        let keep = if line.starts_with(HTTP_ONLY_PREFIX) {
            cookie_domain(line).is_some_and(|d| domain_allowed(d, allowed))
        } else if line.starts_with('#') || line.trim().is_empty() {
            true
        } else {
            cookie_domain(line).is_some_and(|d| domain_allowed(d, allowed))
        };

        if keep {
            kept.push_str(line);
            kept.push('\n');
        }
    }
    kept
}

/// True when any cookie line is named one of `names`
pub fn scan_tokens(content: &str, names: &[&str]) -> bool {
    content.lines().any(|line| {
        let line = line.strip_prefix(HTTP_ONLY_PREFIX).unwrap_or(line);
        if line.starts_with('#') {
            return false;
        }
        line.split('\t')
            .nth(5)
            .is_some_and(|name| names.contains(&name.trim()))
    })
}

/// Write the jar through a fresh 0600 file renamed into place
///
/// The rename replaces whatever sits at the target path, links included,
/// so nothing outside `dir` is ever written.
fn persist(dir: &Path, content: &str) -> Result<PathBuf> {
    private_dir(dir)?;
    let path = dir.join(JAR_FILE_NAME);

    let mut file = tempfile::Builder::new()
        .prefix(".cookies-")
        .tempfile_in(dir)?;
    file.write_all(content.as_bytes())?;
    file.as_file().sync_all()?;
    file.persist(&path).map_err(|e| e.error)?;

    Ok(path)
}

/// Create `dir` as 0700, or accept an existing one only if it is ours
#[cfg(unix)]
fn private_dir(dir: &Path) -> Result<()> {
    use std::os::unix::fs::{DirBuilderExt, MetadataExt, PermissionsExt};

    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)?;

    let meta = std::fs::symlink_metadata(dir)?;
    if !meta.is_dir() {
        return Err(Error::credential(
            "jar",
            format!("{} is not a directory", dir.display()),
        ));
    }
    if meta.uid() != nix::unistd::getuid().as_raw() {
        return Err(Error::credential(
            "jar",
            format!("{} is owned by another user", dir.display()),
        ));
    }
    if meta.mode() & 0o077 != 0 {
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn private_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use pretty_assertions::assert_eq;

    fn line(domain: &str, name: &str) -> String {
        format!("{domain}\tTRUE\t/\tTRUE\t1999999999\t{name}\tvalue\n")
    }

    fn signed_in_jar() -> String {
        let mut jar = String::from("# Netscape HTTP Cookie File\n");
        jar.push_str(&line(".youtube.com", "SID"));
        jar.push_str(&line("#HttpOnly_.youtube.com", "__Secure-3PSID"));
        jar.push_str(&line(".youtube.com", "PREF"));
        jar.push_str(&line(".example.org", "tracker"));
        jar.push_str(&line("#HttpOnly_.evil.net", "session"));
        jar.push_str(&line("accounts.google.com", "LSID"));
        jar
    }

    fn settings(dir: &Path) -> CredentialSettings {
        CredentialSettings {
            output_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_filter_keeps_comments_and_allowed_domains() {
        let allowed = CredentialSettings::default().allowed_domains;
        let filtered = filter_domains(&signed_in_jar(), &allowed);

        assert!(filtered.starts_with("# Netscape HTTP Cookie File\n"));
        assert!(filtered.contains("\tSID\t"));
        assert!(filtered.contains("#HttpOnly_.youtube.com"));
        assert!(filtered.contains("accounts.google.com"));
        assert!(!filtered.contains("example.org"));
        assert!(!filtered.contains("evil.net"));
    }

    #[test]
    fn test_token_scan() {
        let jar = signed_in_jar();
        assert!(scan_tokens(&jar, AUTH_TOKENS));
        assert!(scan_tokens(&jar, BASIC_TOKENS));

        let anonymous = line(".youtube.com", "VISITOR_INFO1_LIVE");
        assert!(!scan_tokens(&anonymous, AUTH_TOKENS));
        assert!(scan_tokens(&anonymous, BASIC_TOKENS));
    }

    #[test]
    fn test_domain_matching() {
        let allowed = vec!["youtube.com".to_string()];
        assert!(domain_allowed("youtube.com", &allowed));
        assert!(domain_allowed("www.youtube.com", &allowed));
        assert!(!domain_allowed("notyoutube.com", &allowed));
    }

    #[test]
    fn test_materialize_prefers_auth_source() {
        let dir = tempfile::tempdir().unwrap();
        let anonymous = line(".youtube.com", "PREF");
        let settings = CredentialSettings {
            cookies_b64: Some(STANDARD.encode(signed_in_jar())),
            cookies_gz_b64: Some(STANDARD.encode("garbage")),
            cookies_path: None,
            ..settings(dir.path())
        };
        let jar = CredentialManager::materialize(&settings).unwrap();
        let health = jar.health();

        assert_eq!(health.source, Some("base64"));
        assert!(health.auth_tokens_present);
        assert!(health.basic_tokens_present);

        let written = std::fs::read_to_string(jar.path()).unwrap();
        assert_eq!(written.len(), health.byte_len);
        assert!(!written.contains("evil.net"));

        let mut anon_file = tempfile::NamedTempFile::new().unwrap();
        anon_file.write_all(anonymous.as_bytes()).unwrap();
        let settings = CredentialSettings {
            cookies_path: Some(anon_file.path().to_path_buf()),
            cookies_b64: Some(STANDARD.encode(signed_in_jar())),
            ..self::settings(dir.path())
        };
        let jar = CredentialManager::materialize(&settings).unwrap();
        assert_eq!(jar.health().source, Some("base64"));
    }

    #[test]
    fn test_materialize_falls_back_to_first_source() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CredentialSettings {
            cookies_gz_b64: None,
            cookies_b64: Some(STANDARD.encode(line(".youtube.com", "PREF"))),
            ..settings(dir.path())
        };
        let jar = CredentialManager::materialize(&settings).unwrap();
        let health = jar.health();
        assert!(!health.auth_tokens_present);
        assert!(health.basic_tokens_present);
    }

    #[test]
    fn test_materialize_without_sources() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CredentialManager::materialize(&settings(dir.path())).is_none());
        assert!(!CredentialHealth::absent().configured);
    }

    #[cfg(unix)]
    #[test]
    fn test_jar_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let settings = CredentialSettings {
            cookies_b64: Some(STANDARD.encode(signed_in_jar())),
            ..settings(dir.path())
        };
        let jar = CredentialManager::materialize(&settings).unwrap();
        let mode = std::fs::metadata(jar.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_jar_replaces_planted_link() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let victim = outside.path().join("victim.txt");
        std::fs::write(&victim, "untouched").unwrap();

        let jar_dir = dir.path().join("jar");
        std::fs::create_dir(&jar_dir).unwrap();
        std::os::unix::fs::symlink(&victim, jar_dir.join(JAR_FILE_NAME)).unwrap();

        let settings = CredentialSettings {
            cookies_b64: Some(STANDARD.encode(signed_in_jar())),
            ..settings(&jar_dir)
        };
        let jar = CredentialManager::materialize(&settings).unwrap();

        assert_eq!(std::fs::read_to_string(&victim).unwrap(), "untouched");
        let meta = std::fs::symlink_metadata(jar.path()).unwrap();
        assert!(meta.file_type().is_file());
        assert!(std::fs::read_to_string(jar.path()).unwrap().contains("\tSID\t"));
    }

    #[cfg(unix)]
    #[test]
    fn test_existing_dir_is_tightened() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let jar_dir = dir.path().join("shared");
        std::fs::create_dir(&jar_dir).unwrap();
        std::fs::set_permissions(&jar_dir, std::fs::Permissions::from_mode(0o755)).unwrap();

        let settings = CredentialSettings {
            cookies_b64: Some(STANDARD.encode(signed_in_jar())),
            ..settings(&jar_dir)
        };
        assert!(CredentialManager::materialize(&settings).is_some());

        let mode = std::fs::metadata(&jar_dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}
