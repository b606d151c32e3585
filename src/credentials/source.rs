//! Credential sources
//!
//! A cookie jar can arrive as a file on disk or as an inline blob, either
//! plain base64 or gzip-then-base64. Sources are tried in that order.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::PathBuf;

use crate::config::CredentialSettings;
use crate::{Error, Result};

/// One configured origin for the cookie jar
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    File(PathBuf),
    GzipBase64(String),
    Base64(String),
}

impl CredentialSource {
    /// Configured sources in preference order
    pub fn from_settings(settings: &CredentialSettings) -> Vec<Self> {
        let mut sources = Vec::new();
        if let Some(path) = &settings.cookies_path {
            sources.push(Self::File(path.clone()));
        }
        if let Some(blob) = settings.cookies_gz_b64.as_ref().filter(|b| !b.trim().is_empty()) {
            sources.push(Self::GzipBase64(blob.clone()));
        }
        if let Some(blob) = settings.cookies_b64.as_ref().filter(|b| !b.trim().is_empty()) {
            sources.push(Self::Base64(blob.clone()));
        }
        sources
    }

    /// Provenance label reported in health output
    pub fn label(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::GzipBase64(_) => "gzip+base64",
            Self::Base64(_) => "base64",
        }
    }

    /// Read and decode the jar text
    pub fn load(&self) -> Result<String> {
        let bytes = match self {
            Self::File(path) => std::fs::read(path)
                .map_err(|e| Error::credential(self.label(), format!("{}: {e}", path.display())))?,
            Self::GzipBase64(blob) => {
                let compressed = decode_base64(blob)?;
                let mut decoder = GzDecoder::new(compressed.as_slice());
                let mut out = Vec::new();
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| Error::credential(self.label(), format!("gzip: {e}")))?;
                out
            }
            Self::Base64(blob) => decode_base64(blob)?,
        };

        let text = String::from_utf8(bytes)
            .map_err(|_| Error::credential(self.label(), "jar is not valid UTF-8"))?;
        if text.trim().is_empty() {
            return Err(Error::credential(self.label(), "jar is empty"));
        }
        Ok(text)
    }
}

fn decode_base64(blob: &str) -> Result<Vec<u8>> {
    let compact: String = blob.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(STANDARD.decode(compact)?)
}
