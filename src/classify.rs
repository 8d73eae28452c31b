//! Address classification.
//!
//! Turns whatever the user pasted into either a single file to fetch or a
//! repository directory to list. Pure string work, no requests are made.

use std::path::{Component, Path};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use url::Url;

use crate::config::{DEFAULT_ENDPOINT, MIRROR_HOSTS};
use crate::error::ClassifyError;
use crate::models::{DownloadTarget, RepositoryReference};

/// Filename used when a direct URL has no usable last segment.
pub const FALLBACK_FILENAME: &str = "downloaded_file";

/// `/<owner>/<repo>/tree/<branch>[/<subpath>]`
#[allow(clippy::expect_used)]
static TREE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/([^/]+)/([^/]+)/tree/([^/]+)(?:/(.*))?$").expect("tree regex is valid")
});

/// `/<owner>/<repo>/(resolve|blob)/<branch>/<path>`
#[allow(clippy::expect_used)]
static FILE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/([^/]+)/([^/]+)/(?:resolve|blob)/([^/]+)/(.+)$").expect("file regex is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedTarget {
    SingleFile(DownloadTarget),
    Directory(RepositoryReference),
    Unrecognized,
}

impl ClassifiedTarget {
    /// Turns `Unrecognized` into an error naming the rejected address.
    pub fn recognized(self, address: &str) -> Result<Self, ClassifyError> {
        match self {
            Self::Unrecognized => Err(ClassifyError::Unrecognized {
                address: address.to_string(),
            }),
            other => Ok(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HostPattern {
    host: String,
    port: Option<u16>,
}

impl HostPattern {
    fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host_ok = host.eq_ignore_ascii_case(&self.host)
            || host
                .to_ascii_lowercase()
                .ends_with(&format!(".{}", self.host));
        host_ok && self.port.is_none_or(|port| url.port() == Some(port))
    }
}

/// Classifies addresses against a fixed canonical endpoint.
#[derive(Debug, Clone)]
pub struct Classifier {
    endpoint: String,
    hosts: Vec<HostPattern>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

impl Classifier {
    /// The endpoint's own host is recognized alongside the known mirrors.
    pub fn new(endpoint: &str) -> Self {
        let endpoint = endpoint.trim().trim_end_matches('/').to_string();
        let mut hosts: Vec<HostPattern> = MIRROR_HOSTS
            .iter()
            .map(|host| HostPattern {
                host: (*host).to_string(),
                port: None,
            })
            .collect();

        if let Ok(url) = Url::parse(&endpoint) {
            if let Some(host) = url.host_str() {
                let pattern = HostPattern {
                    host: host.to_ascii_lowercase(),
                    port: url.port(),
                };
                if !hosts.contains(&pattern) {
                    hosts.push(pattern);
                }
            }
        }

        Self { endpoint, hosts }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn classify(&self, address: &str) -> ClassifiedTarget {
        let address = strip_query(address.trim());
        if address.is_empty() {
            return ClassifiedTarget::Unrecognized;
        }

        // Hub addresses are often pasted without a scheme.
        let has_scheme = address.contains("://");
        let parsed = if has_scheme {
            Url::parse(address)
        } else {
            Url::parse(&format!("https://{address}"))
        };
        let Ok(parsed) = parsed else {
            debug!(address, "address does not parse as a URL");
            return ClassifiedTarget::Unrecognized;
        };
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return ClassifiedTarget::Unrecognized;
        }

        if self.hosts.iter().any(|pattern| pattern.matches(&parsed)) {
            if let Some(reference) = match_tree(parsed.path()) {
                return ClassifiedTarget::Directory(reference);
            }
            if let Some(target) = self.match_file(parsed.path()) {
                return ClassifiedTarget::SingleFile(target);
            }
        }

        if has_scheme {
            return ClassifiedTarget::SingleFile(DownloadTarget {
                url: address.to_string(),
                filename: filename_from_path(parsed.path()),
            });
        }

        ClassifiedTarget::Unrecognized
    }

    fn match_file(&self, path: &str) -> Option<DownloadTarget> {
        let caps = FILE_PATH.captures(path)?;
        let (owner, repo, branch, file_path) = (&caps[1], &caps[2], &caps[3], &caps[4]);
        Some(DownloadTarget {
            url: resolve_url(&self.endpoint, owner, repo, branch, file_path),
            filename: filename_from_path(file_path),
        })
    }
}

/// Classifies against the default endpoint.
pub fn classify(address: &str) -> ClassifiedTarget {
    Classifier::default().classify(address)
}

/// Canonical download URL for a file inside a repository.
pub fn resolve_url(endpoint: &str, owner: &str, repo: &str, branch: &str, path: &str) -> String {
    format!(
        "{}/{owner}/{repo}/resolve/{branch}/{}",
        endpoint.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn match_tree(path: &str) -> Option<RepositoryReference> {
    let caps = TREE_PATH.captures(path)?;
    let subpath = caps
        .get(4)
        .map(|m| m.as_str().trim_matches('/'))
        .unwrap_or_default();
    Some(RepositoryReference::new(&caps[1], &caps[2], &caps[3], subpath))
}

fn strip_query(address: &str) -> &str {
    address.split('?').next().unwrap_or_default()
}

/// Last segment of the decoded path, so an encoded separator can never
/// smuggle a directory into the name.
fn filename_from_path(path: &str) -> String {
    let decoded = urlencoding::decode(path)
        .map(|name| name.into_owned())
        .unwrap_or_else(|_| path.to_string());
    let last = decoded.rsplit(['/', '\\']).next().unwrap_or_default();

    match Path::new(last).components().collect::<Vec<_>>().as_slice() {
        [Component::Normal(_)] => last.to_string(),
        _ => FALLBACK_FILENAME.to_string(),
    }
}
