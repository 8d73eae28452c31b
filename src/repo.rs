//! Repository listing.
//!
//! One request against the hub's tree API turns a [`RepositoryReference`]
//! into the flat list of files directly under it.

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::classify::resolve_url;
use crate::config::Settings;
use crate::error::ListError;
use crate::models::{RemoteFileEntry, RepositoryReference};

/// One element of the tree API response.
#[derive(Debug, Deserialize)]
struct TreeEntry {
    #[serde(rename = "type")]
    kind: String,
    path: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RepoLister {
    client: Client,
    endpoint: String,
}

impl RepoLister {
    pub fn new(settings: &Settings) -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(settings.build_client()?, &settings.endpoint))
    }

    pub fn with_client(client: Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    pub fn listing_url(&self, reference: &RepositoryReference) -> String {
        let mut url = format!(
            "{}/api/models/{}/{}/tree/{}",
            self.endpoint, reference.owner, reference.repo_name, reference.branch
        );
        let subpath = reference.subpath.trim_matches('/');
        if !subpath.is_empty() {
            url.push('/');
            url.push_str(subpath);
        }
        url
    }

    /// Lists the files (not directories) under `reference`, in listing order.
    #[instrument(skip_all, fields(repo = %reference.repo_id(), branch = %reference.branch))]
    pub async fn list_files(
        &self,
        reference: &RepositoryReference,
    ) -> Result<Vec<RemoteFileEntry>, ListError> {
        let url = self.listing_url(reference);
        debug!(%url, "requesting file tree");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ListError::network(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ListError::not_found(&url, status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ListError::network(&url, e))?;
        let tree: Vec<TreeEntry> =
            serde_json::from_slice(&body).map_err(|e| ListError::malformed(&url, e))?;

        let entries: Vec<RemoteFileEntry> = tree
            .into_iter()
            .filter(|entry| entry.kind == "file")
            .map(|entry| RemoteFileEntry {
                download_url: resolve_url(
                    &self.endpoint,
                    &reference.owner,
                    &reference.repo_name,
                    &reference.branch,
                    &entry.path,
                ),
                size_bytes: entry.size.unwrap_or(0),
                relative_path: entry.path,
            })
            .collect();

        info!(files = entries.len(), total_bytes = total_size(&entries), "listed repository");
        Ok(entries)
    }
}

pub fn total_size(entries: &[RemoteFileEntry]) -> u64 {
    entries.iter().map(|entry| entry.size_bytes).sum()
}
