//! STIX bundle sources

use super::SourceError;
use crate::config::StixSettings;
use crate::normalize::StixBundle;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// ATT&CK matrices published in the MITRE CTI repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttackDomain {
    Enterprise,
    Mobile,
    Ics,
}

impl AttackDomain {
    pub const ALL: [AttackDomain; 3] = [AttackDomain::Enterprise, AttackDomain::Mobile, AttackDomain::Ics];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttackDomain::Enterprise => "enterprise",
            AttackDomain::Mobile => "mobile",
            AttackDomain::Ics => "ics",
        }
    }

    /// Path of the bundle relative to the repository root,
    /// e.g. `enterprise-attack/enterprise-attack.json`.
    pub fn bundle_path(&self) -> String {
        let name = self.as_str();
        format!("{name}-attack/{name}-attack.json")
    }
}

impl fmt::Display for AttackDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttackDomain {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "enterprise" | "enterprise-attack" => Ok(AttackDomain::Enterprise),
            "mobile" | "mobile-attack" => Ok(AttackDomain::Mobile),
            "ics" | "ics-attack" => Ok(AttackDomain::Ics),
            other => Err(SourceError::UnknownDomain(other.to_string())),
        }
    }
}

/// Where STIX bundles come from.
#[async_trait]
pub trait StixSource: Send + Sync {
    async fn fetch(&self, domain: AttackDomain) -> Result<StixBundle, SourceError>;
}

/// Fetches bundles from the MITRE CTI repository (or a mirror).
pub struct HttpStixSource {
    client: Client,
    base_url: String,
}

impl HttpStixSource {
    pub fn new(settings: &StixSettings) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self, domain: AttackDomain) -> String {
        format!("{}/{}", self.base_url, domain.bundle_path())
    }
}

#[async_trait]
impl StixSource for HttpStixSource {
    async fn fetch(&self, domain: AttackDomain) -> Result<StixBundle, SourceError> {
        let url = self.url(domain);
        info!(%domain, %url, "fetching ATT&CK bundle");
        let bundle = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<StixBundle>()
            .await?;
        info!(%domain, objects = bundle.objects.len(), "fetched ATT&CK bundle");
        Ok(bundle)
    }
}

/// Reads bundles from local files, one per domain.
#[derive(Debug, Default, Clone)]
pub struct FileStixSource {
    files: HashMap<AttackDomain, PathBuf>,
}

impl FileStixSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, domain: AttackDomain, path: impl Into<PathBuf>) -> Self {
        self.files.insert(domain, path.into());
        self
    }

    /// Pick up `<domain>-attack.json` files present in `dir`.
    pub fn from_dir(dir: &Path) -> Self {
        let mut source = Self::new();
        for domain in AttackDomain::ALL {
            let path = dir.join(format!("{domain}-attack.json"));
            if path.exists() {
                source = source.with_file(domain, path);
            }
        }
        source
    }
}

#[async_trait]
impl StixSource for FileStixSource {
    async fn fetch(&self, domain: AttackDomain) -> Result<StixBundle, SourceError> {
        let path = self
            .files
            .get(&domain)
            .ok_or_else(|| SourceError::Unavailable(format!("no bundle file for domain {domain}")))?;
        if !path.exists() {
            return Err(SourceError::MissingFile(path.clone()));
        }
        let text = tokio::fs::read_to_string(path).await?;
        Ok(StixBundle::from_json(&text)?)
    }
}
