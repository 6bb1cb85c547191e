//! DOI publication against a Zenodo-compatible deposition API.
//!
//! Publishing is four HTTP steps: create an empty deposition, upload the
//! artifact into its bucket, attach metadata to the draft, then publish.
//! Nothing is retried and a half-finished deposition is left at the remote.

use crate::core::cancel::RequestContext;
use crate::core::config::{ENV_ZENODO_ACCESS_TOKEN, ENV_ZENODO_URI, ZenodoConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ZenodoError {
    #[error("{0} not found")]
    MissingConfig(&'static str),
    #[error("Zenodo transport error: {0}")]
    Transport(String),
    #[error("Zenodo {step} returned HTTP {code}: {body}")]
    Status {
        step: &'static str,
        code: u16,
        body: String,
    },
    #[error("Zenodo {step} response could not be parsed: {source}")]
    Parse {
        step: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to encode Zenodo request: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Zenodo deposition response has no {0} link")]
    MissingLink(&'static str),
    #[error("{0}")]
    Cancelled(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoiCreator {
    pub name: String,
    pub affiliation: String,
    pub orcid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoiContributor {
    pub name: String,
    pub affiliation: String,
    pub orcid: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoiRelatedIdentifier {
    pub identifier: String,
    pub relation: String,
}

/// DOI metadata as stored on catalog records. `keywords` and `references`
/// are comma-separated strings; `doi`, `doi_badge` and `doi_link` are filled
/// in once the deposition is published.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DoiMetadata {
    pub title: String,
    pub creators: Vec<DoiCreator>,
    pub description: String,
    pub keywords: String,
    pub notes: String,
    pub related_identifiers: Vec<DoiRelatedIdentifier>,
    pub contributors: Vec<DoiContributor>,
    pub references: String,
    pub version: String,
    pub doi: String,
    pub doi_badge: String,
    pub doi_link: String,
}

impl DoiMetadata {
    /// Copy of this metadata carrying the identifiers Zenodo assigned.
    pub fn with_publication(&self, published: &ZenodoPublishResponse) -> Self {
        let link = if published.doi_url.is_empty() {
            published.links.doi.clone()
        } else {
            published.doi_url.clone()
        };
        Self {
            doi: published.doi.clone(),
            doi_badge: published.links.badge.clone(),
            doi_link: link,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishedFileLinks {
    pub download: String,
    #[serde(rename = "self")]
    pub self_link: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishedFile {
    pub checksum: String,
    pub filename: String,
    pub filesize: u64,
    pub id: String,
    pub links: PublishedFileLinks,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishedLinks {
    pub badge: String,
    pub bucket: String,
    pub conceptbadge: String,
    pub conceptdoi: String,
    pub doi: String,
    pub latest: String,
    pub latest_html: String,
    pub record: String,
    pub record_html: String,
}

/// Body of the final publish step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZenodoPublishResponse {
    pub conceptdoi: String,
    pub conceptrecid: String,
    pub created: String,
    pub doi: String,
    pub doi_url: String,
    pub files: Vec<PublishedFile>,
    pub id: i64,
    pub links: PublishedLinks,
    pub modified: String,
    pub record_id: i64,
    pub state: String,
    pub submitted: bool,
    pub title: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DepositionLinks {
    bucket: String,
    latest_draft: String,
    publish: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DepositionResponse {
    id: i64,
    links: DepositionLinks,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileUploadResponse {
    key: String,
    size: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetadataResponse {
    id: i64,
    state: String,
}

#[derive(Debug, Serialize)]
struct PersonEntry<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    affiliation: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    orcid: &'a str,
    #[serde(rename = "type", skip_serializing_if = "str::is_empty")]
    kind: &'a str,
}

#[derive(Debug, Serialize)]
struct RelatedEntry<'a> {
    identifier: &'a str,
    relation: &'a str,
}

/// The `metadata` object sent to the draft. The remote rejects empty keys,
/// so everything but `title`, `upload_type` and `description` is omitted
/// when empty.
#[derive(Debug, Serialize)]
struct DepositionMetadata<'a> {
    title: &'a str,
    upload_type: &'static str,
    description: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    creators: Vec<PersonEntry<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    contributors: Vec<PersonEntry<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    keywords: Vec<&'a str>,
    #[serde(skip_serializing_if = "str::is_empty")]
    notes: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    references: Vec<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    related_identifiers: Vec<RelatedEntry<'a>>,
    #[serde(skip_serializing_if = "str::is_empty")]
    version: &'a str,
}

#[derive(Debug, Serialize)]
struct MetadataEnvelope<'a> {
    metadata: DepositionMetadata<'a>,
}

fn split_list(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn deposition_metadata(meta: &DoiMetadata) -> DepositionMetadata<'_> {
    DepositionMetadata {
        title: &meta.title,
        upload_type: "software",
        description: &meta.description,
        creators: meta
            .creators
            .iter()
            .map(|c| PersonEntry {
                name: &c.name,
                affiliation: &c.affiliation,
                orcid: &c.orcid,
                kind: "",
            })
            .collect(),
        contributors: meta
            .contributors
            .iter()
            .map(|c| PersonEntry {
                name: &c.name,
                affiliation: &c.affiliation,
                orcid: &c.orcid,
                kind: &c.kind,
            })
            .collect(),
        keywords: split_list(&meta.keywords),
        notes: &meta.notes,
        references: split_list(&meta.references),
        related_identifiers: meta
            .related_identifiers
            .iter()
            .map(|r| RelatedEntry {
                identifier: &r.identifier,
                relation: &r.relation,
            })
            .collect(),
        version: &meta.version,
    }
}

/// Serialized `{"metadata": {...}}` body for the attach-metadata step.
pub fn metadata_request_body(meta: &DoiMetadata) -> Result<String, ZenodoError> {
    Ok(serde_json::to_string(&MetadataEnvelope {
        metadata: deposition_metadata(meta),
    })?)
}

/// A file to deposit: the JSON of a module version or an expression zip.
#[derive(Debug, Clone)]
pub struct DoiArtifact {
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub trait DoiPublisher: Send + Sync {
    fn publish(
        &self,
        ctx: &RequestContext,
        artifact: &DoiArtifact,
        metadata: &DoiMetadata,
    ) -> Result<ZenodoPublishResponse, ZenodoError>;
}

#[derive(Debug, Clone)]
pub struct ZenodoPublisher {
    config: ZenodoConfig,
}

enum Body<'a> {
    Json(&'a str),
    Octets(&'a [u8]),
}

impl ZenodoPublisher {
    pub fn new(config: ZenodoConfig) -> Self {
        Self { config }
    }

    fn credentials(&self) -> Result<(&str, &str), ZenodoError> {
        let token = self
            .config
            .access_token
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ZenodoError::MissingConfig(ENV_ZENODO_ACCESS_TOKEN))?;
        let uri = self
            .config
            .uri
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ZenodoError::MissingConfig(ENV_ZENODO_URI))?;
        Ok((uri.trim_end_matches('/'), token))
    }

    fn agent(&self, ctx: &RequestContext) -> Result<ureq::Agent, ZenodoError> {
        let mut timeout = Duration::from_secs(self.config.timeout_secs);
        if let Some(remaining) = ctx.remaining() {
            timeout = timeout.min(remaining);
        }
        if timeout.is_zero() {
            return Err(ZenodoError::Cancelled("publish deadline exceeded".to_string()));
        }
        Ok(ureq::AgentBuilder::new().timeout(timeout).build())
    }

    fn send(
        &self,
        ctx: &RequestContext,
        agent: &ureq::Agent,
        step: &'static str,
        method: &str,
        url: &str,
        body: Body<'_>,
    ) -> Result<String, ZenodoError> {
        ctx.check(step)
            .map_err(|e| ZenodoError::Cancelled(e.to_string()))?;

        let request = agent.request(method, url);
        let result = match body {
            Body::Json(json) => request
                .set("Content-Type", "application/json")
                .send_string(json),
            Body::Octets(bytes) => request
                .set("Content-Type", "application/octet-stream")
                .send_bytes(bytes),
        };

        match result {
            Ok(resp) => {
                tracing::debug!(step, status = resp.status(), "zenodo step complete");
                resp.into_string()
                    .map_err(|e| ZenodoError::Transport(format!("{}: {}", step, e)))
            }
            Err(ureq::Error::Status(code, resp)) => Err(ZenodoError::Status {
                step,
                code,
                body: resp.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(t)) => {
                Err(ZenodoError::Transport(format!("{}: {}", step, t)))
            }
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(step: &'static str, body: &str) -> Result<T, ZenodoError> {
    serde_json::from_str(body).map_err(|source| ZenodoError::Parse { step, source })
}

fn require_link<'a>(link: &'a str, name: &'static str) -> Result<&'a str, ZenodoError> {
    if link.is_empty() {
        Err(ZenodoError::MissingLink(name))
    } else {
        Ok(link)
    }
}

impl DoiPublisher for ZenodoPublisher {
    fn publish(
        &self,
        ctx: &RequestContext,
        artifact: &DoiArtifact,
        metadata: &DoiMetadata,
    ) -> Result<ZenodoPublishResponse, ZenodoError> {
        let (base, token) = self.credentials()?;
        let agent = self.agent(ctx)?;
        let _span = tracing::info_span!("zenodo_publish", filename = %artifact.filename).entered();

        let body = self.send(
            ctx,
            &agent,
            "create_deposition",
            "POST",
            &format!("{}/api/deposit/depositions?access_token={}", base, token),
            Body::Json("{}"),
        )?;
        let deposition: DepositionResponse = parse("create_deposition", &body)?;
        let bucket = require_link(&deposition.links.bucket, "bucket")?;
        let latest_draft = require_link(&deposition.links.latest_draft, "latest_draft")?;
        let publish = require_link(&deposition.links.publish, "publish")?;
        tracing::debug!(deposition_id = deposition.id, "deposition created");

        let body = self.send(
            ctx,
            &agent,
            "upload_file",
            "PUT",
            &format!("{}/{}?access_token={}", bucket, artifact.filename, token),
            Body::Octets(&artifact.bytes),
        )?;
        let upload: FileUploadResponse = parse("upload_file", &body)?;
        tracing::debug!(key = %upload.key, size = upload.size, "artifact uploaded");

        let meta_body = metadata_request_body(metadata)?;
        let body = self.send(
            ctx,
            &agent,
            "attach_metadata",
            "PUT",
            &format!("{}?access_token={}", latest_draft, token),
            Body::Json(&meta_body),
        )?;
        let attached: MetadataResponse = parse("attach_metadata", &body)?;
        tracing::debug!(deposition_id = attached.id, state = %attached.state, "metadata attached");

        let body = self.send(
            ctx,
            &agent,
            "publish",
            "POST",
            &format!("{}?access_token={}", publish, token),
            Body::Json("{}"),
        )?;
        let published: ZenodoPublishResponse = parse("publish", &body)?;
        tracing::info!(doi = %published.doi, "deposition published");
        Ok(published)
    }
}
