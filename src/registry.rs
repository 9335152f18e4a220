use std::{collections::BTreeMap, thread, time::Duration};

use reqwest::blocking::{multipart, Client};
use semver::Version;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    errors::{ReleaseError, Result},
    types::Access,
};

const MAX_RETRIES: usize = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// The registry adapter contract (§6): look up the version currently behind
/// a dist-tag, and publish a package archive under one. Concrete
/// implementations are external collaborators; this crate ships the default
/// HTTP one so publishing works without wiring in a registry-specific crate.
pub trait RegistryAdapter: Send + Sync {
    fn fetch_dist_tag(&self, package_name: &str, dist_tag: &str) -> Result<Option<Version>>;

    fn publish(
        &self,
        package_name: &str,
        dist_tag: &str,
        archive: Vec<u8>,
        manifest: String,
        access: Access,
    ) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct DistTagsResponse {
    #[serde(rename = "dist-tags")]
    dist_tags: BTreeMap<String, String>,
}

/// Default registry adapter: `GET {registry_url}/{name}` for dist-tag
/// lookups, `PUT {registry_url}/{name}/{dist_tag}` with a multipart
/// archive+manifest body to publish. Modeled directly on this codebase's
/// existing blocking-HTTP-with-retry client.
#[derive(Debug, Clone)]
pub struct HttpRegistryAdapter {
    http: Client,
    registry_url: String,
}

impl HttpRegistryAdapter {
    pub fn new(registry_url: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| ReleaseError::publish(format!("Failed to build HTTP client: {error}")))?;

        Ok(Self { http, registry_url })
    }

    #[cfg(test)]
    fn with_url(registry_url: String) -> Result<Self> {
        Self::new(registry_url)
    }
}

impl RegistryAdapter for HttpRegistryAdapter {
    fn fetch_dist_tag(&self, package_name: &str, dist_tag: &str) -> Result<Option<Version>> {
        let url = format!("{}/{}", self.registry_url, package_name);

        for attempt in 1..=MAX_RETRIES {
            info!(
                command_path = "registry.fetch-dist-tag",
                attempt,
                package_name,
                dist_tag,
                url = %url,
                "Fetching package metadata"
            );

            match self.http.get(&url).send() {
                Ok(response) if response.status().as_u16() == 404 => return Ok(None),
                Ok(response) if response.status().is_success() => {
                    let payload: DistTagsResponse = response.json().map_err(|error| {
                        ReleaseError::publish(format!("Failed to decode registry response: {error}"))
                    })?;
                    let version = payload
                        .dist_tags
                        .get(dist_tag)
                        .map(|raw| Version::parse(raw))
                        .transpose()
                        .map_err(ReleaseError::from)?;
                    return Ok(version);
                }
                Ok(response) => {
                    if attempt == MAX_RETRIES {
                        return Err(ReleaseError::publish(format!(
                            "Registry metadata request for `{package_name}` failed with status {}",
                            response.status()
                        )));
                    }
                }
                Err(error) => {
                    if attempt == MAX_RETRIES {
                        return Err(ReleaseError::publish(format!(
                            "Failed to fetch metadata for `{package_name}` from {url}: {error}"
                        )));
                    }
                }
            }

            warn!(
                command_path = "registry.fetch-dist-tag",
                attempt,
                package_name,
                "Retrying registry metadata request"
            );
            thread::sleep(Duration::from_millis((attempt as u64) * 200));
        }

        Err(ReleaseError::publish(format!(
            "Exhausted retries fetching dist-tag for `{package_name}`"
        )))
    }

    fn publish(
        &self,
        package_name: &str,
        dist_tag: &str,
        archive: Vec<u8>,
        manifest: String,
        access: Access,
    ) -> Result<()> {
        let url = format!("{}/{}/{}", self.registry_url, package_name, dist_tag);

        for attempt in 1..=MAX_RETRIES {
            info!(
                command_path = "registry.publish",
                attempt,
                package_name,
                dist_tag,
                access = access.as_str(),
                url = %url,
                "Uploading package archive"
            );

            let form = multipart::Form::new()
                .text("access", access.as_str())
                .text("manifest", manifest.clone())
                .part(
                    "archive",
                    multipart::Part::bytes(archive.clone())
                        .file_name(format!("{package_name}.crate")),
                );

            match self.http.put(&url).multipart(form).send() {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => {
                    if attempt == MAX_RETRIES {
                        return Err(ReleaseError::for_package(
                            crate::errors::ErrorKind::Publish,
                            package_name,
                            format!("Publish failed with status {}", response.status()),
                        ));
                    }
                }
                Err(error) => {
                    if attempt == MAX_RETRIES {
                        return Err(ReleaseError::for_package(
                            crate::errors::ErrorKind::Publish,
                            package_name,
                            format!("Publish request failed: {error}"),
                        ));
                    }
                }
            }

            warn!(
                command_path = "registry.publish",
                attempt, package_name, "Retrying publish upload"
            );
            thread::sleep(Duration::from_millis((attempt as u64) * 200));
        }

        Err(ReleaseError::for_package(
            crate::errors::ErrorKind::Publish,
            package_name,
            "Exhausted retries publishing package",
        ))
    }
}

/// Registry adapter used when no `registryUrl` is configured (`noRegistry`,
/// or simply an unset URL): every package resolves to "never published"
/// and `publish` is unreachable in practice, since the scheduler's
/// `RegistrySkipped` check short-circuits before it would be called.
#[derive(Debug, Clone, Default)]
pub struct NullRegistryAdapter;

impl RegistryAdapter for NullRegistryAdapter {
    fn fetch_dist_tag(&self, _package_name: &str, _dist_tag: &str) -> Result<Option<Version>> {
        Ok(None)
    }

    fn publish(
        &self,
        package_name: &str,
        _dist_tag: &str,
        _archive: Vec<u8>,
        _manifest: String,
        _access: Access,
    ) -> Result<()> {
        Err(ReleaseError::internal(format!(
            "attempted to publish `{package_name}` with no registry configured"
        )))
    }
}
