//! Channel endpoint resolution.

use url::Url;

use crate::config::{REGION_PLACEHOLDER, Tenancy};
use crate::types::Error;

/// Resolves channel ids to endpoint URLs for one tenancy shape.
///
/// Built once per client; the base address and tenancy never change after
/// construction.
#[derive(Debug, Clone)]
pub struct AddressResolver {
    base: Url,
    project_id: Option<String>,
}

impl AddressResolver {
    pub fn new(base_url: Option<&str>, tenancy: &Tenancy) -> Result<Self, Error> {
        let base_url = base_url
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::Config("no base address configured".to_string()))?;

        let (raw, project_id) = match tenancy {
            Tenancy::None => (base_url.to_string(), None),
            Tenancy::Project { project_id } => (base_url.to_string(), Some(project_id.clone())),
            Tenancy::RegionProject { region, project_id } => {
                if !base_url.contains(REGION_PLACEHOLDER) {
                    return Err(Error::Config(format!(
                        "base address {base_url} has no {REGION_PLACEHOLDER} placeholder"
                    )));
                }
                (
                    base_url.replacen(REGION_PLACEHOLDER, region, 1),
                    Some(project_id.clone()),
                )
            }
        };

        let mut base = Url::parse(&raw)
            .map_err(|e| Error::Config(format!("invalid base address {raw}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "base address {raw} cannot carry a path"
            )));
        }
        base.set_query(None);
        base.set_fragment(None);

        Ok(Self { base, project_id })
    }

    /// The base address after region substitution.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Endpoint for `channel_id`: `{base}/[{project_id}/]{channel_id}`.
    ///
    /// Each component becomes exactly one escaped path segment, so `a/b` is
    /// sent as `a%2Fb`. Base path segments are kept whether or not the base
    /// ends in a slash. `.` and `..` (in any percent-encoded spelling) would
    /// be normalized away by the URL, so they fail with
    /// [`Error::InvalidSegment`].
    pub fn resolve(&self, channel_id: &str) -> Result<Url, Error> {
        if let Some(project_id) = &self.project_id {
            check_segment(project_id)?;
        }
        check_segment(channel_id)?;

        let mut url = self.base.clone();
        // cannot-be-a-base URLs are rejected in `new`
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            if let Some(project_id) = &self.project_id {
                segments.push(project_id);
            }
            segments.push(channel_id);
        }
        Ok(url)
    }
}

fn check_segment(segment: &str) -> Result<(), Error> {
    let lowered = segment.to_ascii_lowercase();
    match lowered.as_str() {
        "." | "%2e" | ".." | ".%2e" | "%2e." | "%2e%2e" => {
            Err(Error::InvalidSegment(segment.to_string()))
        }
        _ => Ok(()),
    }
}
