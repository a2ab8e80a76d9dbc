//! Detector artifact download.
//!
//! The face and eye classifiers are remote artifacts fetched once per
//! vision session. Any fetch or validation failure is a
//! `SentinelError::ResourceLoad`, which aborts the session exactly like a
//! camera denial.

use tracing::info;

use crate::error::{Result, SentinelError};

use super::{DetectorBackend, DetectorPair};

/// Where the two classifier artifacts live.
#[derive(Debug, Clone)]
pub struct ArtifactSource {
    pub face_url: String,
    pub eye_url: String,
}

/// Raw artifact bytes for one session.
pub struct DetectorArtifacts {
    pub face: Vec<u8>,
    pub eye: Vec<u8>,
}

/// Download both artifacts. Blocking; call from the session thread.
pub fn fetch(source: &ArtifactSource) -> Result<DetectorArtifacts> {
    let client = reqwest::blocking::Client::builder()
        .build()
        .map_err(|e| SentinelError::ResourceLoad(e.to_string()))?;

    let face = fetch_one(&client, &source.face_url)?;
    let eye = fetch_one(&client, &source.eye_url)?;
    info!(
        face_bytes = face.len(),
        eye_bytes = eye.len(),
        "detector artifacts fetched"
    );
    Ok(DetectorArtifacts { face, eye })
}

fn fetch_one(client: &reqwest::blocking::Client, url: &str) -> Result<Vec<u8>> {
    let response = client
        .get(url)
        .send()
        .map_err(|e| SentinelError::ResourceLoad(format!("fetch {url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SentinelError::ResourceLoad(format!(
            "fetch {url}: server returned {status}"
        )));
    }

    let bytes = response
        .bytes()
        .map_err(|e| SentinelError::ResourceLoad(format!("read {url}: {e}")))?
        .to_vec();
    validate_artifact(&bytes, url)?;
    Ok(bytes)
}

fn validate_artifact(bytes: &[u8], url: &str) -> Result<()> {
    if bytes.is_empty() {
        return Err(SentinelError::ResourceLoad(format!(
            "fetch {url}: empty artifact"
        )));
    }
    Ok(())
}

/// Backend that downloads artifacts and delegates parsing to `builder`.
///
/// The builder receives `(face_bytes, eye_bytes)` and returns the session's
/// detector pair; a parse failure should be a `ResourceLoad` error.
pub struct ArtifactDetectorBackend<B> {
    source: ArtifactSource,
    builder: B,
}

impl<B> ArtifactDetectorBackend<B>
where
    B: FnMut(&[u8], &[u8]) -> Result<DetectorPair> + Send + 'static,
{
    pub fn new(source: ArtifactSource, builder: B) -> Self {
        Self { source, builder }
    }
}

impl<B> DetectorBackend for ArtifactDetectorBackend<B>
where
    B: FnMut(&[u8], &[u8]) -> Result<DetectorPair> + Send + 'static,
{
    fn load(&mut self) -> Result<DetectorPair> {
        let artifacts = fetch(&self.source)?;
        (self.builder)(&artifacts.face, &artifacts.eye)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_artifact_is_a_resource_load_error() {
        let err = validate_artifact(&[], "http://models.example/face.bin").unwrap_err();
        assert!(matches!(err, SentinelError::ResourceLoad(_)));
        assert!(err.to_string().contains("empty artifact"));
    }

    #[test]
    fn non_empty_artifact_passes_validation() {
        assert!(validate_artifact(&[1, 2, 3], "http://models.example/eye.bin").is_ok());
    }
}
