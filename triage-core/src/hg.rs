// Mercurial web lookups: tip milestone and revision existence.

use std::sync::Arc;

use tracing::debug;

use crate::bug::ReleaseInfo;
use crate::config::HgSection;
use crate::error::TrackerError;
use crate::transport::HttpTransport;

/// Repository URL for a branch alias: `central` lives at the top level,
/// everything else under `releases/`.
pub fn repo_url(base: &str, branch: &str) -> String {
    let base = base.trim_end_matches('/');
    if branch == "central" {
        format!("{base}/mozilla-central")
    } else {
        format!("{base}/releases/mozilla-{branch}")
    }
}

/// [`ReleaseInfo`] backed by the Mercurial web interface.
#[derive(Debug, Clone)]
pub struct HgClient {
    transport: Arc<HttpTransport>,
    base_url: String,
    milestone_path: String,
}

impl HgClient {
    pub fn new(transport: Arc<HttpTransport>, section: &HgSection) -> Self {
        Self {
            transport,
            base_url: section.base_url.trim_end_matches('/').to_string(),
            milestone_path: section.milestone_path.trim_start_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Major version from the last line of `milestone.txt` (`130.0a1` -> 130).
fn parse_milestone(text: &str) -> Result<u32, TrackerError> {
    let line = text
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .ok_or_else(|| TrackerError::Parse("empty milestone file".into()))?;
    line.split('.')
        .next()
        .and_then(|major| major.parse().ok())
        .ok_or_else(|| TrackerError::Parse(format!("bad milestone: {line}")))
}

#[async_trait::async_trait]
impl ReleaseInfo for HgClient {
    async fn tip_version(&self) -> Result<u32, TrackerError> {
        let url = format!("{}/{}", self.base_url, self.milestone_path);
        let text = self.transport.get_text(&url).await?;
        parse_milestone(&text)
    }

    async fn revision_exists(&self, branch: &str, rev: &str) -> Result<bool, TrackerError> {
        let url = format!("{}/json-rev/{rev}", repo_url(&self.base_url, branch));
        match self.transport.get_text(&url).await {
            Ok(_) => Ok(true),
            Err(TrackerError::Api { status, .. }) => {
                debug!(branch, rev, status, "Revision not found");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;

    use super::*;
    use crate::config::TransportSection;

    fn client(server: &MockServer) -> HgClient {
        let transport = HttpTransport::new(&TransportSection {
            max_retries: 0,
            backoff_ms: 1,
            timeout_secs: 5,
        })
        .unwrap();
        HgClient::new(
            Arc::new(transport),
            &HgSection {
                base_url: server.base_url(),
                milestone_path: "mozilla-central/raw-file/tip/config/milestone.txt".into(),
            },
        )
    }

    #[test]
    fn repo_urls() {
        assert_eq!(
            repo_url("https://hg.mozilla.org/", "central"),
            "https://hg.mozilla.org/mozilla-central"
        );
        assert_eq!(
            repo_url("https://hg.mozilla.org", "esr115"),
            "https://hg.mozilla.org/releases/mozilla-esr115"
        );
    }

    #[test]
    fn milestone_uses_last_line() {
        let text = "# Holds the current milestone.\n#\n130.0a1\n";
        assert_eq!(parse_milestone(text).unwrap(), 130);
        assert!(parse_milestone("\n\n").is_err());
        assert!(parse_milestone("nightly\n").is_err());
    }

    #[tokio::test]
    async fn tip_version_from_server() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/mozilla-central/raw-file/tip/config/milestone.txt");
            then.status(200).body("# milestone\n131.0a1\n");
        });
        assert_eq!(client(&server).tip_version().await.unwrap(), 131);
    }

    #[tokio::test]
    async fn missing_revision_is_false() {
        let server = MockServer::start();
        let found = server.mock(|when, then| {
            when.method(GET)
                .path("/releases/mozilla-beta/json-rev/7bd6cb8b76c0");
            then.status(200).body("{}");
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/mozilla-central/json-rev/000000000000");
            then.status(404).body("unknown revision");
        });

        let hg = client(&server);
        assert!(hg.revision_exists("beta", "7bd6cb8b76c0").await.unwrap());
        assert!(!hg.revision_exists("central", "000000000000").await.unwrap());
        assert_eq!(found.calls(), 1);
    }
}
