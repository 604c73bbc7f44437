//! Clone URL validation

use crate::{Error, Result};

const SCHEMES: &[&str] = &["https", "http", "ssh", "git", "git+ssh"];

/// A clone URL that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoUrl {
    /// URL exactly as it will be handed to git
    clone_url: String,
    /// Host (e.g., "github.com")
    host: String,
    /// Repository path on the host
    path: String,
}

impl RepoUrl {
    /// Parse a repository URL
    ///
    /// Supports:
    /// - `https://host/owner/repo(.git)` (also `http`, `ssh`, `git`, `git+ssh`)
    /// - `user@host:owner/repo.git` (scp-like syntax)
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        if input.is_empty() {
            return Err(Error::InvalidUrl("empty URL".to_string()));
        }

        // git would read these as options
        if input.starts_with('-') {
            return Err(Error::InvalidUrl(input.to_string()));
        }

        if input.chars().any(char::is_whitespace) {
            return Err(Error::InvalidUrl(input.to_string()));
        }

        if input.contains("://") {
            return Self::parse_url(input);
        }

        Self::parse_scp(input)
    }

    fn parse_url(input: &str) -> Result<Self> {
        let url = url::Url::parse(input)
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", input, e)))?;

        if !SCHEMES.contains(&url.scheme()) {
            return Err(Error::InvalidUrl(format!(
                "{}: unsupported scheme '{}'",
                input,
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::InvalidUrl(format!("{}: missing host", input)))?
            .to_string();

        let path = url.path().trim_matches('/').to_string();
        if path.is_empty() {
            return Err(Error::InvalidUrl(format!("{}: missing repository path", input)));
        }

        Ok(Self {
            clone_url: input.to_string(),
            host,
            path,
        })
    }

    /// Handle `git@github.com:owner/repo.git` style addresses
    fn parse_scp(input: &str) -> Result<Self> {
        let invalid = || Error::InvalidUrl(input.to_string());

        let (user, rest) = input.split_once('@').ok_or_else(invalid)?;
        let (host, path) = rest.split_once(':').ok_or_else(invalid)?;
        let path = path.trim_matches('/');

        if user.is_empty() || host.is_empty() || host.contains('/') || path.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            clone_url: input.to_string(),
            host: host.to_string(),
            path: path.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.clone_url
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Repository name, i.e. the last path segment without `.git`
    pub fn name(&self) -> &str {
        let last = self.path.rsplit('/').next().unwrap_or(&self.path);
        last.strip_suffix(".git").unwrap_or(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_https() {
        let url = RepoUrl::parse("https://github.com/owner/repo").unwrap();
        assert_eq!(url.host(), "github.com");
        assert_eq!(url.name(), "repo");
        assert_eq!(url.as_str(), "https://github.com/owner/repo");
    }

    #[test]
    fn test_parse_https_with_git() {
        let url = RepoUrl::parse("  https://github.com/owner/repo.git ").unwrap();
        assert_eq!(url.name(), "repo");
        assert_eq!(url.as_str(), "https://github.com/owner/repo.git");
    }

    #[test]
    fn test_parse_git_ssh() {
        let url = RepoUrl::parse("git@github.com:owner/repo.git").unwrap();
        assert_eq!(url.host(), "github.com");
        assert_eq!(url.name(), "repo");
    }

    #[test]
    fn test_parse_ssh_scheme() {
        let url = RepoUrl::parse("ssh://git@example.org:2222/team/tool.git").unwrap();
        assert_eq!(url.host(), "example.org");
        assert_eq!(url.name(), "tool");
    }

    #[test]
    fn test_parse_invalid() {
        assert!(RepoUrl::parse("").is_err());
        assert!(RepoUrl::parse("invalid").is_err());
        assert!(RepoUrl::parse("owner/repo").is_err());
        assert!(RepoUrl::parse("https://github.com").is_err());
        assert!(RepoUrl::parse("file:///etc/passwd").is_err());
        assert!(RepoUrl::parse("--upload-pack=touch /tmp/x").is_err());
        assert!(RepoUrl::parse("https://host/repo.git; rm -rf /").is_err());
        assert!(RepoUrl::parse("@host:repo").is_err());
    }
}
