//! Image reference parsing and formatting
//!
//! An [`ImageRef`] is a structured `{registry?, namespace?, repo, tag?}` value
//! with bidirectional parse/format to the canonical `[registry/][ns/]repo[:tag]`
//! form. Equality is by normalized form.

use crate::errors::{OrchestratorError, Result};
use std::fmt;

/// A parsed, normalized container image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    registry: Option<String>,
    namespace: Option<String>,
    repo: String,
    tag: Option<String>,
}

impl ImageRef {
    /// Construct directly from parts, bypassing string parsing.
    pub fn new(
        registry: Option<String>,
        namespace: Option<String>,
        repo: impl Into<String>,
        tag: Option<String>,
    ) -> Self {
        Self {
            registry,
            namespace,
            repo: repo.into(),
            tag,
        }
    }

    /// Parse a reference in `[registry/][namespace/]repo[:tag]` form.
    ///
    /// A leading segment is treated as a registry host iff it contains a `.`
    /// or a `:` (port), matching common `docker`/`podman` reference heuristics.
    pub fn parse(reference: &str) -> Result<Self> {
        if reference.is_empty() {
            return Err(OrchestratorError::InvalidImageRef {
                reference: reference.to_string(),
                reason: "empty reference".to_string(),
            });
        }

        let parts: Vec<&str> = reference.split('/').collect();

        let (registry, namespace, name_and_tag) = match parts.len() {
            1 => (None, None, parts[0]),
            2 => {
                if looks_like_registry(parts[0]) {
                    (Some(parts[0].to_string()), None, parts[1])
                } else {
                    (None, Some(parts[0].to_string()), parts[1])
                }
            }
            _ => {
                if looks_like_registry(parts[0]) {
                    let namespace = parts[1..parts.len() - 1].join("/");
                    (
                        Some(parts[0].to_string()),
                        Some(namespace),
                        parts[parts.len() - 1],
                    )
                } else {
                    let namespace = parts[..parts.len() - 1].join("/");
                    (None, Some(namespace), parts[parts.len() - 1])
                }
            }
        };

        let (repo, tag) = split_name_and_tag(name_and_tag);
        if repo.is_empty() {
            return Err(OrchestratorError::InvalidImageRef {
                reference: reference.to_string(),
                reason: "missing repository name".to_string(),
            });
        }

        Ok(Self {
            registry,
            namespace,
            repo: repo.to_string(),
            tag: tag.map(str::to_string),
        })
    }

    /// Registry host, if any.
    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    /// Namespace, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Repository name (without registry/namespace/tag).
    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Tag, if any.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Return a copy of this reference with the tag replaced.
    pub fn with_tag(&self, tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            ..self.clone()
        }
    }

    /// Return a copy of this reference with the registry replaced.
    pub fn with_registry(&self, registry: impl Into<String>) -> Self {
        Self {
            registry: Some(registry.into()),
            ..self.clone()
        }
    }

    /// Render the canonical `[registry/][ns/]repo[:tag]` string form.
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{}/", registry)?;
        }
        if let Some(namespace) = &self.namespace {
            write!(f, "{}/", namespace)?;
        }
        write!(f, "{}", self.repo)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for ImageRef {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A reference looks like a registry host if it contains a dot (domain) or a
/// colon (host:port), distinguishing `ghcr.io/foo` from `foo/bar`.
fn looks_like_registry(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':') || segment == "localhost"
}

/// Split `name[:tag]`, being careful that a `:` inside a digest-style
/// reference (`name@sha256:...`) is not mistaken for a tag separator.
fn split_name_and_tag(segment: &str) -> (&str, Option<&str>) {
    if let Some(at_pos) = segment.find('@') {
        return (&segment[..at_pos], Some(&segment[at_pos + 1..]));
    }
    match segment.rsplit_once(':') {
        Some((name, tag)) => (name, Some(tag)),
        None => (segment, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_repo() {
        let r = ImageRef::parse("myapp").unwrap();
        assert_eq!(r.registry(), None);
        assert_eq!(r.namespace(), None);
        assert_eq!(r.repo(), "myapp");
        assert_eq!(r.tag(), None);
    }

    #[test]
    fn parses_repo_with_tag() {
        let r = ImageRef::parse("myapp:1.0").unwrap();
        assert_eq!(r.repo(), "myapp");
        assert_eq!(r.tag(), Some("1.0"));
    }

    #[test]
    fn parses_namespace_repo_tag() {
        let r = ImageRef::parse("ns/myapp:1.0").unwrap();
        assert_eq!(r.namespace(), Some("ns"));
        assert_eq!(r.repo(), "myapp");
        assert_eq!(r.tag(), Some("1.0"));
    }

    #[test]
    fn parses_registry_namespace_repo_tag() {
        let r = ImageRef::parse("registry.example.com/ns/myapp:1.0").unwrap();
        assert_eq!(r.registry(), Some("registry.example.com"));
        assert_eq!(r.namespace(), Some("ns"));
        assert_eq!(r.repo(), "myapp");
        assert_eq!(r.tag(), Some("1.0"));
    }

    #[test]
    fn parses_localhost_with_port() {
        let r = ImageRef::parse("localhost:5000/myapp").unwrap();
        assert_eq!(r.registry(), Some("localhost:5000"));
        assert_eq!(r.repo(), "myapp");
    }

    #[test]
    fn roundtrips_through_canonical_form() {
        for input in [
            "myapp",
            "myapp:tag",
            "ns/myapp:tag",
            "registry.example.com/ns/sub/myapp:tag",
        ] {
            let parsed = ImageRef::parse(input).unwrap();
            assert_eq!(parsed.canonical(), input);
        }
    }

    #[test]
    fn equality_is_by_normalized_form() {
        let a = ImageRef::parse("ns/myapp:tag").unwrap();
        let b = ImageRef::parse("ns/myapp:tag").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_empty_reference() {
        assert!(ImageRef::parse("").is_err());
    }
}
