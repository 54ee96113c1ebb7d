//! Image reference parsing.
//!
//! Implements the normalized-name rules of the Docker distribution reference
//! grammar, which decide the registry a reference is pulled from:
//!
//! - `busybox` → `docker.io/library/busybox`
//! - `bitnami/redis:7` → `docker.io/bitnami/redis:7`
//! - `test.io/busybox` → `test.io/busybox`
//! - `localhost:5000/app@sha256:…` → `localhost:5000/app`

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{FetchError, Result};

pub const DEFAULT_DOMAIN: &str = "docker.io";
pub const LEGACY_DEFAULT_DOMAIN: &str = "index.docker.io";
const OFFICIAL_REPO_PREFIX: &str = "library/";
const NAME_TOTAL_LENGTH_MAX: usize = 255;

lazy_static! {
    static ref REFERENCE_RE: Regex = {
        let alpha_numeric = "[a-z0-9]+";
        let separator = "(?:[._]|__|[-]+)";
        let path_component = format!("{alpha_numeric}(?:{separator}{alpha_numeric})*");
        let domain_component = "(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])";
        let domain_name = format!(r"{domain_component}(?:\.{domain_component})*");
        let ipv6 = r"\[(?:[a-fA-F0-9:]+)\]";
        let domain = format!("(?:{domain_name}|{ipv6})(?::[0-9]+)?");
        let name = format!("(?:{domain}/)?{path_component}(?:/{path_component})*");
        let tag = "[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}";
        let digest = "[A-Za-z][A-Za-z0-9]*(?:[-_+.][A-Za-z][A-Za-z0-9]*)*:[[:xdigit:]]{32,}";
        Regex::new(&format!("^({name})(?::({tag}))?(?:@({digest}))?$"))
            .expect("reference grammar is a valid regex")
    };
    static ref IDENTIFIER_RE: Regex =
        Regex::new("^[a-f0-9]{64}$").expect("identifier grammar is a valid regex");
}

/// A parsed, normalized image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageName {
    domain: String,
    path: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageName {
    /// Parse a reference the way `docker pull` does, filling in the default
    /// registry and the `library/` namespace for official images.
    pub fn parse_normalized(reference: &str) -> Result<Self> {
        if IDENTIFIER_RE.is_match(reference) {
            return Err(FetchError::parse(
                reference,
                "cannot specify 64-byte hexadecimal strings",
            ));
        }

        let (domain, remainder) = split_docker_domain(reference);

        let remote_name = remainder.split(':').next().unwrap_or(remainder.as_str());
        if remote_name.to_lowercase() != remote_name {
            return Err(FetchError::parse(
                reference,
                format!("repository name ({remote_name}) must be lowercase"),
            ));
        }

        let full = format!("{domain}/{remainder}");
        let captures = REFERENCE_RE
            .captures(&full)
            .ok_or_else(|| FetchError::parse(reference, "does not match the reference grammar"))?;

        let name = &captures[1];
        if name.len() > NAME_TOTAL_LENGTH_MAX {
            return Err(FetchError::parse(
                reference,
                format!("repository name must not be more than {NAME_TOTAL_LENGTH_MAX} characters"),
            ));
        }

        let path = name
            .strip_prefix(&format!("{domain}/"))
            .unwrap_or(name)
            .to_string();

        Ok(Self {
            domain,
            path,
            tag: captures.get(2).map(|m| m.as_str().to_string()),
            digest: captures.get(3).map(|m| m.as_str().to_string()),
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }
}

/// Split the registry domain off a reference. The first component only counts
/// as a domain if it looks like a hostname, has a port, is `localhost`, or
/// contains uppercase letters (which repository paths never do).
fn split_docker_domain(reference: &str) -> (String, String) {
    let (mut domain, mut remainder) = match reference.split_once('/') {
        Some((first, rest))
            if first.contains(['.', ':'])
                || first == "localhost"
                || first.to_lowercase() != first =>
        {
            (first.to_string(), rest.to_string())
        }
        _ => (DEFAULT_DOMAIN.to_string(), reference.to_string()),
    };

    if domain == LEGACY_DEFAULT_DOMAIN {
        domain = DEFAULT_DOMAIN.to_string();
    }
    if domain == DEFAULT_DOMAIN && !remainder.contains('/') {
        remainder = format!("{OFFICIAL_REPO_PREFIX}{remainder}");
    }

    (domain, remainder)
}
