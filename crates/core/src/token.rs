//! Token types and authorization.

use crate::repository::RepositorySet;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;

/// A single permission flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// Read access. Implicitly granted to every token.
    Read,
    /// Deploy and delete artifacts.
    Write,
    /// Manage tokens and server caches. Implies write.
    Manager,
}

impl Permission {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Manager => "manager",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Permission flags of a token, persisted as a flag string (`m` = manager,
/// `w` = write). Read access is implicit and has no flag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Permissions {
    manager: bool,
    write: bool,
}

impl Permissions {
    /// Read-only permissions.
    pub const READ: Self = Self {
        manager: false,
        write: false,
    };
    /// Read and write permissions.
    pub const WRITE: Self = Self {
        manager: false,
        write: true,
    };
    /// Full permissions.
    pub const MANAGER: Self = Self {
        manager: true,
        write: true,
    };

    /// Parse a persisted flag string.
    pub fn parse(flags: &str) -> crate::Result<Self> {
        let mut permissions = Self::READ;
        for flag in flags.chars() {
            match flag {
                'm' => permissions.manager = true,
                'w' => permissions.write = true,
                'r' => {}
                other => {
                    return Err(crate::Error::InvalidPermissions(format!(
                        "unknown permission flag '{other}'"
                    )));
                }
            }
        }
        Ok(permissions)
    }

    /// Flag string used for persistence.
    pub fn to_flags(&self) -> String {
        let mut flags = String::with_capacity(2);
        if self.manager {
            flags.push('m');
        }
        if self.write {
            flags.push('w');
        }
        flags
    }

    /// Expanded list of granted permissions.
    pub fn to_list(&self) -> Vec<Permission> {
        let mut list = vec![Permission::Read];
        if self.write {
            list.push(Permission::Write);
        }
        if self.manager {
            list.push(Permission::Manager);
        }
        list
    }

    /// Whether these flags grant a permission.
    pub fn allows(&self, permission: Permission) -> bool {
        match permission {
            Permission::Read => true,
            Permission::Write => self.write || self.manager,
            Permission::Manager => self.manager,
        }
    }
}

/// An access token record. Only the hash of the secret is ever kept.
#[derive(Clone, Debug)]
pub struct Token {
    /// Unique alias, used as the Basic auth user name.
    pub alias: String,
    /// Scope prefix: `/` for root, `*...` for every repository.
    pub path: String,
    /// Granted permission flags.
    pub permissions: Permissions,
    /// SHA-256 hex digest of the secret.
    pub secret_hash: String,
    /// When the token was created.
    pub created_at: OffsetDateTime,
}

impl Token {
    /// Root token path.
    pub const ROOT_PATH: &'static str = "/";

    /// Whether the token applies to every path.
    pub fn is_root(&self) -> bool {
        self.path == Self::ROOT_PATH
    }

    /// Whether the token applies to every repository via a `*` prefix.
    pub fn is_wildcard(&self) -> bool {
        self.path.starts_with('*')
    }

    /// Verify a plaintext secret against the stored hash in constant time.
    pub fn verify_secret(&self, secret: &str) -> bool {
        let candidate = hash_secret(secret);
        candidate
            .as_bytes()
            .ct_eq(self.secret_hash.as_bytes())
            .into()
    }
}

/// Validate a token scope path.
pub fn validate_token_path(path: &str) -> crate::Result<()> {
    if path.is_empty() {
        return Err(crate::Error::InvalidPath("token path cannot be empty".into()));
    }
    if !path.starts_with('/') && !path.starts_with('*') {
        return Err(crate::Error::InvalidPath(format!(
            "token path must start with '/' or '*': {path}"
        )));
    }
    if path.split('/').any(|s| s == ".." || s == ".") {
        return Err(crate::Error::PathTraversal(path.to_string()));
    }
    Ok(())
}

/// Hash a secret for storage (lowercase SHA-256 hex).
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a new random token secret.
pub fn generate_secret() -> String {
    use base64::Engine;
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// An authenticated request context: the token plus the repositories it may
/// act on.
#[derive(Clone, Debug)]
pub struct Session {
    token: Token,
    repositories: Vec<String>,
}

impl Session {
    /// Build a session, resolving the token's repository scope.
    pub fn new(token: Token, repositories: &RepositorySet) -> Self {
        let repositories = resolve_scope(&token, repositories);
        Self {
            token,
            repositories,
        }
    }

    /// The authenticated token.
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Token alias.
    pub fn alias(&self) -> &str {
        &self.token.alias
    }

    /// Repository names this session may act on.
    pub fn repositories(&self) -> &[String] {
        &self.repositories
    }

    /// Whether the token grants a permission flag.
    pub fn allows(&self, permission: Permission) -> bool {
        self.token.permissions.allows(permission)
    }

    /// Whether the token's scope covers a request path such as
    /// `/releases/com/example/lib/1.0/lib-1.0.jar`.
    pub fn has_permission(&self, request_path: &str) -> bool {
        let token_path = self.token.path.as_str();

        let Some(pattern) = token_path.strip_prefix('*') else {
            return request_path.starts_with(token_path);
        };

        // A wildcard needs a concrete repository segment to stand in for `*`.
        let Some(repository) = leading_segment(request_path) else {
            return false;
        };
        if !self.repositories.iter().any(|name| name == repository) {
            return false;
        }

        let expanded = format!("/{repository}{pattern}");
        request_path.starts_with(&expanded)
    }
}

/// Repositories a token may list: all of them for root and wildcard tokens,
/// otherwise the repository named by the token path's first segment.
pub fn resolve_scope(token: &Token, repositories: &RepositorySet) -> Vec<String> {
    if token.is_root() || token.is_wildcard() {
        return repositories.names().map(str::to_string).collect();
    }

    leading_segment(&token.path)
        .and_then(|name| repositories.get(name))
        .map(|repository| vec![repository.name.clone()])
        .unwrap_or_default()
}

fn leading_segment(path: &str) -> Option<&str> {
    path.trim_start_matches('/')
        .split('/')
        .next()
        .filter(|segment| !segment.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Repository;

    fn token(path: &str, permissions: Permissions) -> Token {
        Token {
            alias: "tester".to_string(),
            path: path.to_string(),
            permissions,
            secret_hash: hash_secret("secret"),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn repositories(names: &[&str]) -> RepositorySet {
        RepositorySet::new(names.iter().map(|n| Repository::public(n)).collect())
    }

    fn session(path: &str, names: &[&str]) -> Session {
        Session::new(token(path, Permissions::READ), &repositories(names))
    }

    #[test]
    fn test_prefix_token_permissions() {
        let session = session("/a/b/c", &["a"]);
        assert!(session.has_permission("/a/b/c"));
        assert!(session.has_permission("/a/b/c/d"));
        assert!(!session.has_permission("/a/b/"));
        assert!(!session.has_permission("/a/b/d"));
    }

    #[test]
    fn test_wildcard_token_permissions() {
        let session = session("*/b/c", &["a", "b"]);
        assert!(session.has_permission("/a/b/c"));
        assert!(session.has_permission("/a/b/c/d"));
        assert!(session.has_permission("/b/b/c"));
        assert!(!session.has_permission("/a/b"));
        assert!(!session.has_permission("/b/b"));
        assert!(!session.has_permission("/x/b/c"));
    }

    #[test]
    fn test_root_token_matches_root() {
        let session = session("/", &["releases"]);
        assert!(session.has_permission("/"));
        assert!(session.has_permission("/releases/g/a"));
    }

    #[test]
    fn test_bare_wildcard_requires_repository_segment() {
        let session = session("*", &["releases", "snapshots"]);
        assert!(!session.has_permission("/"));
        assert!(session.has_permission("/releases"));
        assert!(session.has_permission("/snapshots"));
    }

    #[test]
    fn test_resolve_scope() {
        let repos = repositories(&["releases", "snapshots", "private"]);

        let root = token("/", Permissions::READ);
        assert_eq!(resolve_scope(&root, &repos).len(), 3);

        let wildcard = token("*/com/example", Permissions::READ);
        assert_eq!(resolve_scope(&wildcard, &repos).len(), 3);

        let scoped = token("/private/com/example", Permissions::READ);
        assert_eq!(resolve_scope(&scoped, &repos), vec!["private".to_string()]);

        let unknown = token("/missing/com", Permissions::READ);
        assert!(resolve_scope(&unknown, &repos).is_empty());
    }

    #[test]
    fn test_permission_flags() {
        let parsed = Permissions::parse("mw").unwrap();
        assert_eq!(parsed, Permissions::MANAGER);
        assert_eq!(parsed.to_flags(), "mw");

        assert_eq!(Permissions::parse("").unwrap(), Permissions::READ);
        assert!(Permissions::parse("x").is_err());

        assert!(Permissions::WRITE.allows(Permission::Write));
        assert!(!Permissions::WRITE.allows(Permission::Manager));
        assert!(Permissions::parse("m").unwrap().allows(Permission::Write));
        assert!(Permissions::READ.allows(Permission::Read));
    }

    #[test]
    fn test_verify_secret() {
        let token = token("/", Permissions::READ);
        assert!(token.verify_secret("secret"));
        assert!(!token.verify_secret("Secret"));
        assert!(!token.verify_secret(""));
    }

    #[test]
    fn test_generated_secrets_are_unique() {
        let a = generate_secret();
        let b = generate_secret();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
    }

    #[test]
    fn test_validate_token_path() {
        assert!(validate_token_path("/").is_ok());
        assert!(validate_token_path("*").is_ok());
        assert!(validate_token_path("/releases/com").is_ok());
        assert!(validate_token_path("").is_err());
        assert!(validate_token_path("releases").is_err());
        assert!(validate_token_path("/releases/../private").is_err());
    }
}
