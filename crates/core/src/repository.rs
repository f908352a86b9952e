//! Repository definitions.

use serde::{Deserialize, Serialize};

/// Path segments reserved for server endpoints.
const RESERVED_NAMES: [&str; 3] = ["api", "metrics", "health"];

/// A configured repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Repository name, also the first segment of every path inside it.
    pub name: String,
    /// Hidden repositories require authentication for reads.
    #[serde(default)]
    pub hidden: bool,
}

impl Repository {
    /// A public repository.
    pub fn public(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hidden: false,
        }
    }

    /// A hidden repository.
    pub fn hidden(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hidden: true,
        }
    }

    /// Validate the repository name.
    pub fn validate(&self) -> crate::Result<()> {
        let name = self.name.as_str();
        if name.is_empty() || name.len() > 64 {
            return Err(crate::Error::InvalidConfig(format!(
                "repository name must be 1-64 characters: '{name}'"
            )));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            || name.starts_with('.')
        {
            return Err(crate::Error::InvalidConfig(format!(
                "repository name contains invalid characters: '{name}'"
            )));
        }
        if RESERVED_NAMES.contains(&name) {
            return Err(crate::Error::InvalidConfig(format!(
                "repository name is reserved: '{name}'"
            )));
        }
        Ok(())
    }
}

/// The ordered set of repositories configured at startup. The first one is
/// the primary repository.
#[derive(Clone, Debug, Default)]
pub struct RepositorySet {
    repositories: Vec<Repository>,
}

impl RepositorySet {
    /// Create a set, keeping configuration order.
    pub fn new(repositories: Vec<Repository>) -> Self {
        Self { repositories }
    }

    /// Validate every repository and reject duplicate names.
    pub fn validate(&self) -> crate::Result<()> {
        for (idx, repository) in self.repositories.iter().enumerate() {
            repository.validate()?;
            if self.repositories[..idx]
                .iter()
                .any(|other| other.name == repository.name)
            {
                return Err(crate::Error::InvalidConfig(format!(
                    "duplicate repository name: '{}'",
                    repository.name
                )));
            }
        }
        Ok(())
    }

    /// The first configured repository.
    pub fn primary(&self) -> Option<&Repository> {
        self.repositories.first()
    }

    /// Look up a repository by name.
    pub fn get(&self, name: &str) -> Option<&Repository> {
        self.repositories.iter().find(|r| r.name == name)
    }

    /// Whether a repository with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Repository names in configuration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.repositories.iter().map(|r| r.name.as_str())
    }

    /// Iterate repositories in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &Repository> {
        self.repositories.iter()
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }
}
