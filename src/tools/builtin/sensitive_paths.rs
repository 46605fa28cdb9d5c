//! Sensitive-path classification shared by `read_file` and `search_text`.
//!
//! Deny-list matches are rejected unless the file name is also in the
//! well-known config allow-list, which takes precedence (§4.3).

const DENY_PATTERNS: &[&str] = &[
    ".env",
    ".pem",
    ".key",
    "id_rsa",
    "id_ed25519",
    "credentials",
    "secrets",
    ".npmrc",
    ".netrc",
    "shadow",
    ".aws/credentials",
    ".ssh/",
];

const ALLOW_OVERRIDES: &[&str] = &[
    "package.json",
    "package-lock.json",
    "Cargo.toml",
    "Cargo.lock",
    "tsconfig.json",
    "pyproject.toml",
    "go.mod",
    "go.sum",
    ".env.example",
    ".env.sample",
];

/// True if `path` (as seen relative to the workspace) should be rejected as sensitive.
pub fn is_sensitive(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    let file_name = path.rsplit('/').next().unwrap_or(path);

    if ALLOW_OVERRIDES.iter().any(|a| file_name.eq_ignore_ascii_case(a)) {
        return false;
    }

    DENY_PATTERNS.iter().any(|pattern| lower.contains(&pattern.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_dotenv_but_allows_example() {
        assert!(is_sensitive(".env"));
        assert!(is_sensitive("config/.env"));
        assert!(!is_sensitive(".env.example"));
    }

    #[test]
    fn allow_list_overrides_deny_match() {
        // "secrets" would otherwise match the deny pattern via substring on path,
        // but an exact allow-listed file name wins.
        assert!(!is_sensitive("package.json"));
    }

    #[test]
    fn rejects_ssh_keys() {
        assert!(is_sensitive(".ssh/id_rsa"));
        assert!(is_sensitive("keys/server.pem"));
    }
}
