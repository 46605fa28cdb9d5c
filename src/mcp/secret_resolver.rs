//! Secret resolver (§4.4): resolves `{var}` placeholders in an
//! `env_template` against a three-tier precedence chain. Tokens are never
//! logged.

use std::collections::HashMap;

use crate::mcp::types::WorkspaceCredentials;

pub struct SecretResolver {
    /// Keyed by project id.
    project_credentials: HashMap<String, WorkspaceCredentials>,
    active_workspace: Option<WorkspaceCredentials>,
    global_settings: HashMap<String, String>,
}

impl SecretResolver {
    pub fn new(global_settings: HashMap<String, String>) -> Self {
        Self {
            project_credentials: HashMap::new(),
            active_workspace: None,
            global_settings,
        }
    }

    pub fn with_project_credentials(mut self, project_id: String, credentials: WorkspaceCredentials) -> Self {
        self.project_credentials.insert(project_id, credentials);
        self
    }

    pub fn with_active_workspace(mut self, credentials: WorkspaceCredentials) -> Self {
        self.active_workspace = Some(credentials);
        self
    }

    /// Look up a single variable by precedence: (1) the workspace-directory
    /// row tied to `project_id`, (2) the active workspace-directory row,
    /// (3) global settings.
    fn lookup(&self, var: &str, project_id: Option<&str>) -> Option<String> {
        if let Some(project_id) = project_id {
            if let Some(creds) = self.project_credentials.get(project_id) {
                if let Some(v) = creds.values.get(var) {
                    return Some(v.clone());
                }
            }
        }
        if let Some(creds) = &self.active_workspace {
            if let Some(v) = creds.values.get(var) {
                return Some(v.clone());
            }
        }
        self.global_settings.get(var).cloned()
    }

    /// Produce the environment map for a subprocess/HTTP call by resolving
    /// every `{var}` placeholder in `env_template`. Empty values and
    /// unresolved placeholders are dropped from the result.
    pub fn resolve(
        &self,
        env_template: &HashMap<String, String>,
        project_id: Option<&str>,
    ) -> HashMap<String, String> {
        let mut resolved = HashMap::new();
        for (key, template) in env_template {
            let value = substitute_placeholders(template, |var| self.lookup(var, project_id));
            if let Some(value) = value {
                if !value.is_empty() {
                    resolved.insert(key.clone(), value);
                }
            }
        }
        resolved
    }
}

/// Replace every `{var}` in `template` using `lookup`. Returns `None` if any
/// placeholder cannot be resolved (the whole value is dropped per spec).
fn substitute_placeholders(template: &str, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    let mut out = String::new();
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < template.len() {
        if bytes[i] == b'{' {
            let end = template[i..].find('}')?;
            let var = &template[i + 1..i + end];
            let value = lookup(var)?;
            out.push_str(&value);
            i += end + 1;
            continue;
        }
        let ch = template[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace(values: &[(&str, &str)]) -> WorkspaceCredentials {
        WorkspaceCredentials {
            workspace_id: "ws".into(),
            values: values.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[test]
    fn project_credentials_take_precedence() {
        let resolver = SecretResolver::new(HashMap::from([("github_token".into(), "global-token".into())]))
            .with_active_workspace(workspace(&[("github_token", "active-token")]))
            .with_project_credentials("proj-1".into(), workspace(&[("github_token", "project-token")]));

        let mut template = HashMap::new();
        template.insert("GITHUB_TOKEN".to_string(), "{github_token}".to_string());

        let resolved = resolver.resolve(&template, Some("proj-1"));
        assert_eq!(resolved.get("GITHUB_TOKEN"), Some(&"project-token".to_string()));
    }

    #[test]
    fn falls_back_to_active_workspace_then_global() {
        let resolver = SecretResolver::new(HashMap::from([("workspace_path".into(), "/global/ws".into())]))
            .with_active_workspace(workspace(&[("github_token", "active-token")]));

        let mut template = HashMap::new();
        template.insert("GITHUB_TOKEN".to_string(), "{github_token}".to_string());
        template.insert("WORKSPACE".to_string(), "{workspace_path}".to_string());

        let resolved = resolver.resolve(&template, None);
        assert_eq!(resolved.get("GITHUB_TOKEN"), Some(&"active-token".to_string()));
        assert_eq!(resolved.get("WORKSPACE"), Some(&"/global/ws".to_string()));
    }

    #[test]
    fn unresolved_placeholder_drops_the_value() {
        let resolver = SecretResolver::new(HashMap::new());
        let mut template = HashMap::new();
        template.insert("X".to_string(), "{missing_var}".to_string());

        let resolved = resolver.resolve(&template, None);
        assert!(!resolved.contains_key("X"));
    }

    #[test]
    fn empty_resolved_value_is_dropped() {
        let resolver = SecretResolver::new(HashMap::from([("empty".into(), "".into())]));
        let mut template = HashMap::new();
        template.insert("X".to_string(), "{empty}".to_string());

        let resolved = resolver.resolve(&template, None);
        assert!(!resolved.contains_key("X"));
    }
}
