//! Skill engine (C13): loads skill specs from disk and composes the active
//! ones into a single system prompt block plus a tool-hint list.
//!
//! New relative to the teacher, but grounded on the same "ordered sources
//! into one prompt block" idiom as [`crate::context::builder::ContextBuilder`]
//! — a skill is just another [`ContextSource`], registered at
//! [`crate::context::section::priority::ACTIVE_SKILLS`].

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::context::builder::ContextSource;
use crate::context::section::{priority, Section};

const FRONTMATTER_FENCE: &str = "+++";

#[derive(Debug, Error)]
pub enum SkillError {
    #[error("failed to read skill directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("skill file '{0}' is missing a +++ frontmatter block")]
    MissingFrontmatter(String),
    #[error("skill file '{0}' has invalid frontmatter: {1}")]
    InvalidFrontmatter(String, toml::de::Error),
}

#[derive(Debug, Deserialize)]
struct SkillFrontmatter {
    name: String,
    description: String,
    #[serde(default)]
    tool_hints: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Skill {
    pub name: String,
    pub description: String,
    pub instructions: String,
    pub tool_hints: Vec<String>,
}

/// Splits a skill file on its `+++` frontmatter fences and parses the TOML
/// header, e.g.:
///
/// ```text
/// +++
/// name = "bug_triage"
/// description = "Triage an incoming bug report"
/// tool_hints = ["read_file", "search_text"]
/// +++
/// Read the report, reproduce the failure, then narrow down the change...
/// ```
fn parse_skill_file(label: &str, content: &str) -> Result<Skill, SkillError> {
    let rest = content
        .strip_prefix(FRONTMATTER_FENCE)
        .ok_or_else(|| SkillError::MissingFrontmatter(label.to_string()))?;
    let (header, body) = rest
        .split_once(FRONTMATTER_FENCE)
        .ok_or_else(|| SkillError::MissingFrontmatter(label.to_string()))?;

    let frontmatter: SkillFrontmatter =
        toml::from_str(header.trim()).map_err(|e| SkillError::InvalidFrontmatter(label.to_string(), e))?;

    Ok(Skill {
        name: frontmatter.name,
        description: frontmatter.description,
        instructions: body.trim().to_string(),
        tool_hints: frontmatter.tool_hints,
    })
}

/// Loads and activates skill specs, and exposes the active set as a single
/// context source.
pub struct SkillEngine {
    catalog: Vec<Skill>,
    active: HashSet<String>,
}

impl SkillEngine {
    pub fn new(catalog: Vec<Skill>) -> Self {
        Self { catalog, active: HashSet::new() }
    }

    /// Loads every `*.md` file in `dir` as a skill spec, sorted by file name
    /// for deterministic ordering. None are active until [`Self::activate`]
    /// is called.
    pub fn load_dir(dir: &Path) -> Result<Self, SkillError> {
        let mut entries: Vec<_> = fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "md"))
            .collect();
        entries.sort_by_key(|e| e.file_name());

        let mut catalog = Vec::with_capacity(entries.len());
        for entry in entries {
            let path = entry.path();
            let label = path.display().to_string();
            let content = fs::read_to_string(&path)?;
            catalog.push(parse_skill_file(&label, &content)?);
        }
        Ok(Self::new(catalog))
    }

    pub fn catalog(&self) -> &[Skill] {
        &self.catalog
    }

    /// Marks a catalog skill active by name. Returns `false` if no skill
    /// with that name was loaded.
    pub fn activate(&mut self, name: &str) -> bool {
        if self.catalog.iter().any(|s| s.name == name) {
            self.active.insert(name.to_string());
            true
        } else {
            false
        }
    }

    pub fn deactivate(&mut self, name: &str) {
        self.active.remove(name);
    }

    pub fn active_skills(&self) -> Vec<&Skill> {
        self.catalog.iter().filter(|s| self.active.contains(&s.name)).collect()
    }

    /// Deduplicated, order-preserving union of `tool_hints` across the
    /// currently active skills.
    pub fn tool_hints(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut hints = Vec::new();
        for skill in self.active_skills() {
            for hint in &skill.tool_hints {
                if seen.insert(hint.clone()) {
                    hints.push(hint.clone());
                }
            }
        }
        hints
    }
}

#[async_trait]
impl ContextSource for SkillEngine {
    fn priority(&self) -> u32 {
        priority::ACTIVE_SKILLS
    }

    async fn gather(&self, _remaining_budget: u32) -> Vec<Section> {
        let active = self.active_skills();
        if active.is_empty() {
            return Vec::new();
        }

        let mut block = String::from("# Active skills\n\n");
        for skill in &active {
            block.push_str(&format!("## {}\n{}\n\n{}\n\n", skill.name, skill.description, skill.instructions));
        }
        let hints = self.tool_hints();
        if !hints.is_empty() {
            block.push_str(&format!("Relevant tools for the active skills: {}\n", hints.join(", ")));
        }

        vec![Section::new("active_skills", block.trim_end(), priority::ACTIVE_SKILLS, true)]
    }
}
