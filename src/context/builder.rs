//! `ContextBuilder` (§4.5): ordered, budget-aware section assembly.
//!
//! Generalizes the teacher's `AssembledContext::format_for_prompt` /
//! `format_for_deepseek` — which hand-order a fixed list of sections and cap
//! each by a per-kind count — into named sources with declared priorities
//! and a shared token budget, per the design's trimming algorithm.

use async_trait::async_trait;

use crate::context::section::{Section, SectionMeta};
use crate::llm::tokenizer::truncate_to_tokens;

/// Safety margin subtracted from the remaining budget before trimming a
/// section to fit, so the trailing truncation marker never pushes a section
/// back over budget.
const TRIM_SAFETY_MARGIN_TOKENS: u32 = 10;

/// One named, priority-ordered input to the system prompt. A source's
/// `priority()` is fixed; `gather` may return zero, one, or several
/// sections (e.g. the RAG source may emit one section per hit).
#[async_trait]
pub trait ContextSource: Send + Sync {
    fn priority(&self) -> u32;
    async fn gather(&self, remaining_budget: u32) -> Vec<Section>;
}

pub struct ContextBuilder {
    sources: Vec<Box<dyn ContextSource>>,
}

pub struct BuildOutput {
    pub prompt: String,
    pub sections: Option<Vec<SectionMeta>>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self { sources: Vec::new() }
    }

    pub fn with_source(mut self, source: Box<dyn ContextSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Assemble the system prompt from all sources within `budget_tokens`.
    /// Sources are walked in ascending priority order (lower number first);
    /// each returned section is kept as-is if it fits, shrunk to fit if
    /// `trimmable`, or dropped otherwise.
    pub async fn build(&self, budget_tokens: u32, return_sections: bool) -> BuildOutput {
        let mut ordered: Vec<&Box<dyn ContextSource>> = self.sources.iter().collect();
        ordered.sort_by_key(|s| s.priority());

        let mut remaining = budget_tokens;
        let mut kept_contents = Vec::new();
        let mut metas = Vec::new();

        for source in ordered {
            for section in source.gather(remaining).await {
                let tokens = section.estimated_tokens();
                if tokens <= remaining {
                    remaining -= tokens;
                    if return_sections {
                        metas.push(SectionMeta {
                            name: section.name.clone(),
                            priority: section.priority,
                            kept: true,
                            trimmed: false,
                            tokens,
                        });
                    }
                    kept_contents.push(section.content);
                } else if section.trimmable {
                    let target = remaining.saturating_sub(TRIM_SAFETY_MARGIN_TOKENS);
                    let shrunk = truncate_to_tokens(&section.content, target);
                    let shrunk_tokens = crate::llm::tokenizer::estimate_tokens(&shrunk);
                    remaining = remaining.saturating_sub(shrunk_tokens);
                    if return_sections {
                        metas.push(SectionMeta {
                            name: section.name.clone(),
                            priority: section.priority,
                            kept: true,
                            trimmed: true,
                            tokens: shrunk_tokens,
                        });
                    }
                    kept_contents.push(shrunk);
                } else if return_sections {
                    metas.push(SectionMeta {
                        name: section.name.clone(),
                        priority: section.priority,
                        kept: false,
                        trimmed: false,
                        tokens,
                    });
                }
            }
        }

        BuildOutput {
            prompt: kept_contents.join("\n\n"),
            sections: return_sections.then_some(metas),
        }
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource {
        priority: u32,
        section: Section,
    }

    #[async_trait]
    impl ContextSource for FixedSource {
        fn priority(&self) -> u32 {
            self.priority
        }

        async fn gather(&self, _remaining_budget: u32) -> Vec<Section> {
            vec![self.section.clone()]
        }
    }

    #[tokio::test]
    async fn keeps_sections_in_priority_order_when_budget_allows() {
        let builder = ContextBuilder::new()
            .with_source(Box::new(FixedSource {
                priority: 20,
                section: Section::new("tool_strategy", "use tools wisely", 20, false),
            }))
            .with_source(Box::new(FixedSource {
                priority: 0,
                section: Section::new("anti_fabrication", "never claim unexecuted actions", 0, false),
            }));

        let output = builder.build(10_000, false).await;
        let anti_pos = output.prompt.find("never claim").unwrap();
        let tool_pos = output.prompt.find("use tools").unwrap();
        assert!(anti_pos < tool_pos);
    }

    #[tokio::test]
    async fn non_trimmable_section_is_dropped_when_over_budget() {
        let builder = ContextBuilder::new().with_source(Box::new(FixedSource {
            priority: 50,
            section: Section::new("memory", "x".repeat(10_000), 50, false),
        }));

        let output = builder.build(1, true).await;
        assert!(output.prompt.is_empty());
        let metas = output.sections.unwrap();
        assert_eq!(metas.len(), 1);
        assert!(!metas[0].kept);
    }

    #[tokio::test]
    async fn trimmable_section_is_shrunk_to_fit() {
        let builder = ContextBuilder::new().with_source(Box::new(FixedSource {
            priority: 45,
            section: Section::new("rag", "a".repeat(10_000), 45, true),
        }));

        let output = builder.build(20, true).await;
        assert!(!output.prompt.is_empty());
        assert!(output.prompt.len() < 10_000);
        let metas = output.sections.unwrap();
        assert!(metas[0].kept);
        assert!(metas[0].trimmed);
    }
}
