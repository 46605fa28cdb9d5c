//! Fabrication detection (§4.6): catches a model claiming it ran a tool
//! (command execution, file edits) when no tool call was actually made.

use once_cell::sync::Lazy;
use regex::RegexSet;

const MAX_FABRICATION_RETRIES: u32 = 2;

static FABRICATION_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"已执行",
        r"已删除",
        r"已创建",
        r"已修改",
        r"已安装",
        r"输出如下",
        r"执行结果[:：]",
        r"命令执行成功",
        r"(?i)no such file or directory",
        r"(?i)command (?:executed|completed) successfully",
        r"(?i)here'?s the output",
        r"(?i)i('| ha)ve (?:run|executed|deleted|created|modified|installed)",
        r"(?i)output:\s*\n",
    ])
    .expect("fabrication pattern set must compile")
});

/// Does `content` read like a claimed tool execution when none occurred?
pub fn looks_fabricated(content: &str) -> bool {
    !content.trim().is_empty() && FABRICATION_PATTERNS.is_match(content)
}

pub fn max_retries() -> u32 {
    MAX_FABRICATION_RETRIES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_chinese_execution_claim() {
        assert!(looks_fabricated("好的，已执行删除操作，输出如下：文件已删除"));
    }

    #[test]
    fn detects_english_execution_claim() {
        assert!(looks_fabricated("I have executed the command. Here's the output: done"));
    }

    #[test]
    fn detects_fabricated_error_message() {
        assert!(looks_fabricated("ls: cannot access 'foo': No such file or directory"));
    }

    #[test]
    fn plain_explanation_is_not_fabricated() {
        assert!(!looks_fabricated("I can help you delete that file, let me do that now."));
    }

    #[test]
    fn empty_content_is_not_fabricated() {
        assert!(!looks_fabricated("   "));
    }
}
