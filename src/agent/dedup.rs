//! Duplicate-call suppression (§3, §4.6): identity of a call is
//! `name || canonical-json(arguments)`; a repeated call within the same
//! agent run gets a synthetic result instead of being re-executed.

use std::collections::HashSet;

use crate::llm::types::ToolCall;

const DUPLICATE_NOTICE: &str = "你已经读取过该内容，请直接使用之前的结果，无需重复调用。";

pub struct DuplicateCallTracker {
    seen: HashSet<String>,
}

impl DuplicateCallTracker {
    pub fn new() -> Self {
        Self { seen: HashSet::new() }
    }

    /// Records the call and returns `true` if an identical call (by
    /// `name || canonical-json(arguments)`) was already seen this run.
    pub fn check_and_record(&mut self, call: &ToolCall) -> bool {
        !self.seen.insert(call.dedup_key())
    }

    pub fn duplicate_notice() -> &'static str {
        DUPLICATE_NOTICE
    }
}

impl Default for DuplicateCallTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall { id: "1".to_string(), name: name.to_string(), arguments: args }
    }

    #[test]
    fn first_call_is_not_a_duplicate() {
        let mut tracker = DuplicateCallTracker::new();
        assert!(!tracker.check_and_record(&call("read_file", serde_json::json!({"path": "a.rs"}))));
    }

    #[test]
    fn repeated_identical_call_is_flagged() {
        let mut tracker = DuplicateCallTracker::new();
        tracker.check_and_record(&call("read_file", serde_json::json!({"path": "a.rs"})));
        assert!(tracker.check_and_record(&call("read_file", serde_json::json!({"path": "a.rs"}))));
    }

    #[test]
    fn reordered_arguments_are_still_a_duplicate() {
        let mut tracker = DuplicateCallTracker::new();
        tracker.check_and_record(&call("read_file", serde_json::json!({"path": "a.rs", "start_line": 1})));
        assert!(tracker.check_and_record(&call("read_file", serde_json::json!({"start_line": 1, "path": "a.rs"}))));
    }

    #[test]
    fn different_arguments_are_not_a_duplicate() {
        let mut tracker = DuplicateCallTracker::new();
        tracker.check_and_record(&call("read_file", serde_json::json!({"path": "a.rs"})));
        assert!(!tracker.check_and_record(&call("read_file", serde_json::json!({"path": "b.rs"}))));
    }
}
