//! `ask_user(questions)` (§4.3): returns a fixed confirmation; the executor
//! is responsible for emitting `ask_user_pending` to halt the agent loop.

pub fn ask_user(questions: &[String]) -> String {
    let _ = questions;
    "Questions recorded; awaiting user response.".to_string()
}
