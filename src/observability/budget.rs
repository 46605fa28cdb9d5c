//! Budget (§4.9): usage tracking and enforcement across `session:<id>`,
//! `project:<id>`, and `global` scopes, with an optional rolling window.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

const WARNING_THRESHOLD: f64 = 0.80;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Session(String),
    Project(String),
    Global,
}

impl Scope {
    fn key(&self) -> String {
        match self {
            Scope::Session(id) => format!("session:{id}"),
            Scope::Project(id) => format!("project:{id}"),
            Scope::Global => "global".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BudgetLimit {
    pub max_amount: f64,
    /// 0 means no rolling window — usage accumulates forever.
    pub period_seconds: i64,
}

#[derive(Debug, Clone)]
struct ScopeUsage {
    entries: VecDeque<(DateTime<Utc>, f64)>,
}

#[derive(Debug, Clone)]
pub struct BudgetCheck {
    pub allowed: bool,
    pub warnings: Vec<String>,
    pub details: HashMap<String, f64>,
}

pub struct BudgetManager {
    usage: Mutex<HashMap<String, ScopeUsage>>,
    limits: HashMap<String, BudgetLimit>,
}

impl BudgetManager {
    pub fn new(limits: HashMap<String, BudgetLimit>) -> Self {
        Self { usage: Mutex::new(HashMap::new()), limits }
    }

    /// Record usage against every scope that applies to this event — the
    /// caller passes the scopes relevant to the current call (e.g. both
    /// `Session` and `Global`).
    pub async fn record_usage(&self, scopes: &[Scope], amount: f64) {
        let mut usage = self.usage.lock().await;
        let now = Utc::now();
        for scope in scopes {
            let entry = usage.entry(scope.key()).or_insert_with(|| ScopeUsage { entries: VecDeque::new() });
            entry.entries.push_back((now, amount));
        }
    }

    pub async fn check_budget(&self, scopes: &[Scope]) -> BudgetCheck {
        let mut usage = self.usage.lock().await;
        let mut warnings = Vec::new();
        let mut details = HashMap::new();
        let mut allowed = true;

        for scope in scopes {
            let key = scope.key();
            let Some(limit) = self.limits.get(&key) else { continue };

            let total = {
                let scope_usage = usage.entry(key.clone()).or_insert_with(|| ScopeUsage { entries: VecDeque::new() });
                if limit.period_seconds > 0 {
                    let cutoff = Utc::now() - chrono::Duration::seconds(limit.period_seconds);
                    scope_usage.entries.retain(|(at, _)| *at >= cutoff);
                }
                scope_usage.entries.iter().map(|(_, amount)| amount).sum::<f64>()
            };

            details.insert(key.clone(), total);

            if limit.max_amount <= 0.0 {
                continue;
            }
            let fraction = total / limit.max_amount;
            if fraction >= 1.0 {
                allowed = false;
                warnings.push(format!("{key} over budget: {total:.2}/{:.2}", limit.max_amount));
            } else if fraction >= WARNING_THRESHOLD {
                warnings.push(format!("{key} at {:.0}% of budget: {total:.2}/{:.2}", fraction * 100.0, limit.max_amount));
            }
        }

        BudgetCheck { allowed, warnings, details }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with(key: &str, max_amount: f64, period_seconds: i64) -> BudgetManager {
        BudgetManager::new(HashMap::from([(key.to_string(), BudgetLimit { max_amount, period_seconds })]))
    }

    #[tokio::test]
    async fn allows_usage_under_threshold() {
        let manager = manager_with("session:abc", 100.0, 0);
        let scope = Scope::Session("abc".to_string());
        manager.record_usage(&[scope.clone()], 10.0).await;

        let check = manager.check_budget(&[scope]).await;
        assert!(check.allowed);
        assert!(check.warnings.is_empty());
    }

    #[tokio::test]
    async fn warns_at_eighty_percent() {
        let manager = manager_with("session:abc", 100.0, 0);
        let scope = Scope::Session("abc".to_string());
        manager.record_usage(&[scope.clone()], 85.0).await;

        let check = manager.check_budget(&[scope]).await;
        assert!(check.allowed);
        assert_eq!(check.warnings.len(), 1);
    }

    #[tokio::test]
    async fn disallows_at_full_budget() {
        let manager = manager_with("global", 50.0, 0);
        let scope = Scope::Global;
        manager.record_usage(&[scope.clone()], 60.0).await;

        let check = manager.check_budget(&[scope]).await;
        assert!(!check.allowed);
    }

    #[tokio::test]
    async fn records_against_multiple_scopes_at_once() {
        let manager = BudgetManager::new(HashMap::from([
            ("session:s1".to_string(), BudgetLimit { max_amount: 100.0, period_seconds: 0 }),
            ("global".to_string(), BudgetLimit { max_amount: 1000.0, period_seconds: 0 }),
        ]));
        let scopes = vec![Scope::Session("s1".to_string()), Scope::Global];
        manager.record_usage(&scopes, 10.0).await;

        let check = manager.check_budget(&scopes).await;
        assert_eq!(check.details["session:s1"], 10.0);
        assert_eq!(check.details["global"], 10.0);
    }
}
