//! Per-call describe context

use serde::{Deserialize, Serialize};
use std::fmt;

/// What caused a describe request to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Scheduled,
    Manual,
    #[default]
    Unspecified,
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TriggerType::Scheduled => "scheduled",
            TriggerType::Manual => "manual",
            TriggerType::Unspecified => "unspecified",
        };
        f.write_str(label)
    }
}

/// Read-only facts about one Describer invocation.
///
/// Built fresh by the dispatcher for every scope attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribeContext {
    pub account_id: String,
    pub scope: String,
    pub partition: String,
    pub trigger: TriggerType,
}

impl DescribeContext {
    pub fn new(account_id: &str, scope: &str, partition: &str, trigger: TriggerType) -> Self {
        Self {
            account_id: account_id.to_string(),
            scope: scope.to_string(),
            partition: partition.to_string(),
            trigger,
        }
    }
}
