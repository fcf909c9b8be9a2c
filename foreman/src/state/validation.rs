//! Validation records produced by the validator node, one per invocation.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Success,
    Partial,
    Failure,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ValidationRecord {
    pub step_title: String,
    pub status: ValidationStatus,
    pub reason: String,
    pub should_retry: bool,
    #[serde(default)]
    pub suggested_fix: String,
    pub at_step_index: usize,
}

impl ValidationRecord {
    pub fn is_pass(&self) -> bool {
        matches!(
            self.status,
            ValidationStatus::Success | ValidationStatus::Partial
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ValidationStatus::Partial).unwrap(),
            "\"partial\""
        );
    }

    #[test]
    fn partial_counts_as_pass() {
        let rec = ValidationRecord {
            step_title: "s".into(),
            status: ValidationStatus::Partial,
            reason: "mostly there".into(),
            should_retry: false,
            suggested_fix: String::new(),
            at_step_index: 0,
        };
        assert!(rec.is_pass());
    }
}
