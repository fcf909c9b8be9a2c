//! Token-budget coordination.
//!
//! Prevents combined prompt overflow: the frontend-supplied history and the
//! engine's own accumulated context must together fit the model window. At
//! every LLM call site a node computes
//! `effective = min(agent_default, model_limit - reserved - frontend_tokens)`
//! and compresses its state-side context down to that (see [`crate::context`]).
//!
//! The counter is a heuristic (configurable chars-per-token ratio) so the
//! module does not depend on a vendor tokenizer.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::graph;
use crate::message::Message;

/// Context window parameters for one model family.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelSpec {
    pub context_limit: u32,
    pub reserved: u32,
}

/// Model family → window table. Families are matched by exact name first,
/// then by substring, falling back to `mid-chat`.
#[derive(Clone, Debug)]
pub struct ModelTable {
    families: HashMap<String, ModelSpec>,
}

static BUILTIN: Lazy<ModelTable> = Lazy::new(|| {
    let mut families = HashMap::new();
    families.insert(
        "small-chat".to_string(),
        ModelSpec {
            context_limit: 16_385,
            reserved: 3_500,
        },
    );
    families.insert(
        "mid-chat".to_string(),
        ModelSpec {
            context_limit: 128_000,
            reserved: 3_500,
        },
    );
    families.insert(
        "large-chat".to_string(),
        ModelSpec {
            context_limit: 200_000,
            reserved: 3_500,
        },
    );
    families.insert(
        "reasoning".to_string(),
        ModelSpec {
            context_limit: 400_000,
            reserved: 3_500,
        },
    );
    ModelTable { families }
});

impl ModelTable {
    pub fn builtin() -> &'static ModelTable {
        &BUILTIN
    }

    /// Adds or overrides a family entry (operator configuration).
    pub fn with_family(mut self, name: impl Into<String>, spec: ModelSpec) -> Self {
        self.families.insert(name.into(), spec);
        self
    }

    pub fn lookup(&self, family: &str) -> ModelSpec {
        if let Some(spec) = self.families.get(family) {
            return *spec;
        }
        for (name, spec) in &self.families {
            if family.contains(name.as_str()) {
                return *spec;
            }
        }
        self.families["mid-chat"]
    }
}

/// Heuristic token counter. Default ratio is 0.25 tokens per char (~4 chars
/// per token); every message carries a small per-message overhead.
#[derive(Clone, Copy, Debug)]
pub struct TokenCounter {
    pub tokens_per_char: f64,
}

const PER_MESSAGE_OVERHEAD: u32 = 4;

impl Default for TokenCounter {
    fn default() -> Self {
        Self {
            tokens_per_char: 0.25,
        }
    }
}

impl TokenCounter {
    pub fn new(tokens_per_char: f64) -> Self {
        Self { tokens_per_char }
    }

    pub fn count(&self, text: &str) -> u32 {
        (text.len() as f64 * self.tokens_per_char).ceil() as u32
    }

    pub fn count_message(&self, message: &Message) -> u32 {
        let mut total = self.count(&message.content) + PER_MESSAGE_OVERHEAD;
        for call in &message.tool_calls {
            total += self.count(&call.name);
            total += self.count(&call.arguments.to_string());
        }
        if let Some(ref r) = message.reasoning {
            total += self.count(r);
        }
        total
    }

    pub fn count_messages(&self, messages: &[Message]) -> u32 {
        messages.iter().map(|m| self.count_message(m)).sum()
    }
}

/// Default per-node prompt limits, before the availability cap.
pub fn agent_default_limit(agent: &str) -> u32 {
    match agent {
        graph::REPORTER => 340_000,
        graph::REACT_AGENT => 14_000,
        graph::VALIDATOR | graph::COORDINATOR => 4_000,
        graph::PLANNER => 30_000,
        graph::PM_AGENT | graph::RESEARCHER | graph::CODER => 30_000,
        graph::REFLECTOR | graph::BACKGROUND_INVESTIGATOR => 8_000,
        _ => 16_000,
    }
}

/// `min(agent_default, model_limit - reserved - frontend_tokens)`, saturating.
pub fn effective_limit(spec: ModelSpec, frontend_tokens: u32, agent: &str) -> u32 {
    let available = spec
        .context_limit
        .saturating_sub(spec.reserved)
        .saturating_sub(frontend_tokens);
    agent_default_limit(agent).min(available)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_matches_defaults() {
        let t = ModelTable::builtin();
        assert_eq!(t.lookup("small-chat").context_limit, 16_385);
        assert_eq!(t.lookup("reasoning").context_limit, 400_000);
        assert_eq!(t.lookup("small-chat").reserved, 3_500);
    }

    #[test]
    fn lookup_falls_back_to_substring_then_mid_chat() {
        let t = ModelTable::builtin();
        assert_eq!(t.lookup("acme-large-chat-2").context_limit, 200_000);
        assert_eq!(t.lookup("entirely-unknown").context_limit, 128_000);
    }

    #[test]
    fn counter_rounds_up() {
        let c = TokenCounter::default();
        assert_eq!(c.count("abcde"), 2); // 5 chars * 0.25 = 1.25 -> 2
        assert_eq!(c.count(""), 0);
    }

    #[test]
    fn effective_limit_is_min_of_default_and_available() {
        let spec = ModelSpec {
            context_limit: 16_385,
            reserved: 3_500,
        };
        // 200 history messages * ~200 tokens: only ~8885 left for the reporter.
        let limit = effective_limit(spec, 4_000, graph::REPORTER);
        assert_eq!(limit, 16_385 - 3_500 - 4_000);
        // react's own default caps first when plenty is available.
        let spec = ModelSpec {
            context_limit: 128_000,
            reserved: 3_500,
        };
        assert_eq!(effective_limit(spec, 0, graph::REACT_AGENT), 14_000);
    }

    #[test]
    fn effective_limit_saturates_at_zero() {
        let spec = ModelSpec {
            context_limit: 16_385,
            reserved: 3_500,
        };
        assert_eq!(effective_limit(spec, 999_999, graph::REPORTER), 0);
    }
}
