use serde::{Deserialize, Serialize};

/// Token counts reported for a single API call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
    pub reasoning: u64,
    pub total: u64,
}

impl TokenUsage {
    /// Build a usage record, deriving what the provider left out.
    ///
    /// A missing total is `prompt + completion`; a missing or zero reasoning
    /// count is whatever the total holds beyond prompt and completion.
    pub fn new(prompt: u64, completion: u64, reasoning: Option<u64>, total: Option<u64>) -> Self {
        let total = total.unwrap_or(prompt + completion);
        let reasoning = reasoning
            .filter(|count| *count > 0)
            .unwrap_or_else(|| total.saturating_sub(prompt + completion));
        Self {
            prompt,
            completion,
            reasoning,
            total,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prompt == 0 && self.completion == 0 && self.total == 0
    }

    /// Compact `[P:x/C:y/R:z/T:w]` form shown after each turn.
    pub fn summary(&self) -> String {
        format!(
            "[P:{}/C:{}/R:{}/T:{}]",
            self.prompt, self.completion, self.reasoning, self.total
        )
    }
}

/// Running prompt/completion counters for a whole session.
///
/// Only ever increases; callers add one completed turn at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTotals {
    pub prompt: u64,
    pub completion: u64,
}

impl TokenTotals {
    pub fn add(&mut self, usage: &TokenUsage) {
        self.prompt += usage.prompt;
        self.completion += usage.completion;
    }

    pub fn total(&self) -> u64 {
        self.prompt + self.completion
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasoning_is_derived_from_total_when_missing() {
        let usage = TokenUsage::new(10, 20, None, Some(45));
        assert_eq!(usage.reasoning, 15);

        let usage = TokenUsage::new(10, 20, Some(0), Some(30));
        assert_eq!(usage.reasoning, 0);

        let usage = TokenUsage::new(10, 20, None, None);
        assert_eq!((usage.reasoning, usage.total), (0, 30));
    }

    #[test]
    fn reported_reasoning_is_kept() {
        let usage = TokenUsage::new(15, 25, Some(5), Some(40));
        assert_eq!(usage, TokenUsage { prompt: 15, completion: 25, reasoning: 5, total: 40 });
    }

    #[test]
    fn summary_format() {
        let usage = TokenUsage::new(1, 2, Some(3), Some(6));
        assert_eq!(usage.summary(), "[P:1/C:2/R:3/T:6]");
    }

    #[test]
    fn totals_accumulate() {
        let mut totals = TokenTotals::default();
        totals.add(&TokenUsage::new(10, 5, None, None));
        totals.add(&TokenUsage::new(3, 2, None, None));
        assert_eq!(totals, TokenTotals { prompt: 13, completion: 7 });
        assert_eq!(totals.total(), 20);
    }
}
