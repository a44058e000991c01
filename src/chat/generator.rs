//! Simulated reply generation.
//!
//! There is no model behind this: a reply is one of a few fixed templates
//! wrapped around the user's text, returned after a random delay that stands
//! in for backend latency.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::chat::core::config::ResponderConfig;

/// Reply templates. `{input}` is replaced by the user's message.
const TEMPLATES: [&str; 4] = [
    "I understand what you mean, you are saying {input}, right?",
    "On this question, my view is that {input} involves several aspects.",
    "The point you raised, {input}, is a very valuable question.",
    "Let me think about it, {input} can be looked at from several angles.",
];

/// Produces a reply for a user message. Never fails.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Generate a reply to `input`.
    async fn generate(&self, input: &str) -> String;
}

/// Template-based generator with an artificial delay.
#[derive(Clone, Debug)]
pub struct TemplateResponder {
    delay_min: Duration,
    delay_max: Duration,
}

impl TemplateResponder {
    /// Create a responder whose delay is drawn uniformly from `[delay_min, delay_max]`.
    ///
    /// Bounds given in the wrong order are swapped.
    #[must_use]
    pub fn new(delay_min: Duration, delay_max: Duration) -> Self {
        if delay_min <= delay_max {
            Self {
                delay_min,
                delay_max,
            }
        } else {
            Self {
                delay_min: delay_max,
                delay_max: delay_min,
            }
        }
    }

    /// Responder that replies immediately.
    #[must_use]
    pub const fn instant() -> Self {
        Self {
            delay_min: Duration::ZERO,
            delay_max: Duration::ZERO,
        }
    }

    /// Build from configuration.
    #[must_use]
    pub fn from_config(config: &ResponderConfig) -> Self {
        Self::new(config.delay_min(), config.delay_max())
    }

    /// Every reply this responder could produce for `input`.
    #[must_use]
    pub fn candidate_replies(input: &str) -> Vec<String> {
        TEMPLATES.iter().map(|t| render(t, input)).collect()
    }

    fn pick(&self, input: &str) -> (Duration, String) {
        // ThreadRng is not Send, keep it out of the await
        let mut rng = rand::thread_rng();
        let delay = if self.delay_min == self.delay_max {
            self.delay_min
        } else {
            rng.gen_range(self.delay_min..=self.delay_max)
        };
        let template = TEMPLATES[rng.gen_range(0..TEMPLATES.len())];
        (delay, render(template, input))
    }
}

impl Default for TemplateResponder {
    fn default() -> Self {
        Self::from_config(&ResponderConfig::default())
    }
}

#[async_trait]
impl ResponseGenerator for TemplateResponder {
    async fn generate(&self, input: &str) -> String {
        let (delay, reply) = self.pick(input);
        tracing::debug!(?delay, "simulating reply latency");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        reply
    }
}

fn render(template: &str, input: &str) -> String {
    template.replace("{input}", input)
}
