//! HiveMind ensemble
//!
//! Sends one prompt to N concurrent "drone" completions at spread
//! temperatures, then asks a single low-temperature arbiter call to merge
//! the candidates into one answer.

use futures::future::join_all;
use tracing::{debug, info, instrument};

use crate::ai::{
    GenerationClient, GenerationParams, SharedRenderer, SharedSink, TemplateContext,
    complete_with_sink,
};
use crate::config::SwarmConfig;
use crate::constants::swarm::{
    ARBITER_TEMPERATURE, DEFAULT_DRONES, DEFAULT_TEMPERATURE, JITTER_SPREAD, MAX_DRONES,
    MAX_TEMPERATURE, MIN_TEMPERATURE,
};
use crate::types::Result;

/// Temperature for drone `index` of `drones`.
///
/// With jitter the drones are spread evenly over `base ± JITTER_SPREAD / 2`.
pub fn drone_temperature(base: f32, index: usize, drones: usize, jitter: bool) -> f32 {
    if !jitter || drones <= 1 {
        return base.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE);
    }
    let position = index as f32 / (drones - 1) as f32;
    (base + (position - 0.5) * JITTER_SPREAD).clamp(MIN_TEMPERATURE, MAX_TEMPERATURE)
}

/// Optional live token sinks for one swarm call
#[derive(Clone, Default)]
pub struct SwarmSinks {
    /// Indexed by drone id; missing entries mean no sink
    pub drones: Vec<Option<SharedSink>>,
    pub arbiter: Option<SharedSink>,
}

impl SwarmSinks {
    /// Stream only the arbiter's answer
    pub fn arbiter_only(sink: Option<SharedSink>) -> Self {
        Self {
            drones: Vec::new(),
            arbiter: sink,
        }
    }

    fn drone(&self, index: usize) -> Option<&SharedSink> {
        self.drones.get(index).and_then(Option::as_ref)
    }
}

#[derive(Debug, Clone)]
pub struct HiveMindResult {
    /// Arbiter output
    pub text: String,
    pub drone_texts: Vec<String>,
    pub drone_temperatures: Vec<f32>,
}

#[derive(Clone)]
pub struct HiveMind {
    renderer: SharedRenderer,
    drones: usize,
    temperature: f32,
    jitter: bool,
}

impl HiveMind {
    pub fn new(renderer: SharedRenderer) -> Self {
        Self {
            renderer,
            drones: DEFAULT_DRONES,
            temperature: DEFAULT_TEMPERATURE,
            jitter: true,
        }
    }

    pub fn from_config(renderer: SharedRenderer, config: &SwarmConfig) -> Self {
        Self::new(renderer)
            .with_drones(config.drones)
            .with_temperature(config.temperature)
            .with_jitter(config.jitter)
    }

    /// Drone count, clamped to `1..=MAX_DRONES`
    pub fn with_drones(mut self, drones: usize) -> Self {
        self.drones = drones.clamp(1, MAX_DRONES);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn drones(&self) -> usize {
        self.drones
    }

    pub fn temperatures(&self) -> Vec<f32> {
        (0..self.drones)
            .map(|i| drone_temperature(self.temperature, i, self.drones, self.jitter))
            .collect()
    }

    /// Run all drones, then the arbiter. Any drone failure fails the call.
    #[instrument(skip_all, fields(drones = self.drones, client = client.name()))]
    pub async fn run(
        &self,
        client: &dyn GenerationClient,
        prompt: &str,
        max_tokens: Option<usize>,
        sinks: &SwarmSinks,
    ) -> Result<HiveMindResult> {
        let temperatures = self.temperatures();
        debug!("Drone temperatures: {:?}", temperatures);

        let calls = temperatures.iter().enumerate().map(|(i, &temperature)| {
            let params = GenerationParams {
                temperature: Some(temperature),
                max_tokens,
            };
            async move { complete_with_sink(client, prompt, &params, sinks.drone(i)).await }
        });

        let mut drone_texts = Vec::with_capacity(self.drones);
        for response in join_all(calls).await {
            drone_texts.push(response?.content);
        }

        let arbiter_prompt = self.arbiter_prompt(prompt, &drone_texts)?;
        let params = GenerationParams {
            temperature: Some(ARBITER_TEMPERATURE),
            max_tokens,
        };
        let merged = complete_with_sink(client, &arbiter_prompt, &params, sinks.arbiter.as_ref())
            .await?;

        info!(
            "Swarm merged {} candidates into {} chars",
            drone_texts.len(),
            merged.content.len()
        );

        Ok(HiveMindResult {
            text: merged.content,
            drone_texts,
            drone_temperatures: temperatures,
        })
    }

    fn arbiter_prompt(&self, prompt: &str, candidates: &[String]) -> Result<String> {
        let candidates = candidates
            .iter()
            .enumerate()
            .map(|(i, text)| format!("## Candidate drone-{}\n{}", i + 1, text.trim()))
            .collect::<Vec<_>>()
            .join("\n\n");

        self.renderer.render(
            "arbiter",
            &TemplateContext::new()
                .with("prompt", prompt)
                .with("candidates", candidates),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::TemplateSet;
    use crate::ai::provider::testing::ScriptedClient;
    use crate::ai::{ErrorCategory, TokenSink};
    use proptest::prelude::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn hive() -> HiveMind {
        HiveMind::new(Arc::new(TemplateSet::builtin()))
    }

    #[test]
    fn test_default_three_drones_spread() {
        let temps = hive().with_temperature(0.7).temperatures();
        assert_eq!(temps.len(), 3);
        assert!((temps[0] - 0.5).abs() < 1e-6);
        assert!((temps[1] - 0.7).abs() < 1e-6);
        assert!((temps[2] - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_no_jitter_or_single_drone_uses_base() {
        assert_eq!(hive().with_jitter(false).with_temperature(0.3).temperatures(), vec![0.3; 3]);
        assert_eq!(hive().with_drones(1).with_temperature(0.3).temperatures(), vec![0.3]);
        assert_eq!(hive().with_drones(0).drones(), 1);
    }

    proptest! {
        #[test]
        fn prop_drone_temperatures_in_bounds(base in 0.0f32..=2.0, drones in 1usize..=16) {
            for i in 0..drones {
                let t = drone_temperature(base, i, drones, true);
                prop_assert!((MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&t));
                prop_assert!((t - base).abs() <= JITTER_SPREAD / 2.0 + 1e-5);
            }
        }

        #[test]
        fn prop_drone_temperatures_symmetric(base in 0.2f32..=1.8, drones in 2usize..=16) {
            for i in 0..drones {
                let low = drone_temperature(base, i, drones, true);
                let high = drone_temperature(base, drones - 1 - i, drones, true);
                prop_assert!(((low - base) + (high - base)).abs() < 1e-4);
            }
        }
    }

    #[tokio::test]
    async fn test_run_calls_drones_then_arbiter() {
        let client = ScriptedClient::new("mock")
            .with_delay(Duration::from_millis(5))
            .with_responder(|prompt, params| {
                if prompt.contains("Candidate drone-") {
                    Ok(format!("merged at {:?}", params.temperature))
                } else {
                    Ok(format!("draft at {:?}", params.temperature))
                }
            });

        let result = hive()
            .run(&client, "design it", Some(100), &SwarmSinks::default())
            .await
            .unwrap();

        assert_eq!(result.drone_texts.len(), 3);
        assert_eq!(result.text, format!("merged at {:?}", Some(ARBITER_TEMPERATURE)));
        assert_eq!(client.call_count(), 4);
        assert_eq!(client.max_active(), 3);

        let calls = client.calls();
        let arbiter = &calls[3];
        assert!(arbiter.prompt.contains("design it"));
        assert!(arbiter.prompt.contains("## Candidate drone-1"));
        assert!(arbiter.prompt.contains("## Candidate drone-3"));
        assert!(calls.iter().all(|c| c.params.max_tokens == Some(100)));
    }

    #[tokio::test]
    async fn test_drone_failure_fails_swarm() {
        let client = ScriptedClient::new("mock")
            .reply("a")
            .fail(ErrorCategory::Network)
            .with_fallback("c");

        let result = hive()
            .run(&client, "p", None, &SwarmSinks::default())
            .await;
        assert!(result.is_err());
        // no arbiter call after a failed drone
        assert_eq!(client.call_count(), 3);
    }

    #[derive(Default)]
    struct Record(Mutex<Vec<String>>);

    impl TokenSink for Record {
        fn on_token(&self, _token: &str) {}

        fn on_completion(&self, text: &str) {
            self.0.lock().unwrap().push(text.to_string());
        }
    }

    #[tokio::test]
    async fn test_sinks_receive_their_own_completion() {
        let client = ScriptedClient::new("mock").with_responder(|prompt, _| {
            Ok(if prompt.contains("Candidate") { "final" } else { "draft" }.to_string())
        });
        let drone = Arc::new(Record::default());
        let arbiter = Arc::new(Record::default());
        let sinks = SwarmSinks {
            drones: vec![Some(drone.clone() as SharedSink)],
            arbiter: Some(arbiter.clone() as SharedSink),
        };

        hive().run(&client, "p", None, &sinks).await.unwrap();

        assert_eq!(*drone.0.lock().unwrap(), vec!["draft"]);
        assert_eq!(*arbiter.0.lock().unwrap(), vec!["final"]);
    }
}
