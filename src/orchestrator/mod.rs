use std::sync::Arc;

use anyhow::Result;
use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::info;

use crate::config::Config;
use crate::session::{self, ClientSpec, Mode};

/// Spawns one session task per configured client and waits for all of them
/// to reach a terminal state. No results are aggregated.
pub struct Orchestrator {
    config: Arc<Config>,
    mode: Mode,
}

impl Orchestrator {
    pub fn new(config: Arc<Config>, mode: Mode) -> Self {
        Self { config, mode }
    }

    pub async fn run(&self) -> Result<()> {
        self.config.validate()?;

        let fleet = build_fleet(&self.config, &mut rand::rng());
        info!(
            "Spawning {} client sessions against {}",
            fleet.len(),
            self.config.server_url
        );

        let mut tasks = vec![];
        for spec in fleet {
            let config = self.config.clone();
            let mode = self.mode;
            tasks.push(tokio::spawn(session::run(config, spec, mode)));
        }

        for task in tasks {
            task.await.ok();
        }

        info!("All {} sessions finished", self.config.clients);
        Ok(())
    }
}

/// One spec per client, ids starting at 1, each message drawn independently
/// and uniformly from the configured set. The RNG is a parameter so tests
/// can seed it.
pub fn build_fleet(config: &Config, rng: &mut impl Rng) -> Vec<ClientSpec> {
    let mut fleet = Vec::with_capacity(config.clients);
    for id in 1..=config.clients as u64 {
        if let Some(message) = config.messages.choose(rng) {
            fleet.push(ClientSpec {
                id,
                message: message.clone(),
            });
        }
    }
    fleet
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn fleet_covers_every_client_with_a_known_message() {
        let config = Config::default();
        let mut rng = StdRng::seed_from_u64(7);
        let fleet = build_fleet(&config, &mut rng);

        assert_eq!(fleet.len(), config.clients);
        for (i, spec) in fleet.iter().enumerate() {
            assert_eq!(spec.id, i as u64 + 1);
            assert!(config.messages.contains(&spec.message));
        }
    }

    #[test]
    fn fleet_is_deterministic_under_a_fixed_seed() {
        let config = Config::default();
        let first = build_fleet(&config, &mut StdRng::seed_from_u64(42));
        let second = build_fleet(&config, &mut StdRng::seed_from_u64(42));
        assert_eq!(first, second);
    }

    #[test]
    fn empty_message_set_yields_no_specs() {
        let mut config = Config::default();
        config.messages.clear();
        let fleet = build_fleet(&config, &mut StdRng::seed_from_u64(1));
        assert!(fleet.is_empty());
    }
}
