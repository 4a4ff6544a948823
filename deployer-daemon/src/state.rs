use deployer_core::{Secrets, SettingsSnapshot};

use crate::barrier::ActivityBarrier;
use crate::deploy::Deployer;
use crate::store::SettingsStore;

/// Handles shared by the trigger modes, the webhook and the reconfiguration path.
#[derive(Clone)]
pub struct AgentState {
    pub settings: SettingsStore<SettingsSnapshot>,
    pub secrets: SettingsStore<Secrets>,
    pub barrier: ActivityBarrier,
    pub deployer: Deployer,
}

impl AgentState {
    pub fn new(settings: SettingsSnapshot, secrets: Secrets) -> Self {
        let secrets = SettingsStore::new(secrets);
        Self {
            settings: SettingsStore::new(settings),
            deployer: Deployer::new(secrets.clone()),
            secrets,
            barrier: ActivityBarrier::new(),
        }
    }
}
