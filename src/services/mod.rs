//! External collaborators of a scan.
//!
//! Every collaborator is a trait so that tests can inject doubles: the
//! disassembly tool runner, the file reputation service, the app store
//! lookup and the malware domain list. [`Services`] bundles one
//! implementation of each and is handed to the orchestrator at startup.

pub mod domains;
pub mod reputation;
pub mod store;

use crate::{
    config::Config,
    static_analysis::otool::{Otool, ToolRunner},
};
use std::sync::Arc;

/// The injectable collaborator set of a scan.
#[derive(Clone)]
pub struct Services {
    /// Disassembly tool runner.
    pub tools: Arc<dyn ToolRunner>,
    /// File reputation lookup.
    pub reputation: Arc<dyn reputation::ReputationService>,
    /// App store metadata lookup.
    pub store: Arc<dyn store::StoreService>,
    /// Malware domain list.
    pub domains: Arc<dyn domains::DomainList>,
}

impl Services {
    /// Builds the production collaborator set.
    pub fn production(config: &Config) -> Self {
        Self {
            tools: Arc::new(Otool::default()),
            reputation: Arc::new(reputation::VirusTotalClient::new(config)),
            store: Arc::new(store::ITunesClient::new(config)),
            domains: Arc::new(domains::HostListClient::new(config)),
        }
    }
}
