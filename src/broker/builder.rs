/*!
 * Broker Builder
 * Builder pattern for Broker construction
 */

use super::hooks::HookTable;
use super::{Broker, BrokerInner, Services};
use crate::code::CodeRegionTable;
use crate::core::config::BrokerConfig;
use crate::dispatch::{Dispatcher, Lifecycle};
use crate::objects::ObjectTracker;
use crate::rejit::RejitManager;
use crate::services::{
    EngineControl, EngineServices, EnvironmentAccess, MetadataProvider, ProcessEnvironment,
    ThreadControl,
};
use crate::stackwalk::StackWalker;
use ahash::RandomState;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use tracing::info;

/// Builder for Broker
pub struct BrokerBuilder {
    config: BrokerConfig,
    metadata: Option<Arc<dyn MetadataProvider>>,
    threads: Option<Arc<dyn ThreadControl>>,
    control: Option<Arc<dyn EngineControl>>,
    environment: Option<Arc<dyn EnvironmentAccess>>,
}

impl BrokerBuilder {
    pub fn new() -> Self {
        Self {
            config: BrokerConfig::default(),
            metadata: None,
            threads: None,
            control: None,
            environment: None,
        }
    }

    pub fn with_config(mut self, config: BrokerConfig) -> Self {
        self.config = config;
        self
    }

    /// Register one object providing every engine collaborator
    pub fn with_engine<E>(mut self, engine: Arc<E>) -> Self
    where
        E: EngineServices + 'static,
    {
        self.metadata = Some(engine.clone());
        self.threads = Some(engine.clone());
        self.control = Some(engine);
        self
    }

    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataProvider>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_threads(mut self, threads: Arc<dyn ThreadControl>) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn with_control(mut self, control: Arc<dyn EngineControl>) -> Self {
        self.control = Some(control);
        self
    }

    /// Replace the default process environment passthrough
    pub fn with_environment(mut self, environment: Arc<dyn EnvironmentAccess>) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn build(self) -> Broker {
        let mut features = Vec::new();
        if self.metadata.is_some() {
            features.push("metadata");
        }
        if self.threads.is_some() {
            features.push("threads");
        }
        if self.control.is_some() {
            features.push("control");
        }
        if self.environment.is_some() {
            features.push("custom-environment");
        }

        let inner = BrokerInner {
            dispatcher: Dispatcher::new(self.config.slow_callback_threshold),
            lifecycle: Lifecycle::new(),
            objects: ObjectTracker::new(),
            code: CodeRegionTable::new(),
            rejit: RejitManager::new(self.config.record_rejit_history),
            walker: StackWalker::new(self.config.max_walk_depth),
            services: Services {
                metadata: self.metadata,
                threads: self.threads,
                control: self.control,
                environment: self
                    .environment
                    .unwrap_or_else(|| Arc::new(ProcessEnvironment)),
            },
            hooks: HookTable::new(),
            replaced_bodies: DashMap::with_hasher(RandomState::new()),
            jitted: DashSet::with_hasher(RandomState::new()),
            functions: DashMap::with_hasher(RandomState::new()),
            config: self.config,
        };

        if features.is_empty() {
            info!("Broker initialized without engine services");
        } else {
            info!("Broker initialized with: {}", features.join(", "));
        }

        Broker {
            inner: Arc::new(inner),
        }
    }
}

impl Default for BrokerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
