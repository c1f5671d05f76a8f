//! Defaulting engine for PerconaServerMongoDB specs
//!
//! Every rule only fills a field that is unset (empty string, zero or
//! absent block), which makes [`Defaulter::apply`] idempotent and keeps
//! explicit user values intact. Defaulting never validates.

use crate::crd::{
    InMemoryEngineConfig, MongodSpec, MongodSpecInMemory, MongodSpecNet,
    MongodSpecOperationProfiling, MongodSpecStorage, MongodSpecWiredTiger, OperationProfilingMode,
    PerconaServerMongoDB, PerconaServerMongoDBSpec, Platform, ReplsetSpec, SecretsSpec,
    StorageEngine, WiredTigerCollectionConfig, WiredTigerEngineConfig, WiredTigerIndexConfig,
};

/// Deployment-tested values used for unset spec fields
#[derive(Clone, Debug, PartialEq)]
pub struct Defaults {
    pub version: String,
    pub image_pull_policy: String,
    pub key_secret_name: String,
    pub users_secret_name: String,
    pub mongod_port: i32,
    pub storage_engine: StorageEngine,
    pub wired_tiger_cache_size_ratio: f64,
    pub in_memory_size_ratio: f64,
    pub operation_profiling_mode: OperationProfilingMode,
    pub replset_name: String,
    pub replset_size: i32,
    pub run_uid: i64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            version: "latest".to_string(),
            image_pull_policy: "IfNotPresent".to_string(),
            key_secret_name: "percona-server-mongodb-key".to_string(),
            users_secret_name: "percona-server-mongodb-users".to_string(),
            mongod_port: 27017,
            storage_engine: StorageEngine::WiredTiger,
            wired_tiger_cache_size_ratio: 0.5,
            in_memory_size_ratio: 0.9,
            operation_profiling_mode: OperationProfilingMode::SlowOp,
            replset_name: "rs".to_string(),
            replset_size: 3,
            run_uid: 1001,
        }
    }
}

/// Decides which platform variant a cluster is deployed onto
pub trait PlatformProbe: Send + Sync {
    fn platform(&self, cluster: &PerconaServerMongoDB) -> Platform;
}

/// Always reports the same platform
#[derive(Clone, Copy, Debug, Default)]
pub struct FixedPlatform(pub Platform);

impl PlatformProbe for FixedPlatform {
    fn platform(&self, _cluster: &PerconaServerMongoDB) -> Platform {
        self.0
    }
}

/// Platform detected from the API server at start-up, overridable per cluster
/// through `spec.platform`
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerPlatform {
    pub detected: Platform,
}

impl PlatformProbe for ServerPlatform {
    fn platform(&self, cluster: &PerconaServerMongoDB) -> Platform {
        cluster.spec.platform.unwrap_or(self.detected)
    }
}

/// Fills unset fields of a cluster spec from a [`Defaults`] table
pub struct Defaulter {
    defaults: Defaults,
    platform: Box<dyn PlatformProbe>,
}

impl Defaulter {
    pub fn new(defaults: Defaults, platform: impl PlatformProbe + 'static) -> Self {
        Self {
            defaults,
            platform: Box::new(platform),
        }
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    /// Return a defaulted copy of the cluster's spec.
    ///
    /// The copy belongs to the caller for the current reconcile pass and is
    /// not written back to the stored resource.
    pub fn apply(&self, cluster: &PerconaServerMongoDB) -> PerconaServerMongoDBSpec {
        let mut spec = cluster.spec.clone();
        self.apply_to(&mut spec, self.platform.platform(cluster));
        spec
    }

    /// Default `spec` in place for a known platform.
    pub fn apply_to(&self, spec: &mut PerconaServerMongoDBSpec, platform: Platform) {
        let d = &self.defaults;

        if spec.version.is_empty() {
            spec.version = d.version.clone();
        }
        if spec.image_pull_policy.is_empty() {
            spec.image_pull_policy = d.image_pull_policy.clone();
        }

        let secrets = spec.secrets.get_or_insert_with(SecretsSpec::default);
        if secrets.key.is_empty() {
            secrets.key = d.key_secret_name.clone();
        }
        if secrets.users.is_empty() {
            secrets.users = d.users_secret_name.clone();
        }

        let mongod = spec.mongod.get_or_insert_with(MongodSpec::default);
        let net = mongod.net.get_or_insert_with(MongodSpecNet::default);
        if net.port == 0 {
            net.port = d.mongod_port;
        }

        let storage = mongod
            .storage
            .get_or_insert_with(MongodSpecStorage::default);
        let engine = *storage.engine.get_or_insert(d.storage_engine);
        match engine {
            StorageEngine::InMemory => self.default_in_memory(storage),
            StorageEngine::WiredTiger => self.default_wired_tiger(storage),
        }

        mongod
            .operation_profiling
            .get_or_insert_with(|| MongodSpecOperationProfiling {
                mode: d.operation_profiling_mode,
                ..Default::default()
            });

        if spec.replsets.is_empty() {
            spec.replsets.push(ReplsetSpec {
                name: d.replset_name.clone(),
                size: d.replset_size,
                storage_class: None,
            });
        } else {
            for replset in spec.replsets.iter_mut().filter(|r| r.size == 0) {
                replset.size = d.replset_size;
            }
        }

        if spec.run_uid.is_none() && platform != Platform::Openshift {
            spec.run_uid = Some(d.run_uid);
        }
    }

    fn default_in_memory(&self, storage: &mut MongodSpecStorage) {
        let engine_config = storage
            .in_memory
            .get_or_insert_with(MongodSpecInMemory::default)
            .engine_config
            .get_or_insert_with(InMemoryEngineConfig::default);
        if engine_config.in_memory_size_ratio == 0.0 {
            engine_config.in_memory_size_ratio = self.defaults.in_memory_size_ratio;
        }
    }

    fn default_wired_tiger(&self, storage: &mut MongodSpecStorage) {
        let wt = storage
            .wired_tiger
            .get_or_insert_with(MongodSpecWiredTiger::default);
        wt.collection_config
            .get_or_insert_with(WiredTigerCollectionConfig::default);
        let engine_config = wt
            .engine_config
            .get_or_insert_with(WiredTigerEngineConfig::default);
        if engine_config.cache_size_ratio == 0.0 {
            engine_config.cache_size_ratio = self.defaults.wired_tiger_cache_size_ratio;
        }
        wt.index_config.get_or_insert(WiredTigerIndexConfig {
            prefix_compression: true,
        });
    }
}

impl Default for Defaulter {
    fn default() -> Self {
        Self::new(Defaults::default(), ServerPlatform::default())
    }
}

impl std::fmt::Debug for Defaulter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Defaulter")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}
