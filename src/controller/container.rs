//! mongod container builder
//!
//! Turns a defaulted cluster spec into the single mongod container of a
//! replica-set pod, including its command-line flags.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvFromSource, EnvVar, ExecAction, Probe,
    ResourceRequirements as K8sResources, SecretEnvSource, SecurityContext, TCPSocketAction,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::crd::{
    EngineSettings, MongodSpec, OperationProfilingMode, PerconaServerMongoDBSpec, ReplsetSpec,
    ResourceSpecRequirements, ResourcesSpec,
};
use crate::error::{Error, Result};

pub const MONGOD_CONTAINER_NAME: &str = "mongod";
pub const MONGOS_CONTAINER_NAME: &str = "mongos";
pub const MONGODB_PORT_NAME: &str = "mongodb";
pub const MONGOD_DATA_DIR: &str = "/data/db";
pub const MONGOD_DATA_VOLUME_NAME: &str = "mongod-data";
pub const MONGOD_SECRETS_DIR: &str = "/etc/mongodb-secrets";
pub const MONGOD_KEY_FILE_NAME: &str = "mongodb-key";
pub const ENV_MONGODB_PORT: &str = "MONGODB_PORT";
pub const ENV_MONGODB_REPLSET: &str = "MONGODB_REPLSET";

const IMAGE_REPOSITORY: &str = "perconalab/percona-server-mongodb";
const GIGABYTE: f64 = 1024.0 * 1024.0 * 1024.0;
const MIN_WIRED_TIGER_CACHE_SIZE_GB: f64 = 0.25;

const RESOURCE_CPU: &str = "cpu";
const RESOURCE_MEMORY: &str = "memory";
const RESOURCE_STORAGE: &str = "storage";

/// Parse a memory or storage quantity into bytes.
///
/// Accepts the Kubernetes quantity forms: binary ("512Mi", "1.5Gi") and
/// decimal ("3G", "1500m") suffixes, decimal exponents ("1e9", "5E3") and
/// plain numbers.
pub fn parse_bytes(value: &str) -> Option<f64> {
    const SUFFIXES: [(&str, f64); 14] = [
        ("Ki", 1024.0),
        ("Mi", 1024.0 * 1024.0),
        ("Gi", GIGABYTE),
        ("Ti", GIGABYTE * 1024.0),
        ("Pi", GIGABYTE * 1024.0 * 1024.0),
        ("Ei", GIGABYTE * 1024.0 * 1024.0 * 1024.0),
        ("k", 1e3),
        ("K", 1e3),
        ("M", 1e6),
        ("G", 1e9),
        ("T", 1e12),
        ("P", 1e15),
        ("E", 1e18),
        ("m", 1e-3),
    ];

    let value = value.trim();
    let bytes = match parse_plain_or_exponent(value) {
        Some(n) => n,
        None => {
            let (number, multiplier) = SUFFIXES
                .iter()
                .find_map(|(suffix, mult)| value.strip_suffix(suffix).map(|n| (n, *mult)))?;
            parse_plain_or_exponent(number)? * multiplier
        }
    };
    (bytes.is_finite() && bytes >= 0.0).then_some(bytes)
}

/// A signed decimal number with an optional `e`/`E` exponent
fn parse_plain_or_exponent(value: &str) -> Option<f64> {
    let is_number_char = |c: char| c.is_ascii_digit() || matches!(c, '.' | '+' | '-' | 'e' | 'E');
    if value.is_empty() || !value.chars().all(is_number_char) {
        return None;
    }
    value.parse::<f64>().ok()
}

/// Parse a CPU quantity ("500m", "2", "0.5") into millicores
pub fn parse_millicores(value: &str) -> Option<f64> {
    let value = value.trim();
    let millis = match value.strip_suffix('m') {
        Some(n) => parse_plain_or_exponent(n)?,
        None => parse_plain_or_exponent(value)? * 1000.0,
    };
    (millis.is_finite() && millis >= 0.0).then_some(millis)
}

/// Validate the user's resource strings and convert them to Kubernetes quantities.
///
/// The storage quantity is kept so the volume-claim template can be sized from it.
pub fn parse_resource_requirements(spec: Option<&ResourcesSpec>) -> Result<K8sResources> {
    let Some(spec) = spec else {
        return Ok(K8sResources::default());
    };

    Ok(K8sResources {
        limits: parse_quantities("limits", spec.limits.as_ref())?,
        requests: parse_quantities("requests", spec.requests.as_ref())?,
        ..Default::default()
    })
}

fn parse_quantities(
    section: &str,
    reqs: Option<&ResourceSpecRequirements>,
) -> Result<Option<BTreeMap<String, Quantity>>> {
    let Some(reqs) = reqs else {
        return Ok(None);
    };

    let mut quantities = BTreeMap::new();
    for (name, value, valid) in [
        (RESOURCE_CPU, &reqs.cpu, parse_millicores(&reqs.cpu).is_some()),
        (RESOURCE_MEMORY, &reqs.memory, parse_bytes(&reqs.memory).is_some()),
        (RESOURCE_STORAGE, &reqs.storage, parse_bytes(&reqs.storage).is_some()),
    ] {
        if value.is_empty() {
            continue;
        }
        if !valid {
            return Err(Error::InvalidQuantity {
                field: format!("{section}.{name}"),
                value: value.clone(),
            });
        }
        quantities.insert(name.to_string(), Quantity(value.clone()));
    }

    Ok((!quantities.is_empty()).then_some(quantities))
}

/// Storage size for the data volume claim: limit first, then request
pub fn storage_quantity(resources: &K8sResources) -> Option<Quantity> {
    [&resources.limits, &resources.requests]
        .into_iter()
        .flatten()
        .find_map(|m| m.get(RESOURCE_STORAGE).cloned())
}

fn memory_limit_bytes(resources: &K8sResources) -> Option<f64> {
    resources
        .limits
        .as_ref()
        .and_then(|l| l.get(RESOURCE_MEMORY))
        .and_then(|q| parse_bytes(&q.0))
        .filter(|bytes| *bytes > 0.0)
}

/// WiredTiger cache size: (memory limit - 1GB) * ratio, never below 0.25GB
pub fn wired_tiger_cache_size_gb(memory_limit_bytes: f64, cache_ratio: f64) -> f64 {
    let size_gb = (memory_limit_bytes - GIGABYTE) * cache_ratio / GIGABYTE;
    size_gb.max(MIN_WIRED_TIGER_CACHE_SIZE_GB)
}

pub fn in_memory_size_gb(memory_limit_bytes: f64, size_ratio: f64) -> f64 {
    memory_limit_bytes * size_ratio / GIGABYTE
}

fn mongod_spec(spec: &PerconaServerMongoDBSpec) -> Result<&MongodSpec> {
    spec.mongod
        .as_ref()
        .ok_or(Error::MissingObjectKey("spec.mongod"))
}

fn mongod_port(mongod: &MongodSpec) -> i32 {
    mongod.net.as_ref().map(|n| n.port).unwrap_or_default()
}

/// Build the mongod command-line flags for one replica set
pub fn build_mongod_args(
    spec: &PerconaServerMongoDBSpec,
    replset: &ReplsetSpec,
    resources: &K8sResources,
) -> Result<Vec<String>> {
    let mongod = mongod_spec(spec)?;
    let storage = mongod
        .storage
        .as_ref()
        .ok_or(Error::MissingObjectKey("spec.mongod.storage"))?;
    let engine = storage
        .engine
        .ok_or(Error::MissingObjectKey("spec.mongod.storage.engine"))?;

    let mut args = vec![
        "--bind_ip_all".to_string(),
        "--auth".to_string(),
        format!("--dbpath={MONGOD_DATA_DIR}"),
        format!("--port={}", mongod_port(mongod)),
        format!("--replSet={}", replset.name),
        format!("--storageEngine={engine}"),
        "--clusterAuthMode=keyFile".to_string(),
        format!("--keyFile={MONGOD_SECRETS_DIR}/{MONGOD_KEY_FILE_NAME}"),
    ];

    if let Some(profiling) = &mongod.operation_profiling {
        match profiling.mode {
            OperationProfilingMode::Off => args.push("--profile=0".to_string()),
            OperationProfilingMode::SlowOp => {
                if profiling.slow_ops_threshold_ms > 0 {
                    args.push(format!("--slowms={}", profiling.slow_ops_threshold_ms));
                }
                args.push("--profile=1".to_string());
            }
            OperationProfilingMode::All => args.push("--profile=2".to_string()),
        }
        if profiling.rate_limit > 0 {
            args.push(format!("--rateLimit={}", profiling.rate_limit));
        }
    }

    let memory_limit = memory_limit_bytes(resources);
    match storage.engine_settings() {
        Some(EngineSettings::WiredTiger(wt)) => {
            if let Some(limit) = memory_limit {
                args.push(format!(
                    "--wiredTigerCacheSizeGB={:.2}",
                    wired_tiger_cache_size_gb(limit, wt.cache_size_ratio)
                ));
            }
            if let Some(compressor) = wt.block_compressor {
                args.push(format!("--wiredTigerCollectionBlockCompressor={compressor}"));
            }
            if let Some(compressor) = wt.journal_compressor {
                args.push(format!("--wiredTigerJournalCompressor={compressor}"));
            }
            if wt.directory_for_indexes {
                args.push("--wiredTigerDirectoryForIndexes".to_string());
            }
            args.push(format!(
                "--wiredTigerIndexPrefixCompression={}",
                wt.index_prefix_compression
            ));
        }
        Some(EngineSettings::InMemory(im)) => {
            if let Some(limit) = memory_limit {
                args.push(format!(
                    "--inMemorySizeGB={:.2}",
                    in_memory_size_gb(limit, im.size_ratio)
                ));
            }
        }
        None => {}
    }

    if storage.directory_per_db {
        args.push("--directoryperdb".to_string());
    }
    if storage.sync_period_secs > 0 {
        args.push(format!("--syncdelay={}", storage.sync_period_secs));
    }

    Ok(args)
}

/// Build the mongod container of a replica-set pod
pub fn build_mongod_container(
    spec: &PerconaServerMongoDBSpec,
    replset: &ReplsetSpec,
    resources: &K8sResources,
) -> Result<Container> {
    let mongod = mongod_spec(spec)?;
    let port = mongod_port(mongod);
    let host_port = mongod
        .net
        .as_ref()
        .map(|n| n.host_port)
        .filter(|p| *p > 0);
    let key_secret = spec
        .secrets
        .as_ref()
        .map(|s| s.key.clone())
        .ok_or(Error::MissingObjectKey("spec.secrets"))?;
    let users_secret = spec
        .secrets
        .as_ref()
        .map(|s| s.users.clone())
        .unwrap_or_default();

    // The storage quantity belongs to the volume claim, not the container.
    let container_resources = K8sResources {
        limits: without_storage(&resources.limits),
        requests: without_storage(&resources.requests),
        ..Default::default()
    };

    Ok(Container {
        name: MONGOD_CONTAINER_NAME.to_string(),
        image: Some(format!("{IMAGE_REPOSITORY}:{}", spec.version)),
        image_pull_policy: Some(spec.image_pull_policy.clone()),
        args: Some(build_mongod_args(spec, replset, resources)?),
        ports: Some(vec![ContainerPort {
            name: Some(MONGODB_PORT_NAME.to_string()),
            container_port: port,
            host_port,
            ..Default::default()
        }]),
        env: Some(vec![
            EnvVar {
                name: ENV_MONGODB_PORT.to_string(),
                value: Some(port.to_string()),
                ..Default::default()
            },
            EnvVar {
                name: ENV_MONGODB_REPLSET.to_string(),
                value: Some(replset.name.clone()),
                ..Default::default()
            },
        ]),
        env_from: Some(vec![EnvFromSource {
            secret_ref: Some(SecretEnvSource {
                name: Some(users_secret),
                optional: Some(false),
            }),
            ..Default::default()
        }]),
        working_dir: Some(MONGOD_DATA_DIR.to_string()),
        liveness_probe: Some(Probe {
            exec: Some(ExecAction {
                command: Some(vec![
                    "mongodb-healthcheck".to_string(),
                    "k8s".to_string(),
                    "liveness".to_string(),
                ]),
            }),
            initial_delay_seconds: Some(45),
            timeout_seconds: Some(2),
            period_seconds: Some(10),
            failure_threshold: Some(12),
            ..Default::default()
        }),
        readiness_probe: Some(Probe {
            tcp_socket: Some(TCPSocketAction {
                port: IntOrString::Int(port),
                ..Default::default()
            }),
            initial_delay_seconds: Some(10),
            timeout_seconds: Some(2),
            period_seconds: Some(3),
            failure_threshold: Some(8),
            ..Default::default()
        }),
        resources: Some(container_resources),
        security_context: Some(SecurityContext {
            // The kubelet refuses runAsNonRoot together with uid 0.
            run_as_non_root: (spec.run_uid != Some(0)).then_some(true),
            run_as_user: spec.run_uid,
            ..Default::default()
        }),
        volume_mounts: Some(vec![
            VolumeMount {
                name: MONGOD_DATA_VOLUME_NAME.to_string(),
                mount_path: MONGOD_DATA_DIR.to_string(),
                ..Default::default()
            },
            VolumeMount {
                name: key_secret,
                mount_path: MONGOD_SECRETS_DIR.to_string(),
                read_only: Some(true),
                ..Default::default()
            },
        ]),
        ..Default::default()
    })
}

fn without_storage(
    quantities: &Option<BTreeMap<String, Quantity>>,
) -> Option<BTreeMap<String, Quantity>> {
    let filtered: BTreeMap<String, Quantity> = quantities
        .iter()
        .flatten()
        .filter(|(name, _)| name.as_str() != RESOURCE_STORAGE)
        .map(|(name, q)| (name.clone(), q.clone()))
        .collect();
    (!filtered.is_empty()).then_some(filtered)
}
