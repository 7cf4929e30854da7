//! ネットワーク・ボリュームのプロビジョニング
//!
//! コンテナ作成の前段で、スタックが必要とするリソースを冪等に揃える。
//! externalリソースは存在確認のみ行い、作成も削除もしない。

use crate::client::{ContainerEngine, labels};
use crate::error::{EngineError, Result};
use crate::naming;
use bollard::models::{Ipam, IpamConfig, NetworkCreateRequest, VolumeCreateOptions};
use stackflow_compose::{ComposeDocument, NetworkSpec, VolumeSpec};
use std::collections::HashMap;
use tracing::{debug, info};

/// プロビジョニング結果
#[derive(Debug, Clone, Default)]
pub struct ProvisionReport {
    /// 作成（または既存確認）したネットワークのDocker名
    pub networks: Vec<String>,
    /// 作成（または既存確認）したボリュームのDocker名
    pub volumes: Vec<String>,
}

/// スタックのネットワークとボリュームを揃える
///
/// - 宣言済みネットワークを作成（externalは存在確認のみ）
/// - どのネットワークにも属さないサービスがあれば `{stack}_default` を作成
/// - 宣言済み・参照済みの名前付きボリュームを作成
pub async fn provision_stack_resources<E: ContainerEngine>(
    engine: &E,
    stack: &str,
    document: &ComposeDocument,
) -> Result<ProvisionReport> {
    let mut report = ProvisionReport::default();

    for (key, spec) in &document.networks {
        let name = naming::network_docker_name(stack, key, spec);
        if spec.is_external() {
            ensure_external(engine.network_exists(&name).await?, "ネットワーク", &name)?;
            debug!(network = %name, "External network present");
        } else {
            engine
                .create_network(network_request(stack, &name, spec))
                .await?;
        }
        report.networks.push(name);
    }

    let needs_default = document.services.values().any(|s| s.networks.is_empty());
    if needs_default {
        let name = naming::default_network_name(stack);
        engine
            .create_network(network_request(stack, &name, &NetworkSpec::default()))
            .await?;
        report.networks.push(name);
    }

    // 宣言済みボリューム + サービスから参照される未宣言ボリューム
    let mut volume_specs: Vec<(String, VolumeSpec)> = document
        .volumes
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for referenced in document.referenced_volumes() {
        if !document.volumes.contains_key(&referenced) {
            volume_specs.push((referenced, VolumeSpec::default()));
        }
    }

    for (key, spec) in &volume_specs {
        let name = naming::volume_docker_name(stack, key, spec);
        if spec.is_external() {
            ensure_external(engine.volume_exists(&name).await?, "ボリューム", &name)?;
            debug!(volume = %name, "External volume present");
        } else {
            engine.create_volume(volume_options(stack, &name, spec)).await?;
        }
        report.volumes.push(name);
    }

    info!(
        stack,
        networks = report.networks.len(),
        volumes = report.volumes.len(),
        "Stack resources provisioned"
    );
    Ok(report)
}

/// スタック所有のネットワーク・ボリュームを削除する（externalは触らない）
pub async fn remove_stack_resources<E: ContainerEngine>(
    engine: &E,
    stack: &str,
    document: &ComposeDocument,
    remove_volumes: bool,
) -> Result<()> {
    for (key, spec) in &document.networks {
        if !spec.is_external() {
            engine
                .remove_network(&naming::network_docker_name(stack, key, spec))
                .await?;
        }
    }
    let needs_default = document.services.values().any(|s| s.networks.is_empty());
    if needs_default {
        engine
            .remove_network(&naming::default_network_name(stack))
            .await?;
    }

    if remove_volumes {
        for (key, spec) in &document.volumes {
            if !spec.is_external() {
                engine
                    .remove_volume(&naming::volume_docker_name(stack, key, spec), false)
                    .await?;
            }
        }
        for referenced in document.referenced_volumes() {
            if !document.volumes.contains_key(&referenced) {
                engine
                    .remove_volume(&format!("{}_{}", stack, referenced), false)
                    .await?;
            }
        }
    }
    Ok(())
}

fn ensure_external(exists: bool, kind: &str, name: &str) -> Result<()> {
    if exists {
        Ok(())
    } else {
        Err(EngineError::ExternalResourceMissing {
            kind: kind.to_string(),
            name: name.to_string(),
        })
    }
}

fn owned_labels(stack: &str, user_labels: &std::collections::BTreeMap<String, String>) -> HashMap<String, String> {
    let mut map: HashMap<String, String> = user_labels
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    map.insert(labels::STACK.to_string(), stack.to_string());
    map
}

fn network_request(stack: &str, name: &str, spec: &NetworkSpec) -> NetworkCreateRequest {
    let ipam = spec.ipam.as_ref().map(|ipam| Ipam {
        config: Some(vec![IpamConfig {
            subnet: ipam.subnet.clone(),
            gateway: ipam.gateway.clone(),
            ..Default::default()
        }]),
        ..Default::default()
    });

    NetworkCreateRequest {
        name: name.to_string(),
        driver: Some(spec.driver.clone().unwrap_or_else(|| "bridge".to_string())),
        options: if spec.driver_opts.is_empty() {
            None
        } else {
            Some(
                spec.driver_opts
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            )
        },
        ipam,
        labels: Some(owned_labels(stack, &spec.labels)),
        ..Default::default()
    }
}

fn volume_options(stack: &str, name: &str, spec: &VolumeSpec) -> VolumeCreateOptions {
    VolumeCreateOptions {
        name: Some(name.to_string()),
        driver: spec.driver.clone(),
        driver_opts: if spec.driver_opts.is_empty() {
            None
        } else {
            Some(
                spec.driver_opts
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            )
        },
        labels: Some(owned_labels(stack, &spec.labels)),
        ..Default::default()
    }
}
