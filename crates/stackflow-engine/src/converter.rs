//! ServiceSpec から Docker API パラメータへの変換
//!
//! Docker Engineには触れない純粋な変換。入力が同じなら出力も同じに
//! なるため、単体でテストできる。

// Bollard 0.19.4 の非推奨APIを一時的に使用
#![allow(deprecated)]

use crate::client::labels;
use crate::error::{EngineError, Result};
use crate::naming;
use bollard::container::{Config, NetworkingConfig};
use bollard::models::{
    EndpointIpamConfig, EndpointSettings, HealthConfig, HostConfig, HostConfigLogConfig,
    PortBinding, ResourcesUlimits, RestartPolicy as DockerRestartPolicy, RestartPolicyNameEnum,
};
use stackflow_compose::{
    ComposeDocument, MountSpec, NetworkAttachment, RestartPolicy, ServiceSpec, config_hash,
};
use std::collections::HashMap;
use std::path::Path;

/// 1コンテナ分の作成計画
///
/// `config`は`create_container`にそのまま渡せる。プライマリネットワーク
/// 以外への接続は作成後に`connect_network`で行うため分離している。
#[derive(Debug, Clone)]
pub struct ContainerPlan {
    pub service: String,
    pub name: String,
    pub image: String,
    pub config: Config<String>,
    /// 作成後に追加接続するネットワーク（Docker上の名前とエンドポイント設定）
    pub extra_networks: Vec<(String, EndpointSettings)>,
    pub warnings: Vec<String>,
}

/// サービス定義からコンテナ作成計画を組み立てる
pub fn build_container_plan(
    stack: &str,
    service_name: &str,
    spec: &ServiceSpec,
    document: &ComposeDocument,
    env_file: &[(String, String)],
    project_dir: &Path,
) -> Result<ContainerPlan> {
    let Some(image) = spec.image.clone() else {
        // buildのみのサービスはバリデーション段階で弾かれる想定
        return Err(EngineError::InvalidSpec(format!(
            "サービス '{}' にimageが指定されていません",
            service_name
        )));
    };

    let mut warnings = Vec::new();

    let name = match &spec.container_name {
        // 補間後も変数プレースホルダが残っている名前は使えない
        Some(explicit) if explicit.contains("${") => {
            warnings.push(format!(
                "サービス '{}' のcontainer_name '{}' に未解決の変数が残っています（既定の名前を使用します）",
                service_name, explicit
            ));
            naming::container_name(stack, service_name)
        }
        Some(explicit) => {
            warnings.push(format!(
                "サービス '{}' はcontainer_name '{}' を使用します（スタック間で衝突する可能性があります）",
                service_name, explicit
            ));
            explicit.clone()
        }
        None => naming::container_name(stack, service_name),
    };

    // 環境変数: env_fileをベースにサービス定義が上書き（宣言順で後勝ち）
    let mut env_merged: Vec<(String, String)> = Vec::new();
    for (key, value) in env_file.iter().chain(spec.environment.iter()) {
        if let Some(existing) = env_merged.iter_mut().find(|(k, _)| k == key) {
            existing.1 = value.clone();
        } else {
            env_merged.push((key.clone(), value.clone()));
        }
    }
    let env: Vec<String> = env_merged
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();

    // ポートバインディング
    let mut exposed_ports = HashMap::new();
    let mut port_bindings = HashMap::new();
    for port in &spec.ports {
        let container_port = port.container_key();
        exposed_ports.insert(container_port.clone(), HashMap::new());

        let host_ip = port.host_ip.as_deref().unwrap_or("0.0.0.0");
        port_bindings.insert(
            container_port,
            Some(vec![PortBinding {
                host_ip: Some(host_ip.to_string()),
                host_port: Some(port.host.to_string()),
            }]),
        );
    }

    // マウント: 名前付きボリュームはスタック名で修飾、バインドは絶対パス化、
    // 匿名ボリュームはConfig.volumesに入れる
    let mut binds = Vec::new();
    let mut anonymous_volumes = HashMap::new();
    for mount in &spec.mounts {
        match mount {
            MountSpec::Named {
                source,
                target,
                read_only,
            } => {
                let docker_name = match document.volumes.get(source) {
                    Some(vol) => naming::volume_docker_name(stack, source, vol),
                    // 未宣言の名前付きボリュームも暗黙に所有扱い
                    None => format!("{}_{}", stack, source),
                };
                binds.push(format_bind(&docker_name, target, *read_only));
            }
            MountSpec::Bind {
                source,
                target,
                read_only,
            } => {
                let host_path = resolve_host_path(source, project_dir);
                binds.push(format_bind(&host_path, target, *read_only));
            }
            MountSpec::Anonymous { target } => {
                anonymous_volumes.insert(target.clone(), HashMap::new());
            }
        }
    }

    // ラベル: ユーザー定義 + 所有ラベル + Composeツール互換ラベル
    let mut container_labels: HashMap<String, String> = spec
        .labels
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    container_labels.insert(labels::STACK.to_string(), stack.to_string());
    container_labels.insert(labels::SERVICE.to_string(), service_name.to_string());
    container_labels.insert(
        labels::CONFIG_HASH.to_string(),
        config_hash(service_name, spec),
    );
    container_labels.insert(
        labels::FORMAT.to_string(),
        labels::FORMAT_VERSION.to_string(),
    );
    container_labels.insert("com.docker.compose.project".to_string(), stack.to_string());
    container_labels.insert(
        "com.docker.compose.service".to_string(),
        service_name.to_string(),
    );

    // ネットワーク: 未指定ならデフォルトネットワーク、指定があれば先頭が
    // プライマリで残りは作成後に接続する
    let attachments: Vec<NetworkAttachment> = if spec.networks.is_empty() {
        vec![NetworkAttachment::named("default")]
    } else {
        spec.networks.clone()
    };

    let docker_network_name = |attachment: &NetworkAttachment| -> String {
        match document.networks.get(&attachment.network) {
            Some(net) => naming::network_docker_name(stack, &attachment.network, net),
            None => naming::default_network_name(stack),
        }
    };

    let primary = &attachments[0];
    let primary_name = docker_network_name(primary);
    let mut endpoints = HashMap::new();
    endpoints.insert(primary_name.clone(), endpoint_settings(service_name, primary));
    let networking_config = Some(NetworkingConfig {
        endpoints_config: endpoints,
    });

    let extra_networks: Vec<(String, EndpointSettings)> = attachments[1..]
        .iter()
        .map(|attachment| {
            (
                docker_network_name(attachment),
                endpoint_settings(service_name, attachment),
            )
        })
        .collect();

    let restart_policy = match spec.restart {
        RestartPolicy::No => None,
        policy => Some(DockerRestartPolicy {
            name: Some(match policy {
                RestartPolicy::Always => RestartPolicyNameEnum::ALWAYS,
                RestartPolicy::OnFailure => RestartPolicyNameEnum::ON_FAILURE,
                RestartPolicy::UnlessStopped => RestartPolicyNameEnum::UNLESS_STOPPED,
                RestartPolicy::No => RestartPolicyNameEnum::NO,
            }),
            maximum_retry_count: None,
        }),
    };

    let ulimits: Vec<ResourcesUlimits> = spec
        .ulimits
        .iter()
        .map(|u| ResourcesUlimits {
            name: Some(u.name.clone()),
            soft: Some(u.soft),
            hard: Some(u.hard),
        })
        .collect();

    let log_config = spec.logging.as_ref().map(|logging| HostConfigLogConfig {
        typ: logging.driver.clone(),
        config: if logging.options.is_empty() {
            None
        } else {
            Some(
                logging
                    .options
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            )
        },
    });

    let host_config = HostConfig {
        port_bindings: Some(port_bindings),
        binds: Some(binds),
        network_mode: Some(primary_name),
        restart_policy,
        memory: spec.mem_limit,
        nano_cpus: spec.nano_cpus,
        privileged: if spec.privileged { Some(true) } else { None },
        readonly_rootfs: if spec.read_only { Some(true) } else { None },
        cap_add: if spec.cap_add.is_empty() {
            None
        } else {
            Some(spec.cap_add.clone())
        },
        cap_drop: if spec.cap_drop.is_empty() {
            None
        } else {
            Some(spec.cap_drop.clone())
        },
        dns: if spec.dns.is_empty() {
            None
        } else {
            Some(spec.dns.clone())
        },
        ulimits: if ulimits.is_empty() {
            None
        } else {
            Some(ulimits)
        },
        log_config,
        ..Default::default()
    };

    let healthcheck = spec.healthcheck.as_ref().map(|hc| HealthConfig {
        test: Some(hc.test.clone()),
        interval: Some(ms_to_ns(hc.interval_ms)),
        timeout: Some(ms_to_ns(hc.timeout_ms)),
        retries: Some(hc.retries as i64),
        start_period: Some(ms_to_ns(hc.start_period_ms)),
        start_interval: None,
    });

    let config = Config {
        image: Some(image.clone()),
        cmd: spec.command.clone(),
        entrypoint: spec.entrypoint.clone(),
        env: Some(env),
        exposed_ports: Some(exposed_ports),
        volumes: if anonymous_volumes.is_empty() {
            None
        } else {
            Some(anonymous_volumes)
        },
        labels: Some(container_labels),
        healthcheck,
        user: spec.user.clone(),
        working_dir: spec.working_dir.clone(),
        host_config: Some(host_config),
        networking_config,
        ..Default::default()
    };

    Ok(ContainerPlan {
        service: service_name.to_string(),
        name,
        image,
        config,
        extra_networks,
        warnings,
    })
}

fn endpoint_settings(service_name: &str, attachment: &NetworkAttachment) -> EndpointSettings {
    let mut aliases = vec![service_name.to_string()];
    aliases.extend(attachment.aliases.iter().cloned());

    let ipam_config = if attachment.ipv4_address.is_some() || attachment.ipv6_address.is_some() {
        Some(EndpointIpamConfig {
            ipv4_address: attachment.ipv4_address.clone(),
            ipv6_address: attachment.ipv6_address.clone(),
            link_local_ips: None,
        })
    } else {
        None
    };

    EndpointSettings {
        aliases: Some(aliases),
        ipam_config,
        ..Default::default()
    }
}

fn format_bind(source: &str, target: &str, read_only: bool) -> String {
    let mode = if read_only { "ro" } else { "rw" };
    format!("{}:{}:{}", source, target, mode)
}

/// 相対パスのバインドマウントをプロジェクトディレクトリ基準で絶対化
fn resolve_host_path(source: &str, project_dir: &Path) -> String {
    let path = Path::new(source);
    if path.is_absolute() {
        source.to_string()
    } else {
        project_dir.join(path).display().to_string()
    }
}

fn ms_to_ns(ms: u64) -> i64 {
    (ms as i64) * 1_000_000
}
