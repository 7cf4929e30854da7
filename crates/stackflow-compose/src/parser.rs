//! composeファイルのパース
//!
//! serde_yamlで寛容な中間表現（Raw*）に読み込み、型付きモデルへ変換しながら
//! バリデーションする。compose仕様の実用サブセットのみ対応:
//! services / networks / volumes / profiles / healthcheck / depends_on と
//! 主要なコンテナ設定フィールド。

use crate::error::{ComposeError, Result};
use crate::interpolate::{self, VariableContext};
use crate::model::{
    BuildContext, ComposeDocument, Condition, DependsOn, HealthCheck, IpamSpec, LoggingSpec,
    MountSpec, NetworkAttachment, NetworkSpec, PortSpec, Protocol, RestartPolicy, ServiceSpec,
    Ulimit, VolumeSpec, cpus_to_nano, parse_duration_ms, parse_memory_bytes,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// composeテキストをパースしてバリデーション済みドキュメントを返す
///
/// 変数置換は行わない。置換込みは [`parse_with_context`] を使用する。
pub fn parse(text: &str) -> Result<ComposeDocument> {
    let raw: RawDocument = serde_yaml::from_str(text)?;
    let document = convert(raw)?;
    document.validate()?;
    Ok(document)
}

/// 変数置換してからパースする
#[tracing::instrument(skip_all)]
pub fn parse_with_context(text: &str, ctx: &VariableContext) -> Result<ComposeDocument> {
    info!("Parsing compose document");
    let substituted = interpolate::substitute(text, ctx)?;
    let document = parse(&substituted)?;
    debug!(
        services = document.services.len(),
        networks = document.networks.len(),
        volumes = document.volumes.len(),
        "Compose document parsed"
    );
    Ok(document)
}

// ---- 中間表現 ----

#[derive(Debug, Deserialize)]
struct RawDocument {
    // composeのversionフィールドは受理して無視する（現行仕様では廃止済み）
    #[serde(default)]
    #[allow(dead_code)]
    version: Option<String>,
    #[serde(default)]
    services: BTreeMap<String, RawService>,
    #[serde(default)]
    networks: BTreeMap<String, Option<RawNetwork>>,
    #[serde(default)]
    volumes: BTreeMap<String, Option<RawVolume>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawService {
    image: Option<String>,
    build: Option<RawBuild>,
    command: Option<StringOrList>,
    entrypoint: Option<StringOrList>,
    environment: Option<KeyValues>,
    #[serde(default)]
    ports: Vec<RawPort>,
    #[serde(default)]
    volumes: Vec<RawMount>,
    networks: Option<RawServiceNetworks>,
    depends_on: Option<RawDependsOn>,
    healthcheck: Option<RawHealthCheck>,
    restart: Option<String>,
    mem_limit: Option<ScalarString>,
    cpus: Option<ScalarString>,
    labels: Option<KeyValues>,
    #[serde(default)]
    profiles: Vec<String>,
    container_name: Option<String>,
    #[serde(default)]
    privileged: bool,
    #[serde(default)]
    read_only: bool,
    #[serde(default)]
    cap_add: Vec<String>,
    #[serde(default)]
    cap_drop: Vec<String>,
    dns: Option<StringOrList>,
    #[serde(default)]
    ulimits: BTreeMap<String, RawUlimit>,
    logging: Option<RawLogging>,
    user: Option<String>,
    working_dir: Option<String>,
}

/// 文字列またはリスト（command / entrypoint / dns）
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StringOrList {
    String(String),
    List(Vec<String>),
}

impl StringOrList {
    fn into_args(self) -> Vec<String> {
        match self {
            // 文字列形式は空白で分割する（シェル互換のクォート処理はしない）
            Self::String(s) => s.split_whitespace().map(String::from).collect(),
            Self::List(list) => list,
        }
    }

    fn into_list(self) -> Vec<String> {
        match self {
            Self::String(s) => vec![s],
            Self::List(list) => list,
        }
    }
}

/// YAMLスカラーを文字列として受ける（数値・真偽値も許容）
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScalarString {
    String(String),
    Number(serde_yaml::Number),
    Bool(bool),
}

impl ScalarString {
    fn into_string(self) -> String {
        match self {
            Self::String(s) => s,
            Self::Number(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

/// map形式とlist形式の両方を受けるキー・値集合（environment / labels）
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum KeyValues {
    Map(BTreeMap<String, Option<ScalarString>>),
    List(Vec<String>),
}

impl KeyValues {
    fn into_pairs(self) -> Vec<(String, String)> {
        match self {
            Self::Map(map) => map
                .into_iter()
                .map(|(k, v)| (k, v.map(ScalarString::into_string).unwrap_or_default()))
                .collect(),
            Self::List(list) => list
                .into_iter()
                .map(|entry| match entry.split_once('=') {
                    Some((k, v)) => (k.to_string(), v.to_string()),
                    None => (entry, String::new()),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPort {
    Number(u16),
    String(String),
    Long {
        target: u16,
        published: Option<u16>,
        protocol: Option<String>,
        host_ip: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawMount {
    String(String),
    Long {
        #[serde(rename = "type")]
        kind: Option<String>,
        source: Option<String>,
        target: String,
        #[serde(default)]
        read_only: bool,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawServiceNetworks {
    List(Vec<String>),
    Map(BTreeMap<String, Option<RawAttachment>>),
}

#[derive(Debug, Default, Deserialize)]
struct RawAttachment {
    ipv4_address: Option<String>,
    ipv6_address: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDependsOn {
    List(Vec<String>),
    Map(BTreeMap<String, RawDependsOnEntry>),
}

#[derive(Debug, Default, Deserialize)]
struct RawDependsOnEntry {
    condition: Option<String>,
    #[serde(default)]
    restart: bool,
    /// 待機タイムアウト（秒）。compose仕様の拡張
    timeout: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawHealthCheck {
    test: Option<StringOrList>,
    interval: Option<ScalarString>,
    timeout: Option<ScalarString>,
    retries: Option<u64>,
    start_period: Option<ScalarString>,
    #[serde(default)]
    disable: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBuild {
    Context(String),
    Long {
        context: Option<String>,
        dockerfile: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawUlimit {
    Single(i64),
    SoftHard { soft: i64, hard: i64 },
}

#[derive(Debug, Deserialize)]
struct RawLogging {
    driver: Option<String>,
    #[serde(default)]
    options: BTreeMap<String, ScalarString>,
}

#[derive(Debug, Default, Deserialize)]
struct RawNetwork {
    driver: Option<String>,
    #[serde(default)]
    driver_opts: BTreeMap<String, ScalarString>,
    ipam: Option<RawIpam>,
    external: Option<RawExternal>,
    labels: Option<KeyValues>,
}

#[derive(Debug, Deserialize)]
struct RawIpam {
    #[serde(default)]
    config: Vec<RawIpamConfig>,
}

#[derive(Debug, Deserialize)]
struct RawIpamConfig {
    subnet: Option<String>,
    gateway: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawExternal {
    Bool(bool),
    Named { name: Option<String> },
}

impl RawExternal {
    /// `external: true` はキー名、`external: {name}` は指定名に解決する
    fn resolve(self, key: &str) -> Option<String> {
        match self {
            Self::Bool(true) => Some(key.to_string()),
            Self::Bool(false) => None,
            Self::Named { name } => Some(name.unwrap_or_else(|| key.to_string())),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawVolume {
    driver: Option<String>,
    #[serde(default)]
    driver_opts: BTreeMap<String, ScalarString>,
    external: Option<RawExternal>,
    labels: Option<KeyValues>,
}

// ---- 変換 ----

fn convert(raw: RawDocument) -> Result<ComposeDocument> {
    let mut document = ComposeDocument::default();

    for (name, raw_network) in raw.networks {
        let network = convert_network(&name, raw_network.unwrap_or_default());
        document.networks.insert(name, network);
    }

    for (name, raw_volume) in raw.volumes {
        let volume = convert_volume(&name, raw_volume.unwrap_or_default());
        document.volumes.insert(name, volume);
    }

    for (name, raw_service) in raw.services {
        let service = convert_service(&name, raw_service)?;
        document.services.insert(name, service);
    }

    Ok(document)
}

fn convert_network(key: &str, raw: RawNetwork) -> NetworkSpec {
    let ipam = raw.ipam.and_then(|ipam| {
        ipam.config.into_iter().next().map(|c| IpamSpec {
            subnet: c.subnet,
            gateway: c.gateway,
        })
    });

    NetworkSpec {
        driver: raw.driver,
        driver_opts: raw
            .driver_opts
            .into_iter()
            .map(|(k, v)| (k, v.into_string()))
            .collect(),
        ipam,
        external: raw.external.and_then(|e| e.resolve(key)),
        labels: raw
            .labels
            .map(|l| l.into_pairs().into_iter().collect())
            .unwrap_or_default(),
    }
}

fn convert_volume(key: &str, raw: RawVolume) -> VolumeSpec {
    VolumeSpec {
        driver: raw.driver,
        driver_opts: raw
            .driver_opts
            .into_iter()
            .map(|(k, v)| (k, v.into_string()))
            .collect(),
        external: raw.external.and_then(|e| e.resolve(key)),
        labels: raw
            .labels
            .map(|l| l.into_pairs().into_iter().collect())
            .unwrap_or_default(),
    }
}

fn convert_service(name: &str, raw: RawService) -> Result<ServiceSpec> {
    let mut service = ServiceSpec {
        image: raw.image,
        build: raw.build.map(|b| match b {
            RawBuild::Context(context) => BuildContext {
                context,
                dockerfile: None,
            },
            RawBuild::Long {
                context,
                dockerfile,
            } => BuildContext {
                context: context.unwrap_or_else(|| ".".to_string()),
                dockerfile,
            },
        }),
        command: raw.command.map(StringOrList::into_args),
        entrypoint: raw.entrypoint.map(StringOrList::into_args),
        environment: raw.environment.map(KeyValues::into_pairs).unwrap_or_default(),
        container_name: raw.container_name,
        privileged: raw.privileged,
        read_only: raw.read_only,
        cap_add: raw.cap_add,
        cap_drop: raw.cap_drop,
        dns: raw.dns.map(StringOrList::into_list).unwrap_or_default(),
        user: raw.user,
        working_dir: raw.working_dir,
        profiles: raw.profiles.into_iter().collect(),
        ..Default::default()
    };

    for port in raw.ports {
        service.ports.push(match port {
            RawPort::Number(n) => PortSpec {
                host: n,
                container: n,
                protocol: Protocol::Tcp,
                host_ip: None,
            },
            RawPort::String(s) => PortSpec::parse_short(&s)?,
            RawPort::Long {
                target,
                published,
                protocol,
                host_ip,
            } => PortSpec {
                host: published.unwrap_or(target),
                container: target,
                protocol: protocol.as_deref().map(Protocol::parse).unwrap_or_default(),
                host_ip,
            },
        });
    }

    for mount in raw.volumes {
        service.mounts.push(match mount {
            RawMount::String(s) => MountSpec::parse_short(&s)?,
            RawMount::Long {
                kind,
                source,
                target,
                read_only,
            } => convert_long_mount(kind.as_deref(), source, target, read_only)?,
        });
    }

    match raw.networks {
        Some(RawServiceNetworks::List(names)) => {
            service.networks = names.into_iter().map(NetworkAttachment::named).collect();
        }
        Some(RawServiceNetworks::Map(map)) => {
            for (network, attachment) in map {
                let attachment = attachment.unwrap_or_default();
                service.networks.push(NetworkAttachment {
                    network,
                    ipv4_address: attachment.ipv4_address,
                    ipv6_address: attachment.ipv6_address,
                    aliases: attachment.aliases,
                });
            }
        }
        None => {}
    }

    match raw.depends_on {
        Some(RawDependsOn::List(targets)) => {
            for target in targets {
                service.depends_on.insert(target, DependsOn::default());
            }
        }
        Some(RawDependsOn::Map(map)) => {
            for (target, entry) in map {
                let condition = match entry.condition.as_deref() {
                    None => Condition::Started,
                    Some(s) => Condition::parse(s).ok_or_else(|| {
                        ComposeError::InvalidConfig(format!(
                            "サービス '{}' の depends_on.{} に未知のcondition '{}' が指定されています",
                            name, target, s
                        ))
                    })?,
                };
                service.depends_on.insert(
                    target,
                    DependsOn {
                        condition,
                        restart: entry.restart,
                        timeout_ms: entry
                            .timeout
                            .map(|secs| secs * 1000)
                            .unwrap_or(crate::model::DEFAULT_DEPENDENCY_TIMEOUT_MS),
                    },
                );
            }
        }
        None => {}
    }

    if let Some(hc) = raw.healthcheck {
        if !hc.disable {
            service.healthcheck = Some(convert_healthcheck(hc)?);
        }
    }

    if let Some(restart) = raw.restart {
        service.restart = RestartPolicy::parse(&restart).ok_or_else(|| {
            ComposeError::InvalidConfig(format!(
                "サービス '{}' に未知のrestartポリシー '{}' が指定されています",
                name, restart
            ))
        })?;
    }

    if let Some(mem) = raw.mem_limit {
        service.mem_limit = Some(parse_memory_bytes(&mem.into_string())?);
    }

    if let Some(cpus) = raw.cpus {
        let cpus_str = cpus.into_string();
        let value: f64 = cpus_str.parse().map_err(|_| {
            ComposeError::InvalidConfig(format!(
                "サービス '{}' のcpus指定が数値ではありません: {}",
                name, cpus_str
            ))
        })?;
        service.nano_cpus = Some(cpus_to_nano(value));
    }

    if let Some(labels) = raw.labels {
        service.labels = labels.into_pairs().into_iter().collect();
    }

    for (ulimit_name, ulimit) in raw.ulimits {
        let (soft, hard) = match ulimit {
            RawUlimit::Single(n) => (n, n),
            RawUlimit::SoftHard { soft, hard } => (soft, hard),
        };
        service.ulimits.push(Ulimit {
            name: ulimit_name,
            soft,
            hard,
        });
    }

    if let Some(logging) = raw.logging {
        service.logging = Some(LoggingSpec {
            driver: logging.driver,
            options: logging
                .options
                .into_iter()
                .map(|(k, v)| (k, v.into_string()))
                .collect(),
        });
    }

    Ok(service)
}

fn convert_long_mount(
    kind: Option<&str>,
    source: Option<String>,
    target: String,
    read_only: bool,
) -> Result<MountSpec> {
    match (kind, source) {
        (Some("bind"), Some(source)) => Ok(MountSpec::Bind {
            source,
            target,
            read_only,
        }),
        (Some("volume") | None, Some(source)) => Ok(MountSpec::Named {
            source,
            target,
            read_only,
        }),
        (Some("volume") | None, None) => Ok(MountSpec::Anonymous { target }),
        (Some("bind"), None) => Err(ComposeError::InvalidMount(format!(
            "bindマウントにsourceがありません: {}",
            target
        ))),
        (Some(other), _) => Err(ComposeError::InvalidMount(format!(
            "未対応のマウント種別: {}",
            other
        ))),
    }
}

fn convert_healthcheck(raw: RawHealthCheck) -> Result<HealthCheck> {
    let test = match raw.test {
        Some(StringOrList::String(cmd)) => vec!["CMD-SHELL".to_string(), cmd],
        Some(StringOrList::List(list)) => list,
        None => Vec::new(),
    };

    let to_ms = |value: Option<ScalarString>, default_ms: u64| -> Result<u64> {
        match value {
            Some(v) => parse_duration_ms(&v.into_string()),
            None => Ok(default_ms),
        }
    };

    Ok(HealthCheck {
        test,
        interval_ms: to_ms(raw.interval, 30_000)?,
        timeout_ms: to_ms(raw.timeout, 30_000)?,
        retries: raw.retries.unwrap_or(3),
        start_period_ms: to_ms(raw.start_period, 0)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_COMPOSE: &str = r#"
services:
  db:
    image: postgres:16
    environment:
      POSTGRES_USER: admin
      POSTGRES_DB: app
    volumes:
      - pgdata:/var/lib/postgresql/data
    healthcheck:
      test: ["CMD-SHELL", "pg_isready -U admin"]
      interval: 5s
      timeout: 3s
      retries: 10
      start_period: 10s
    restart: unless-stopped
    mem_limit: 512m
    cpus: 0.5
  web:
    image: nginx:1.27
    ports:
      - "8080:80"
      - "127.0.0.1:8443:443/tcp"
    depends_on:
      db:
        condition: service_healthy
        restart: true
    networks:
      frontend:
        aliases:
          - www
      backend:
        ipv4_address: 172.28.0.10
    profiles:
      - web

networks:
  frontend:
    driver: bridge
  backend:
    ipam:
      config:
        - subnet: 172.28.0.0/16
          gateway: 172.28.0.1
  shared:
    external:
      name: company-shared

volumes:
  pgdata:
  backup:
    external: true
"#;

    #[test]
    fn test_parse_full_document() {
        let doc = parse(FULL_COMPOSE).unwrap();
        assert_eq!(doc.services.len(), 2);
        assert_eq!(doc.networks.len(), 3);
        assert_eq!(doc.volumes.len(), 2);

        let db = &doc.services["db"];
        assert_eq!(db.image.as_deref(), Some("postgres:16"));
        assert_eq!(db.mem_limit, Some(512 * 1024 * 1024));
        assert_eq!(db.nano_cpus, Some(500_000_000));
        assert_eq!(db.restart, RestartPolicy::UnlessStopped);
        let hc = db.healthcheck.as_ref().unwrap();
        assert_eq!(hc.test[0], "CMD-SHELL");
        assert_eq!(hc.interval_ms, 5000);
        assert_eq!(hc.retries, 10);
        assert_eq!(hc.start_period_ms, 10_000);

        let web = &doc.services["web"];
        assert_eq!(web.ports.len(), 2);
        assert_eq!(web.ports[1].host_ip.as_deref(), Some("127.0.0.1"));
        let dep = &web.depends_on["db"];
        assert_eq!(dep.condition, Condition::Healthy);
        assert!(dep.restart);
        assert_eq!(dep.timeout_ms, 30_000);
        assert!(web.profiles.contains("web"));
    }

    #[test]
    fn test_parse_network_attachments() {
        let doc = parse(FULL_COMPOSE).unwrap();
        let web = &doc.services["web"];
        let frontend = web
            .networks
            .iter()
            .find(|a| a.network == "frontend")
            .unwrap();
        assert_eq!(frontend.aliases, vec!["www"]);
        let backend = web
            .networks
            .iter()
            .find(|a| a.network == "backend")
            .unwrap();
        assert_eq!(backend.ipv4_address.as_deref(), Some("172.28.0.10"));
    }

    #[test]
    fn test_parse_external_resolution() {
        let doc = parse(FULL_COMPOSE).unwrap();
        // external: {name} は指定名に解決
        assert_eq!(
            doc.networks["shared"].external.as_deref(),
            Some("company-shared")
        );
        // external: true はキー名に解決
        assert_eq!(doc.volumes["backup"].external.as_deref(), Some("backup"));
        assert!(doc.volumes["pgdata"].external.is_none());
        // ipam
        let ipam = doc.networks["backend"].ipam.as_ref().unwrap();
        assert_eq!(ipam.subnet.as_deref(), Some("172.28.0.0/16"));
    }

    #[test]
    fn test_parse_environment_list_form() {
        let doc = parse(
            "services:\n  app:\n    image: busybox\n    environment:\n      - A=1\n      - B=two\n",
        )
        .unwrap();
        let env = &doc.services["app"].environment;
        assert!(env.contains(&("A".to_string(), "1".to_string())));
        assert!(env.contains(&("B".to_string(), "two".to_string())));
    }

    #[test]
    fn test_parse_depends_on_short_form() {
        let doc = parse(
            "services:\n  db:\n    image: postgres\n  app:\n    image: busybox\n    depends_on:\n      - db\n",
        )
        .unwrap();
        let dep = &doc.services["app"].depends_on["db"];
        assert_eq!(dep.condition, Condition::Started);
        assert!(!dep.restart);
    }

    #[test]
    fn test_parse_command_string_form() {
        let doc = parse(
            "services:\n  app:\n    image: busybox\n    command: sleep 30\n",
        )
        .unwrap();
        assert_eq!(
            doc.services["app"].command,
            Some(vec!["sleep".to_string(), "30".to_string()])
        );
    }

    #[test]
    fn test_parse_healthcheck_shell_string() {
        let doc = parse(
            "services:\n  app:\n    image: busybox\n    healthcheck:\n      test: curl -f http://localhost/\n",
        )
        .unwrap();
        let hc = doc.services["app"].healthcheck.as_ref().unwrap();
        assert_eq!(hc.test[0], "CMD-SHELL");
        assert_eq!(hc.test[1], "curl -f http://localhost/");
        // デフォルト値
        assert_eq!(hc.interval_ms, 30_000);
        assert_eq!(hc.retries, 3);
    }

    #[test]
    fn test_parse_unknown_condition_rejected() {
        let result = parse(
            "services:\n  db:\n    image: postgres\n  app:\n    image: busybox\n    depends_on:\n      db:\n        condition: service_ready\n",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_build_detection() {
        let doc = parse(
            "services:\n  app:\n    build:\n      context: ./app\n      dockerfile: Dockerfile.dev\n",
        )
        .unwrap();
        let build = doc.services["app"].build.as_ref().unwrap();
        assert_eq!(build.context, "./app");
        assert_eq!(build.dockerfile.as_deref(), Some("Dockerfile.dev"));
    }

    #[test]
    fn test_parse_with_context_substitutes() {
        let ctx = VariableContext::new(
            [],
            [("PG_TAG".to_string(), "16".to_string())],
            [],
        );
        let doc = parse_with_context(
            "services:\n  db:\n    image: postgres:${PG_TAG}\n",
            &ctx,
        )
        .unwrap();
        assert_eq!(doc.services["db"].image.as_deref(), Some("postgres:16"));
    }

    #[test]
    fn test_parse_ulimits_and_logging() {
        let doc = parse(
            "services:\n  app:\n    image: busybox\n    ulimits:\n      nofile:\n        soft: 1024\n        hard: 4096\n      nproc: 512\n    logging:\n      driver: json-file\n      options:\n        max-size: 10m\n",
        )
        .unwrap();
        let app = &doc.services["app"];
        assert_eq!(app.ulimits.len(), 2);
        let nofile = app.ulimits.iter().find(|u| u.name == "nofile").unwrap();
        assert_eq!((nofile.soft, nofile.hard), (1024, 4096));
        let logging = app.logging.as_ref().unwrap();
        assert_eq!(logging.driver.as_deref(), Some("json-file"));
        assert_eq!(logging.options["max-size"], "10m");
    }
}
