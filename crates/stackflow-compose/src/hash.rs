//! 設定ハッシュ
//!
//! サービス定義のデプロイに影響するフィールドから安定したフィンガープリントを
//! 計算する。コンテナラベルに保存され、ドリフト検出（composeドキュメントと
//! 稼働中コンテナの差分判定）に使われる。

use crate::model::{
    HealthCheck, LoggingSpec, MountSpec, NetworkAttachment, PortSpec, RestartPolicy, ServiceSpec,
    Ulimit,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// stackflowが自動付与するラベルのプレフィックス（ハッシュから除外）
pub const OWNED_LABEL_PREFIX: &str = "club.chronista.stackflow.";

/// ハッシュ対象のフィールド集合
///
/// 正規化のポイント:
/// - environmentは後勝ちで重複解決した上でキー順に並べる
/// - BTreeベースのコレクションにより走査順が決定的
/// - stackflow自身が付与するラベルは除外する
#[derive(Serialize)]
struct HashedFields<'a> {
    service: &'a str,
    image: &'a Option<String>,
    command: &'a Option<Vec<String>>,
    entrypoint: &'a Option<Vec<String>>,
    environment: BTreeMap<&'a str, &'a str>,
    ports: &'a [PortSpec],
    mounts: &'a [MountSpec],
    networks: &'a [NetworkAttachment],
    healthcheck: &'a Option<HealthCheck>,
    restart: RestartPolicy,
    mem_limit: Option<i64>,
    nano_cpus: Option<i64>,
    labels: BTreeMap<&'a str, &'a str>,
    container_name: &'a Option<String>,
    privileged: bool,
    read_only: bool,
    cap_add: &'a [String],
    cap_drop: &'a [String],
    dns: &'a [String],
    ulimits: &'a [Ulimit],
    logging: &'a Option<LoggingSpec>,
    user: &'a Option<String>,
    working_dir: &'a Option<String>,
}

/// サービス定義から設定ハッシュを計算する
///
/// 同一の定義は常に同一のハッシュになる。デプロイに影響するフィールドの
/// 変更はハッシュを変える。
pub fn config_hash(service_name: &str, spec: &ServiceSpec) -> String {
    let mut environment: BTreeMap<&str, &str> = BTreeMap::new();
    for (key, value) in &spec.environment {
        // 後勝ち
        environment.insert(key, value);
    }

    let labels: BTreeMap<&str, &str> = spec
        .labels
        .iter()
        .filter(|(key, _)| !key.starts_with(OWNED_LABEL_PREFIX))
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect();

    let fields = HashedFields {
        service: service_name,
        image: &spec.image,
        command: &spec.command,
        entrypoint: &spec.entrypoint,
        environment,
        ports: &spec.ports,
        mounts: &spec.mounts,
        networks: &spec.networks,
        healthcheck: &spec.healthcheck,
        restart: spec.restart,
        mem_limit: spec.mem_limit,
        nano_cpus: spec.nano_cpus,
        labels,
        container_name: &spec.container_name,
        privileged: spec.privileged,
        read_only: spec.read_only,
        cap_add: &spec.cap_add,
        cap_drop: &spec.cap_drop,
        dns: &spec.dns,
        ulimits: &spec.ulimits,
        logging: &spec.logging,
        user: &spec.user,
        working_dir: &spec.working_dir,
    };

    let canonical = serde_json::to_string(&fields).expect("hash fields serialize");
    let digest = Sha256::digest(canonical.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_spec() -> ServiceSpec {
        ServiceSpec {
            image: Some("postgres:16".to_string()),
            environment: vec![("POSTGRES_USER".to_string(), "admin".to_string())],
            ..Default::default()
        }
    }

    #[test]
    fn test_hash_is_stable() {
        let spec = base_spec();
        assert_eq!(config_hash("db", &spec), config_hash("db", &spec));
        // 64桁の16進文字列
        assert_eq!(config_hash("db", &spec).len(), 64);
    }

    #[test]
    fn test_hash_changes_on_relevant_fields() {
        let spec = base_spec();
        let original = config_hash("db", &spec);

        let mut changed = base_spec();
        changed.image = Some("postgres:17".to_string());
        assert_ne!(config_hash("db", &changed), original);

        let mut changed = base_spec();
        changed
            .environment
            .push(("POSTGRES_DB".to_string(), "app".to_string()));
        assert_ne!(config_hash("db", &changed), original);

        let mut changed = base_spec();
        changed.command = Some(vec!["postgres".to_string(), "-c".to_string()]);
        assert_ne!(config_hash("db", &changed), original);

        let mut changed = base_spec();
        changed.ports.push(
            crate::model::PortSpec {
                host: 5432,
                container: 5432,
                protocol: crate::model::Protocol::Tcp,
                host_ip: None,
            },
        );
        assert_ne!(config_hash("db", &changed), original);
    }

    #[test]
    fn test_hash_depends_on_service_name() {
        let spec = base_spec();
        assert_ne!(config_hash("db", &spec), config_hash("db2", &spec));
    }

    #[test]
    fn test_hash_ignores_owned_labels() {
        let spec = base_spec();
        let original = config_hash("db", &spec);

        let mut labeled = base_spec();
        labeled.labels.insert(
            format!("{}config-hash", OWNED_LABEL_PREFIX),
            "deadbeef".to_string(),
        );
        assert_eq!(config_hash("db", &labeled), original);

        // ユーザー定義ラベルは影響する
        let mut labeled = base_spec();
        labeled
            .labels
            .insert("app.team".to_string(), "platform".to_string());
        assert_ne!(config_hash("db", &labeled), original);
    }

    #[test]
    fn test_hash_environment_duplicate_last_wins() {
        let mut first = base_spec();
        first.environment = vec![
            ("KEY".to_string(), "old".to_string()),
            ("KEY".to_string(), "new".to_string()),
        ];
        let mut second = base_spec();
        second.environment = vec![("KEY".to_string(), "new".to_string())];
        assert_eq!(config_hash("db", &first), config_hash("db", &second));
    }

    #[test]
    fn test_hash_profiles_do_not_matter() {
        // profilesはコンテナ自体に影響しないためハッシュ対象外
        let spec = base_spec();
        let original = config_hash("db", &spec);
        let mut with_profile = base_spec();
        with_profile.profiles.insert("debug".to_string());
        assert_eq!(config_hash("db", &with_profile), original);
    }
}
