//! スタック配下のDockerリソース命名規則
//!
//! スタックIDを接頭辞にした決定的な名前を使う。externalリソースだけは
//! 指定された名前をそのまま使用する。

use stackflow_compose::{NetworkSpec, VolumeSpec};

/// サービスのコンテナ名 (`{stack}_{service}_1`)
pub fn container_name(stack: &str, service: &str) -> String {
    format!("{}_{}_1", stack, service)
}

/// スタックの暗黙デフォルトネットワーク名
pub fn default_network_name(stack: &str) -> String {
    format!("{}_default", stack)
}

/// 宣言済みネットワークのDocker上の名前
pub fn network_docker_name(stack: &str, key: &str, spec: &NetworkSpec) -> String {
    match &spec.external {
        Some(name) => name.clone(),
        None => format!("{}_{}", stack, key),
    }
}

/// 宣言済みボリュームのDocker上の名前
pub fn volume_docker_name(stack: &str, key: &str, spec: &VolumeSpec) -> String {
    match &spec.external {
        Some(name) => name.clone(),
        None => format!("{}_{}", stack, key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_name() {
        assert_eq!(container_name("myapp", "web"), "myapp_web_1");
    }

    #[test]
    fn test_external_network_name_passes_through() {
        let spec = NetworkSpec {
            external: Some("shared-proxy".to_string()),
            ..Default::default()
        };
        assert_eq!(network_docker_name("myapp", "proxy", &spec), "shared-proxy");

        let owned = NetworkSpec::default();
        assert_eq!(network_docker_name("myapp", "backend", &owned), "myapp_backend");
    }

    #[test]
    fn test_volume_docker_name() {
        let owned = VolumeSpec::default();
        assert_eq!(volume_docker_name("myapp", "pgdata", &owned), "myapp_pgdata");

        let external = VolumeSpec {
            external: Some("legacy-data".to_string()),
            ..Default::default()
        };
        assert_eq!(volume_docker_name("myapp", "pgdata", &external), "legacy-data");
    }
}
