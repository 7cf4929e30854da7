//! 依存グラフ解決
//!
//! depends_onから有向グラフを構築し、Kahn法でトポロジカルソートする。
//! 同一バッチ内のサービスは並行デプロイ可能。順序は辞書順タイブレークで
//! 決定的になる。

use crate::error::{ComposeError, Result};
use crate::model::{ComposeDocument, Condition, ServiceSpec};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// 依存エッジ（待機条件付き）
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyEdge {
    /// 待機する側のサービス
    pub service: String,
    /// 待機対象のサービス
    pub depends_on: String,
    pub condition: Condition,
    pub timeout_ms: u64,
    /// unhealthy／異常終了時に依存先を再起動するか
    pub restart: bool,
}

/// 解決済み依存グラフ
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// 依存順の全サービス（依存先が常に先行する）
    pub order: Vec<String>,
    /// 同時デプロイ可能なバッチ（依存深さごと）
    pub batches: Vec<Vec<String>>,
    /// 全依存エッジ
    pub edges: Vec<DependencyEdge>,
    pub warnings: Vec<String>,
}

impl DependencyGraph {
    /// 指定サービスが待機すべきエッジを返す
    pub fn edges_for(&self, service: &str) -> Vec<&DependencyEdge> {
        self.edges.iter().filter(|e| e.service == service).collect()
    }
}

/// サービス集合から依存グラフを解決する
///
/// 循環は`DependencyCycle`、未知の参照先は`UnknownDependency`で失敗する。
/// `service_healthy`条件の参照先にhealthcheckがない場合は警告を積む
/// （待機エンジンが「起動済み」へ降格するため失敗にはしない）。
pub fn resolve(services: &BTreeMap<String, ServiceSpec>) -> Result<DependencyGraph> {
    let mut graph = DependencyGraph::default();
    // indegree: サービス → 未解決の依存数
    let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
    // dependents: 依存先 → それを待つサービス群
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for name in services.keys() {
        indegree.insert(name, 0);
    }

    for (name, service) in services {
        for (target, dep) in &service.depends_on {
            let Some(target_spec) = services.get(target) else {
                return Err(ComposeError::UnknownDependency {
                    service: name.clone(),
                    target: target.clone(),
                });
            };

            if dep.condition == Condition::Healthy && target_spec.healthcheck.is_none() {
                graph.warnings.push(format!(
                    "サービス '{}' は '{}' のservice_healthyを待ちますが、'{}' にhealthcheckがありません（起動済みで充足扱い）",
                    name, target, target
                ));
            }

            *indegree.get_mut(name.as_str()).expect("known service") += 1;
            dependents.entry(target).or_default().push(name);
            graph.edges.push(DependencyEdge {
                service: name.clone(),
                depends_on: target.clone(),
                condition: dep.condition,
                timeout_ms: dep.timeout_ms,
                restart: dep.restart,
            });
        }
    }

    // Kahn法。各ラウンドでindegree 0のものを1バッチとして取り出す
    let mut remaining: BTreeSet<&str> = indegree.keys().copied().collect();
    while !remaining.is_empty() {
        // BTreeSetの走査順が辞書順なのでバッチ内の順序は決定的
        let ready: Vec<&str> = remaining
            .iter()
            .copied()
            .filter(|name| indegree[name] == 0)
            .collect();

        if ready.is_empty() {
            // 進展なし＝循環。循環に依存しているだけの下流サービスは構成員から除く。
            // 誰からも依存されていないノードを不動点まで剥がすと循環の核が残る
            let mut core = remaining.clone();
            loop {
                let prunable: Vec<&str> = core
                    .iter()
                    .copied()
                    .filter(|name| {
                        dependents
                            .get(name)
                            .map(|deps| deps.iter().all(|d| !core.contains(d)))
                            .unwrap_or(true)
                    })
                    .collect();
                if prunable.is_empty() {
                    break;
                }
                for name in prunable {
                    core.remove(name);
                }
            }
            let members: Vec<&str> = core.iter().copied().collect();
            return Err(ComposeError::DependencyCycle(members.join(" -> ")));
        }

        for name in &ready {
            remaining.remove(name);
            for dependent in dependents.get(name).into_iter().flatten() {
                *indegree.get_mut(dependent).expect("known service") -= 1;
            }
        }

        graph
            .order
            .extend(ready.iter().map(|name| name.to_string()));
        graph
            .batches
            .push(ready.into_iter().map(String::from).collect());
    }

    debug!(
        services = graph.order.len(),
        batches = graph.batches.len(),
        "Dependency graph resolved"
    );
    Ok(graph)
}

/// ドキュメント全体から解決するショートカット
pub fn resolve_document(document: &ComposeDocument) -> Result<DependencyGraph> {
    resolve(&document.services)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DependsOn, HealthCheck};

    fn service(image: &str, deps: &[&str]) -> ServiceSpec {
        let mut spec = ServiceSpec {
            image: Some(image.to_string()),
            ..Default::default()
        };
        for dep in deps {
            spec.depends_on
                .insert(dep.to_string(), DependsOn::default());
        }
        spec
    }

    fn services(defs: &[(&str, &[&str])]) -> BTreeMap<String, ServiceSpec> {
        defs.iter()
            .map(|(name, deps)| (name.to_string(), service("busybox", deps)))
            .collect()
    }

    #[test]
    fn test_order_respects_dependencies() {
        let map = services(&[
            ("web", &["api", "db"]),
            ("api", &["db"]),
            ("db", &[]),
            ("worker", &["db"]),
        ]);
        let graph = resolve(&map).unwrap();

        let position = |name: &str| graph.order.iter().position(|n| n == name).unwrap();
        // 全サービスが依存先より厳密に後ろに並ぶ
        assert!(position("db") < position("api"));
        assert!(position("db") < position("worker"));
        assert!(position("api") < position("web"));
        assert_eq!(graph.order.len(), 4);
    }

    #[test]
    fn test_batches_are_deterministic() {
        let map = services(&[("a", &[]), ("c", &[]), ("b", &[]), ("z", &["a"])]);
        let graph = resolve(&map).unwrap();
        // バッチ内は辞書順
        assert_eq!(graph.batches[0], vec!["a", "b", "c"]);
        assert_eq!(graph.batches[1], vec!["z"]);
    }

    #[test]
    fn test_cycle_detected_with_members() {
        let map = services(&[("a", &["b"]), ("b", &["a"]), ("c", &[])]);
        let err = resolve(&map).unwrap_err();
        match err {
            ComposeError::DependencyCycle(members) => {
                assert!(members.contains('a'));
                assert!(members.contains('b'));
                assert!(!members.contains('c'));
            }
            other => panic!("Expected DependencyCycle, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_excludes_downstream_dependents() {
        // cは循環(a<->b)に依存しているだけで構成員ではない
        let map = services(&[("a", &["b"]), ("b", &["a"]), ("c", &["a"])]);
        let err = resolve(&map).unwrap_err();
        match err {
            ComposeError::DependencyCycle(members) => {
                assert!(members.contains('a'));
                assert!(members.contains('b'));
                assert!(!members.contains('c'));
            }
            other => panic!("Expected DependencyCycle, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_dependency() {
        let map = services(&[("web", &["ghost"])]);
        let err = resolve(&map).unwrap_err();
        assert!(matches!(err, ComposeError::UnknownDependency { .. }));
    }

    #[test]
    fn test_healthy_without_healthcheck_warns() {
        let mut map = services(&[("db", &[])]);
        let mut web = service("nginx", &[]);
        web.depends_on.insert(
            "db".to_string(),
            DependsOn {
                condition: Condition::Healthy,
                ..Default::default()
            },
        );
        map.insert("web".to_string(), web);

        let graph = resolve(&map).unwrap();
        assert_eq!(graph.warnings.len(), 1);
        assert!(graph.warnings[0].contains("healthcheck"));

        // healthcheckがあれば警告なし
        map.get_mut("db").unwrap().healthcheck = Some(HealthCheck::default());
        let graph = resolve(&map).unwrap();
        assert!(graph.warnings.is_empty());
    }

    #[test]
    fn test_edges_for() {
        let map = services(&[("web", &["api", "db"]), ("api", &["db"]), ("db", &[])]);
        let graph = resolve(&map).unwrap();
        let edges = graph.edges_for("web");
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|e| e.service == "web"));
    }
}
