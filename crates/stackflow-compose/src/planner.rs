//! プロファイルプランナー
//!
//! 要求プロファイル集合とサービス宣言から、デプロイ対象・スキップ対象を
//! 決定する。プランはデプロイ試行ごとに再計算され、永続化されない。

use crate::error::Result;
use crate::graph::{self, DependencyGraph};
use crate::model::ComposeDocument;
use std::collections::BTreeSet;
use tracing::debug;

/// スキップされたサービスとその理由
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedService {
    pub name: String,
    pub reason: String,
}

/// デプロイプラン
///
/// 構築後は不変。errorsが空でない場合、デプロイは実行してはならない。
#[derive(Debug, Clone, Default)]
pub struct DeploymentPlan {
    /// 依存順のデプロイ対象サービス
    pub deploy: Vec<String>,
    /// 同時デプロイ可能なバッチ
    pub batches: Vec<Vec<String>>,
    pub skipped: Vec<SkippedService>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl DeploymentPlan {
    pub fn is_deployable(&self) -> bool {
        self.errors.is_empty()
    }

    /// デプロイ対象サービス名の集合
    pub fn active_set(&self) -> BTreeSet<String> {
        self.deploy.iter().cloned().collect()
    }
}

/// プロファイルに基づくデプロイプランを構築する
///
/// ルール:
/// - profilesが空のサービスは常にアクティブ（デフォルトサービス）
/// - profiles宣言があるサービスは要求プロファイルと交差する場合のみアクティブ
/// - アクティブなサービスが非アクティブなサービスへのハード依存を持つ場合は
///   プランエラー（依存を黙ってスキップしない）
#[tracing::instrument(skip(document))]
pub fn plan(
    document: &ComposeDocument,
    active_profiles: &BTreeSet<String>,
) -> Result<DeploymentPlan> {
    let mut plan = DeploymentPlan::default();

    let mut active: BTreeSet<String> = BTreeSet::new();
    for (name, service) in &document.services {
        if service.is_active(active_profiles) {
            active.insert(name.clone());
        } else {
            let declared: Vec<&str> = service.profiles.iter().map(String::as_str).collect();
            plan.skipped.push(SkippedService {
                name: name.clone(),
                reason: format!(
                    "プロファイル [{}] が要求プロファイルに含まれていません",
                    declared.join(", ")
                ),
            });
        }
    }

    // 要求されたが、どのサービスも宣言していないプロファイルは警告
    let declared_profiles = document.declared_profiles();
    for profile in active_profiles {
        if !declared_profiles.contains(profile) {
            plan.warnings.push(format!(
                "プロファイル '{}' はどのサービスにも宣言されていません",
                profile
            ));
        }
    }

    // アクティブなサービスの依存先が除外されていないか検証
    for name in &active {
        let service = &document.services[name];
        for target in service.depends_on.keys() {
            if document.services.contains_key(target) && !active.contains(target) {
                plan.errors.push(format!(
                    "サービス '{}' はプロファイルで除外されたサービス '{}' に依存しています",
                    name, target
                ));
            }
        }
    }

    // フィルタ済みドキュメントに対して依存グラフを解決
    let filtered = document.retain_services(&active);
    if !filtered.services.is_empty() {
        let graph: DependencyGraph = graph::resolve(&filtered.services)?;
        plan.warnings.extend(graph.warnings.iter().cloned());
        plan.deploy = graph.order;
        plan.batches = graph.batches;
    }

    debug!(
        deploy = plan.deploy.len(),
        skipped = plan.skipped.len(),
        errors = plan.errors.len(),
        "Deployment plan computed"
    );
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DependsOn, ServiceSpec};

    fn doc(defs: &[(&str, &[&str], &[&str])]) -> ComposeDocument {
        // (name, profiles, depends_on)
        let mut document = ComposeDocument::default();
        for (name, profiles, deps) in defs {
            let mut spec = ServiceSpec {
                image: Some("busybox".to_string()),
                ..Default::default()
            };
            spec.profiles = profiles.iter().map(|p| p.to_string()).collect();
            for dep in *deps {
                spec.depends_on
                    .insert(dep.to_string(), DependsOn::default());
            }
            document.services.insert(name.to_string(), spec);
        }
        document
    }

    fn profiles(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_default_services_always_deploy() {
        let document = doc(&[("web", &[], &[]), ("debug-ui", &["debug"], &[])]);

        // プロファイル指定なし
        let empty = plan(&document, &profiles(&[])).unwrap();
        assert_eq!(empty.deploy, vec!["web"]);
        assert_eq!(empty.skipped.len(), 1);
        assert_eq!(empty.skipped[0].name, "debug-ui");

        // 無関係なプロファイルを要求してもデフォルトサービスは対象
        let other = plan(&document, &profiles(&["other"])).unwrap();
        assert!(other.deploy.contains(&"web".to_string()));
    }

    #[test]
    fn test_profile_activation() {
        let document = doc(&[("web", &[], &[]), ("debug-ui", &["debug"], &[])]);
        let plan = plan(&document, &profiles(&["debug"])).unwrap();
        assert!(plan.deploy.contains(&"debug-ui".to_string()));
        assert!(plan.skipped.is_empty());
        assert!(plan.is_deployable());
    }

    #[test]
    fn test_excluded_hard_dependency_is_error() {
        let document = doc(&[("web", &[], &["db"]), ("db", &["extra"], &[])]);
        let plan = plan(&document, &profiles(&[])).unwrap();
        assert!(!plan.is_deployable());
        assert_eq!(plan.errors.len(), 1);
        // 両サービス名を含むこと
        assert!(plan.errors[0].contains("web"));
        assert!(plan.errors[0].contains("db"));
    }

    #[test]
    fn test_plan_is_idempotent() {
        let document = doc(&[
            ("web", &[], &["db"]),
            ("db", &[], &[]),
            ("metrics", &["obs"], &[]),
        ]);
        let requested = profiles(&["obs"]);
        let first = plan(&document, &requested).unwrap();
        let second = plan(&document, &requested).unwrap();
        assert_eq!(first.deploy, second.deploy);
        assert_eq!(first.batches, second.batches);
        assert_eq!(first.skipped, second.skipped);
        assert_eq!(first.errors, second.errors);
    }

    #[test]
    fn test_deploy_order_respects_dependencies() {
        let document = doc(&[("web", &[], &["db"]), ("db", &[], &[])]);
        let plan = plan(&document, &profiles(&[])).unwrap();
        assert_eq!(plan.deploy, vec!["db", "web"]);
        assert_eq!(plan.batches, vec![vec!["db"], vec!["web"]]);
    }

    #[test]
    fn test_unknown_requested_profile_warns() {
        let document = doc(&[("web", &[], &[])]);
        let plan = plan(&document, &profiles(&["nope"])).unwrap();
        assert_eq!(plan.warnings.len(), 1);
        assert!(plan.is_deployable());
    }
}
