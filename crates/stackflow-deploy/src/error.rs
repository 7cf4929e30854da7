use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("設定のバリデーションに失敗しました: {0}")]
    Validation(String),

    #[error(
        "デプロイプランにエラーがあります: {0}\n\nヒント:\n  • 除外されたサービスへの依存はプロファイルを見直してください"
    )]
    Plan(String),

    #[error("サービス '{service}' のコンテナ作成に失敗しました: {message}")]
    ContainerCreate { service: String, message: String },

    #[error("サービス '{service}' の依存条件 {condition} がタイムアウトしました")]
    DependencyTimeout { service: String, condition: String },

    #[error(
        "スタック '{0}' が見つかりません\n\nヒント:\n  • `stackflow ps` で登録済みスタックを確認してください"
    )]
    StackNotFound(String),

    #[error("スタック '{0}' は既に存在します")]
    StackConflict(String),

    #[error("スタック '{0}' は稼働中のためこの操作を実行できません（先に停止してください）")]
    StackRunning(String),

    #[error("デプロイ全体の制限時間（{deadline_ms}ms）を超過しました")]
    DeadlineExceeded { deadline_ms: u64 },

    #[error("ストア操作に失敗しました: {0}")]
    Store(String),

    #[error(transparent)]
    Engine(#[from] stackflow_engine::EngineError),

    #[error(transparent)]
    Compose(#[from] stackflow_compose::ComposeError),
}

pub type Result<T> = std::result::Result<T, DeployError>;
