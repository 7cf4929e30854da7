use thiserror::Error;

#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("YAMLパースエラー: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("必須の変数 '{name}' が未定義です: {message}")]
    MissingVariable { name: String, message: String },

    #[error("無効な設定: {0}")]
    InvalidConfig(String),

    #[error("サービス '{service}' の depends_on が未知のサービス '{target}' を参照しています")]
    UnknownDependency { service: String, target: String },

    #[error("循環依存が検出されました: {0}")]
    DependencyCycle(String),

    #[error("無効なポート定義: {0}")]
    InvalidPort(String),

    #[error("無効なマウント定義: {0}")]
    InvalidMount(String),

    #[error("無効なメモリ指定: {0}")]
    InvalidMemory(String),

    #[error("無効な時間指定: {0}")]
    InvalidDuration(String),

    #[error(
        "compose ファイルが見つかりません: {dir}\nヒント:\n  • compose.yaml / compose.yml / docker-compose.yml のいずれかを配置してください\n  • STACKFLOW_COMPOSE_FILE 環境変数で直接指定できます"
    )]
    ComposeFileNotFound { dir: String },
}

pub type Result<T> = std::result::Result<T, ComposeError>;
