use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(
        "Dockerに接続できません: {0}\n\nヒント:\n  • Dockerが起動しているか確認してください\n  • OrbStackまたはDocker Desktopがインストールされているか確認してください"
    )]
    DockerConnectionFailed(String),

    #[error("コンテナ '{container}' が見つかりません")]
    ContainerNotFound { container: String },

    #[error("ネットワーク '{network}' が見つかりません")]
    NetworkNotFound { network: String },

    #[error("ボリューム '{volume}' が見つかりません")]
    VolumeNotFound { volume: String },

    #[error(
        "externalに指定された{kind} '{name}' が存在しません\n\nヒント:\n  • external指定のリソースはstackflowでは作成されません\n  • 事前に作成するか、external指定を外してください"
    )]
    ExternalResourceMissing { kind: String, name: String },

    #[error("イメージ '{image}' のプルに失敗しました: {message}")]
    ImagePullFailed { image: String, message: String },

    #[error(
        "サービス '{service}' の依存条件 {condition} がタイムアウトしました（{timeout_ms}ms）\n\nヒント:\n  • 依存サービスが正常に起動しているか確認してください\n  • depends_onのtimeoutを増やしてみてください"
    )]
    WaitTimeout {
        service: String,
        condition: String,
        timeout_ms: u64,
    },

    #[error("無効なコンテナ仕様: {0}")]
    InvalidSpec(String),

    #[error("Docker APIエラー: {0}")]
    DockerApiError(String),
}

impl From<bollard::errors::Error> for EngineError {
    fn from(err: bollard::errors::Error) -> Self {
        // 404/409は呼び出し側で文脈に応じて処理されるため、ここでは
        // 接続エラーの検出だけを特別扱いする
        let err_str = err.to_string();
        if err_str.contains("Connection refused") || err_str.contains("No such file or directory")
        {
            EngineError::DockerConnectionFailed(err_str)
        } else {
            EngineError::DockerApiError(err_str)
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
