mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "stackflow")]
#[command(about = "composeファイルでスタックをまるごとデプロイする", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// スタックをデプロイ
    Deploy {
        /// スタック名（省略時はディレクトリ名）
        #[arg(short, long, env = "STACKFLOW_STACK")]
        stack: Option<String>,
        /// 有効化するプロファイル（複数指定可）
        #[arg(short, long)]
        profile: Vec<String>,
        /// 変数オーバーライド（KEY=VALUE、複数指定可）
        #[arg(short, long)]
        env: Vec<String>,
    },
    /// スタックを停止（コンテナとネットワークを削除、ボリュームは保持）
    Stop {
        #[arg(short, long, env = "STACKFLOW_STACK")]
        stack: Option<String>,
    },
    /// スタックを再起動（停止してから再デプロイ）
    Restart {
        #[arg(short, long, env = "STACKFLOW_STACK")]
        stack: Option<String>,
    },
    /// コンテナ一覧と稼働状態を表示
    Ps {
        #[arg(short, long, env = "STACKFLOW_STACK")]
        stack: Option<String>,
    },
    /// composeファイルを検証
    Validate {
        #[arg(short, long, env = "STACKFLOW_STACK")]
        stack: Option<String>,
    },
    /// 宣言されているプロファイルを一覧
    Profiles {
        #[arg(short, long, env = "STACKFLOW_STACK")]
        stack: Option<String>,
    },
    /// デプロイせずにプランを表示
    Preview {
        #[arg(short, long, env = "STACKFLOW_STACK")]
        stack: Option<String>,
        /// 有効化するプロファイル（複数指定可）
        #[arg(short, long)]
        profile: Vec<String>,
    },
    /// スタックを破棄（コンテナと所有リソースを削除）
    Destroy {
        #[arg(short, long, env = "STACKFLOW_STACK")]
        stack: Option<String>,
        /// 所有ボリュームも削除する
        #[arg(long)]
        volumes: bool,
    },
    /// バージョンを表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Versionコマンドは設定ファイル不要
    if matches!(cli.command, Commands::Version) {
        println!("stackflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    match cli.command {
        Commands::Deploy {
            stack,
            profile,
            env,
        } => commands::deploy::run(stack, profile, env).await,
        Commands::Stop { stack } => commands::stop::run(stack).await,
        Commands::Restart { stack } => commands::restart::run(stack).await,
        Commands::Ps { stack } => commands::ps::run(stack).await,
        Commands::Validate { stack } => commands::validate::run(stack).await,
        Commands::Profiles { stack } => commands::profiles::run(stack).await,
        Commands::Preview { stack, profile } => commands::preview::run(stack, profile).await,
        Commands::Destroy { stack, volumes } => commands::destroy::run(stack, volumes).await,
        Commands::Version => unreachable!(),
    }
}
