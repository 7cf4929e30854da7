use super::prepare;
use colored::Colorize;
use stackflow_engine::RuntimeStatus;

pub async fn run(stack: Option<String>) -> anyhow::Result<()> {
    let ctx = prepare(stack).await?;
    let view = ctx.orchestrator.get_stack(&ctx.stack).await?;

    let status = match view.runtime.status {
        RuntimeStatus::Running => view.runtime.status.as_str().green(),
        RuntimeStatus::PartiallyRunning => view.runtime.status.as_str().yellow(),
        RuntimeStatus::Stopped => view.runtime.status.as_str().red(),
        RuntimeStatus::Unknown => view.runtime.status.as_str().dimmed(),
    };
    println!(
        "{} [{}] {}/{} 稼働中",
        ctx.stack.bold(),
        status,
        view.runtime.running_count,
        view.runtime.container_count
    );

    if view.runtime.containers.is_empty() {
        println!("  {}", "コンテナがありません（未デプロイ）".dimmed());
        return Ok(());
    }

    for container in &view.runtime.containers {
        let mark = if container.running {
            "●".green()
        } else {
            "○".red()
        };
        println!(
            "  {} {} {}",
            mark,
            container.name,
            container
                .service
                .as_deref()
                .map(|s| format!("({})", s))
                .unwrap_or_default()
                .dimmed()
        );
    }
    Ok(())
}
