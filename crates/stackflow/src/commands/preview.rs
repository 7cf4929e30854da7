use super::{prepare, profile_set};
use colored::Colorize;

pub async fn run(stack: Option<String>, profiles: Vec<String>) -> anyhow::Result<()> {
    let ctx = prepare(stack).await?;
    let profiles = profile_set(profiles);
    let plan = ctx
        .orchestrator
        .preview_stack_deployment(&ctx.stack, &profiles)
        .await?;

    if !plan.is_deployable() {
        println!("{}", "このプランはデプロイできません:".red().bold());
        for error in &plan.errors {
            println!("  {} {}", "✗".red(), error);
        }
        anyhow::bail!("プランにエラーがあります");
    }

    println!("{}", "デプロイ順序:".bold());
    for (index, batch) in plan.batches.iter().enumerate() {
        println!(
            "  {} {}",
            format!("バッチ{}:", index + 1).cyan(),
            batch.join(", ")
        );
    }

    for skipped in &plan.skipped {
        println!(
            "  {} {} {}",
            "-".dimmed(),
            skipped.name.dimmed(),
            format!("({})", skipped.reason).dimmed()
        );
    }
    for warning in &plan.warnings {
        println!("  {} {}", "⚠".yellow(), warning.yellow());
    }
    Ok(())
}
