use super::prepare;
use colored::Colorize;

pub async fn run(stack: Option<String>) -> anyhow::Result<()> {
    let ctx = prepare(stack).await?;
    let report = ctx.orchestrator.restart_stack(&ctx.stack).await?;
    println!(
        "{} スタック '{}' を再起動しました（{}サービス）",
        "✓".green(),
        ctx.stack.bold(),
        report.deployed.len()
    );
    for warning in &report.warnings {
        println!("  {} {}", "⚠".yellow(), warning.yellow());
    }
    Ok(())
}
