use super::prepare;
use colored::Colorize;
use stackflow_deploy::ValidationMode;

pub async fn run(stack: Option<String>) -> anyhow::Result<()> {
    let ctx = prepare(stack).await?;
    // create_stack時点でパースと構造検証は通過している
    let report = ctx
        .orchestrator
        .validate_stack_configuration(&ctx.stack, ValidationMode::Full)
        .await?;

    println!("{} 設定は有効です", "✓".green().bold());
    for warning in &report.warnings {
        println!("  {} {}", "⚠".yellow(), warning.yellow());
    }
    Ok(())
}
