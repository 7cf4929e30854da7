use super::prepare;
use colored::Colorize;

pub async fn run(stack: Option<String>) -> anyhow::Result<()> {
    let ctx = prepare(stack).await?;
    ctx.orchestrator.stop_stack(&ctx.stack).await?;
    println!("{} スタック '{}' を停止しました", "✓".green(), ctx.stack.bold());
    Ok(())
}
