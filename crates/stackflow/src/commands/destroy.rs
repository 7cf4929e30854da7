use super::prepare;
use colored::Colorize;

pub async fn run(stack: Option<String>, volumes: bool) -> anyhow::Result<()> {
    let ctx = prepare(stack).await?;
    ctx.orchestrator
        .destroy_stack(&ctx.stack, volumes, true)
        .await?;

    println!("{} スタック '{}' を破棄しました", "✓".green(), ctx.stack.bold());
    if volumes {
        println!("  {}", "所有ボリュームも削除しました".dimmed());
    } else {
        println!("  {}", "ボリュームは保持されています（--volumes で削除）".dimmed());
    }
    Ok(())
}
