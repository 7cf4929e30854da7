use super::prepare;
use colored::Colorize;

pub async fn run(stack: Option<String>) -> anyhow::Result<()> {
    let ctx = prepare(stack).await?;
    let profiles = ctx.orchestrator.get_stack_profiles(&ctx.stack).await?;

    if profiles.is_empty() {
        println!("{}", "プロファイルは宣言されていません".dimmed());
        return Ok(());
    }

    println!("{}", "宣言済みプロファイル:".bold());
    for profile in &profiles {
        println!("  {} {}", "•".cyan(), profile);
    }
    Ok(())
}
