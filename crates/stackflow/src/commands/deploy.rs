use super::{parse_env_overrides, prepare, profile_set};
use colored::Colorize;

pub async fn run(
    stack: Option<String>,
    profiles: Vec<String>,
    env: Vec<String>,
) -> anyhow::Result<()> {
    let overrides = parse_env_overrides(&env)?;
    let ctx = prepare(stack).await?;
    let profiles = profile_set(profiles);

    println!("{} スタック '{}' をデプロイします...", "→".cyan(), ctx.stack.bold());

    let report = ctx
        .orchestrator
        .deploy_stack(&ctx.stack, &profiles, &overrides)
        .await?;

    for service in &report.deployed {
        println!("  {} {}", "✓".green(), service);
    }
    for skipped in &report.skipped {
        println!(
            "  {} {} {}",
            "-".dimmed(),
            skipped.name.dimmed(),
            format!("({})", skipped.reason).dimmed()
        );
    }
    for warning in &report.warnings {
        println!("  {} {}", "⚠".yellow(), warning.yellow());
    }

    println!();
    println!(
        "{} {}個のサービスが稼働中です",
        "✓".green().bold(),
        report.deployed.len()
    );
    Ok(())
}
