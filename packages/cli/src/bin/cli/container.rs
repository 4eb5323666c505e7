// ABOUTME: `solitary health` and `solitary info` commands for the target container
// ABOUTME: Health never fails the CLI itself; an unhealthy target exits with status 1

use anyhow::Result;
use solitary_cli::output::{self, HealthReport};
use solitary_sandbox::Sandbox;

pub async fn health_command(sandbox: &Sandbox, json: bool) -> Result<i32> {
    let report = HealthReport {
        container: sandbox.config().target(),
        healthy: sandbox.is_healthy().await,
    };

    if json {
        println!("{}", output::to_json(&report)?);
    } else {
        output::print_health(&report);
    }

    Ok(if report.healthy { 0 } else { 1 })
}

pub async fn info_command(sandbox: &Sandbox, json: bool) -> Result<i32> {
    let info = sandbox.container_info().await?;

    if json {
        println!("{}", output::to_json(&info)?);
    } else {
        println!("{}", output::format_info(&info));
    }

    Ok(0)
}
