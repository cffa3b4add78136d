// Task file commands
pub mod check;
pub mod run;

// Cluster inventory and built-in playbooks
pub mod cluster;
pub mod provision;

use anyhow::Result;

/// Confirm with user
pub fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}
