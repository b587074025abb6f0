//! Installed printer enumeration.

use std::io;

use tokio::process::Command;
use tracing::{debug, warn};

/// Names of the printers installed on this machine.
///
/// Enumeration failures are logged and yield an empty list.
pub async fn list_printers() -> Vec<String> {
    match query().await {
        Ok(printers) => {
            debug!(count = printers.len(), "Printers enumerated");
            printers
        }
        Err(e) => {
            warn!("Printer enumeration failed: {}", e);
            Vec::new()
        }
    }
}

#[cfg(windows)]
async fn query() -> io::Result<Vec<String>> {
    let output = Command::new("powershell")
        .args([
            "-NoProfile",
            "-Command",
            "Get-Printer | Select-Object -ExpandProperty Name",
        ])
        .output()
        .await?;
    check(&output)?;
    Ok(parse_names(&String::from_utf8_lossy(&output.stdout)))
}

#[cfg(not(windows))]
async fn query() -> io::Result<Vec<String>> {
    let output = Command::new("lpstat").arg("-p").output().await?;
    check(&output)?;
    Ok(parse_lpstat(&String::from_utf8_lossy(&output.stdout)))
}

fn check(output: &std::process::Output) -> io::Result<()> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(io::Error::other(format!(
        "{} ({})",
        stderr.trim(),
        output.status
    )))
}

/// Parse `lpstat -p` output (`printer <name> is idle. ...`).
#[cfg_attr(windows, allow(dead_code))]
fn parse_lpstat(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.strip_prefix("printer "))
        .filter_map(|rest| rest.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Parse one printer name per line.
#[cfg_attr(not(windows), allow(dead_code))]
fn parse_names(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
