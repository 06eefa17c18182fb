//! Loading the kernel struct offsets the probes read through.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use sockstate_common::SockLayout;

/// Members that legitimately sit at offset zero of their struct.
const MAY_BE_ZERO: &[&str] = &["socket_state"];

/// Reads and validates a layout file.
pub fn load(path: &Path) -> anyhow::Result<SockLayout> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read layout file {}", path.display()))?;
    parse(&json).with_context(|| format!("invalid layout file {}", path.display()))
}

pub fn parse(json: &str) -> anyhow::Result<SockLayout> {
    let layout: SockLayout = serde_json::from_str(json).context("failed to parse layout")?;
    validate(&layout)?;
    Ok(layout)
}

/// Rejects a layout with a zero offset for any member that cannot be first
/// in its struct. A zero there almost always means a missing entry.
pub fn validate(layout: &SockLayout) -> anyhow::Result<()> {
    let value = serde_json::to_value(layout)?;
    let Some(fields) = value.as_object() else {
        bail!("layout did not serialize to an object");
    };

    let mut missing: Vec<&str> = fields
        .iter()
        .filter(|(name, offset)| {
            !MAY_BE_ZERO.contains(&name.as_str()) && offset.as_u64() == Some(0)
        })
        .map(|(name, _)| name.as_str())
        .collect();
    if !missing.is_empty() {
        missing.sort_unstable();
        bail!("zero offset for {}", missing.join(", "));
    }
    Ok(())
}
