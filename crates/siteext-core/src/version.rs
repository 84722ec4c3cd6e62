use anyhow::{anyhow, bail, Context, Result};
use semver::Version;

/// Parses a feed version, padding one- or two-component versions (`1`, `1.0`)
/// with zeros before handing the rest to semver.
///
/// Four-component versions (`1.2.3.4`) keep the revision as the leading build
/// metadata identifier; a zero revision is dropped so `1.0.0.0` equals `1.0`.
pub fn parse_package_version(input: &str) -> Result<Version> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("package version must not be empty"));
    }

    let (numeric, suffix) = match trimmed.find(['-', '+']) {
        Some(index) => trimmed.split_at(index),
        None => (trimmed, ""),
    };
    let normalized = match numeric.split('.').collect::<Vec<_>>().as_slice() {
        [major] => format!("{major}.0.0{suffix}"),
        [major, minor] => format!("{major}.{minor}.0{suffix}"),
        [major, minor, patch, revision] => {
            with_revision(&format!("{major}.{minor}.{patch}"), revision, suffix)
                .with_context(|| format!("invalid package version '{input}'"))?
        }
        _ => trimmed.to_string(),
    };

    Version::parse(&normalized).with_context(|| format!("invalid package version '{input}'"))
}

fn with_revision(core: &str, revision: &str, suffix: &str) -> Result<String> {
    let revision: u64 = revision
        .parse()
        .map_err(|_| anyhow!("revision '{revision}' must be a number"))?;
    if revision == 0 {
        return Ok(format!("{core}{suffix}"));
    }

    let (pre, build) = match suffix.split_once('+') {
        Some((pre, build)) => (pre, Some(build)),
        None => (suffix, None),
    };
    match build {
        Some("") => bail!("build metadata must not be empty"),
        Some(build) => Ok(format!("{core}{pre}+{revision}.{build}")),
        None => Ok(format!("{core}{pre}+{revision}")),
    }
}
