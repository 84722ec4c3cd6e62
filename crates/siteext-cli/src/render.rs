use anstyle::{AnsiColor, Effects, Style};
use semver::Version;
use siteext_core::web::is_valid_license_url;
use siteext_core::Package;
use siteext_manager::ManagerConfig;
use url::Url;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn resolve_output_style(stdout_is_tty: bool) -> OutputStyle {
    if stdout_is_tty {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("[{}] {message}", status.to_ascii_uppercase()),
    }
}

pub(crate) fn render_section_header(style: OutputStyle, title: &str) -> Option<String> {
    match style {
        OutputStyle::Plain => None,
        OutputStyle::Rich => Some(colorize(section_style(), &format!("== {title} =="))),
    }
}

pub(crate) fn format_search_results(packages: &[Package], terms: &str) -> Vec<String> {
    if packages.is_empty() {
        if terms.trim().is_empty() {
            return vec!["No site extensions found.".to_string()];
        }
        return vec![format!("No site extensions found matching '{terms}'.")];
    }

    let mut lines = Vec::with_capacity(packages.len() + 1);
    lines.push("id\tversion\tdownloads\ttitle".to_string());
    for package in packages {
        lines.push(format!(
            "{}\t{}\t{}\t{}",
            package.id(),
            package.version(),
            package.download_count(),
            package.metadata().display_title()
        ));
    }
    lines
}

pub(crate) fn format_installed_lines(packages: &[Package]) -> Vec<String> {
    if packages.is_empty() {
        return vec!["No site extensions installed.".to_string()];
    }

    packages
        .iter()
        .map(|package| format!("{} {}", package.id(), package.version()))
        .collect()
}

/// One line per update: `id installed -> available`.
pub(crate) fn format_update_lines(updates: &[(Option<Version>, Package)]) -> Vec<String> {
    if updates.is_empty() {
        return vec!["All site extensions are up to date.".to_string()];
    }

    updates
        .iter()
        .map(|(installed, available)| {
            let installed = installed
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "?".to_string());
            format!(
                "{} {installed} -> {}",
                available.id(),
                available.version()
            )
        })
        .collect()
}

pub(crate) fn format_info_lines(
    id: &str,
    versions: &[Package],
    installed: Option<&Package>,
) -> Vec<String> {
    let mut packages = versions.iter().collect::<Vec<_>>();
    packages.sort_by(|left, right| right.version().cmp(left.version()));

    let mut lines = vec![format!("Package: {id}")];
    if let Some(installed) = installed {
        lines.push(format!("Installed: {}", installed.version()));
    }

    let Some(latest) = packages.first() else {
        lines.push("Not available from the remote source.".to_string());
        return lines;
    };
    let metadata = latest.metadata();
    lines.push(format!("Title: {}", metadata.display_title()));
    if let Some(summary) = metadata.summary.as_deref().or(metadata.description.as_deref()) {
        lines.push(format!("Summary: {summary}"));
    }
    if !metadata.authors.is_empty() {
        lines.push(format!("Authors: {}", metadata.authors.join(", ")));
    }
    if let Some(license) = metadata
        .license_url
        .as_deref()
        .and_then(|value| Url::parse(value).ok())
        .filter(is_valid_license_url)
    {
        lines.push(format!("License: {license}"));
    }
    lines.push(format!("Downloads: {}", metadata.download_count));

    lines.push("Versions:".to_string());
    for package in packages {
        let marker = if package.is_prerelease() {
            " (prerelease)"
        } else {
            ""
        };
        lines.push(format!("- {}{marker}", package.version()));
    }

    lines
}

pub(crate) fn format_doctor_lines(config: &ManagerConfig) -> Vec<String> {
    vec![
        format!("site root: {}", config.resolve_site_root().display()),
        format!("extensions: {}", config.local_repository_root().display()),
        format!("remote source: {}", config.remote_source),
    ]
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
