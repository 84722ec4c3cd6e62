use std::path::{PathBuf, MAIN_SEPARATOR};

/// Resolves the site root from `%SystemDrive%\home`, falling back to `%HOME%`.
pub fn resolve_site_root() -> PathBuf {
    RepositoryLocator::from_env().resolve_site_root()
}

#[derive(Debug, Clone)]
pub struct RepositoryLocator<F> {
    lookup: F,
}

impl RepositoryLocator<fn(&str) -> Option<String>> {
    pub fn from_env() -> Self {
        Self::with_lookup(env_lookup)
    }
}

impl<F> RepositoryLocator<F>
where
    F: Fn(&str) -> Option<String>,
{
    pub fn with_lookup(lookup: F) -> Self {
        Self { lookup }
    }

    /// The primary candidate is returned only when it is an existing
    /// directory; the fallback is returned as-is, even when unset.
    pub fn resolve_site_root(&self) -> PathBuf {
        let primary = PathBuf::from(self.expand(&format!("%SystemDrive%{MAIN_SEPARATOR}home")));
        if primary.is_dir() {
            return primary;
        }

        PathBuf::from(self.expand("%HOME%"))
    }

    /// Replaces every `%NAME%` with the variable's value. Unset names are left
    /// untouched.
    pub fn expand(&self, template: &str) -> String {
        let mut expanded = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find('%') {
            let after = &rest[start + 1..];
            let Some(name_len) = after.find('%') else {
                break;
            };
            let name = &after[..name_len];

            match Some(name)
                .filter(|name| !name.is_empty())
                .and_then(|name| (self.lookup)(name))
            {
                Some(value) => {
                    expanded.push_str(&rest[..start]);
                    expanded.push_str(&value);
                    rest = &after[name_len + 1..];
                }
                None => {
                    // the closing '%' may open the next variable
                    expanded.push_str(&rest[..start + 1 + name_len]);
                    rest = &after[name_len..];
                }
            }
        }

        expanded.push_str(rest);
        expanded
    }
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}
