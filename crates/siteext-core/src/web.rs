//! Stateless helpers used by the administration pages: filter values carried
//! in the query string or a cookie, license link validation and query-string
//! construction.

use std::collections::{BTreeMap, HashMap};

use url::form_urlencoded;
use url::Url;

/// A named cookie holding key/value filter entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCookie {
    name: String,
    values: BTreeMap<String, String>,
}

impl FilterCookie {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

pub type CookieJar = BTreeMap<String, FilterCookie>;

/// Reads `key` from the query string, falling back to the named cookie when
/// the query value is missing or empty.
pub fn get_filter_value(
    query: &HashMap<String, String>,
    cookies: &CookieJar,
    cookie_name: &str,
    key: &str,
) -> Option<String> {
    if let Some(value) = query.get(key).filter(|value| !value.is_empty()) {
        return Some(value.clone());
    }

    cookies
        .get(cookie_name)
        .and_then(|cookie| cookie.get(key))
        .map(str::to_string)
}

/// Stores every filter item in the named cookie, creating it first when the
/// jar does not hold one yet.
pub fn persist_filter<'a, I, K, V>(
    cookies: &'a mut CookieJar,
    cookie_name: &str,
    items: I,
) -> &'a FilterCookie
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let cookie = cookies
        .entry(cookie_name.to_string())
        .or_insert_with(|| FilterCookie::new(cookie_name));
    for (key, value) in items {
        cookie.set(key, value);
    }
    cookie
}

pub fn is_valid_license_url(license_url: &Url) -> bool {
    let scheme = license_url.scheme();
    scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
}

/// Builds `?k1=v1&k2=v2` with form URL encoding, in input order. No
/// parameters yield an empty string.
pub fn build_query_string<I, K, V>(parameters: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    let mut empty = true;
    for (key, value) in parameters {
        serializer.append_pair(key.as_ref(), value.as_ref());
        empty = false;
    }

    if empty {
        return String::new();
    }
    format!("?{}", serializer.finish())
}
