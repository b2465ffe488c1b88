//! Locating the SSO authorization URL in remote output and deriving the
//! local callback port from its `redirect_uri`.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::error::UrlError;

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z][A-Za-z0-9+.\-]*://\S+").expect("URL pattern compiles")
});

const REDIRECT_URI_PARAM: &str = "redirect_uri";

/// Returns the first `scheme://...` run in `line`, if any.
pub fn find_url(line: &str) -> Option<&str> {
    URL_PATTERN.find(line).map(|found| found.as_str())
}

/// Percent-decodes `url` for display and for the browser.
///
/// Invalid UTF-8 escapes are left undecoded.
pub fn decode_url(url: &str) -> String {
    urlencoding::decode(url)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| url.to_string())
}

/// Extracts the explicit port of the `redirect_uri` query parameter.
pub fn derive_port(url: &str) -> Result<u16, UrlError> {
    let decoded = urlencoding::decode(url)
        .map_err(|_| UrlError::InvalidUrl(url.to_string()))?
        .into_owned();
    let parsed = Url::parse(&decoded).map_err(|_| UrlError::InvalidUrl(decoded.clone()))?;

    let Some(redirect_uri) = parsed
        .query_pairs()
        .find(|(key, _)| key == REDIRECT_URI_PARAM)
        .map(|(_, value)| value.into_owned())
    else {
        return Err(UrlError::MissingRedirectUri(decoded));
    };

    let redirect = Url::parse(&redirect_uri)
        .map_err(|_| UrlError::InvalidRedirectUri(redirect_uri.clone()))?;
    match redirect.port() {
        Some(port) => Ok(port),
        // `url` drops a port equal to the scheme default, e.g. `http://host:80`
        None if names_port(&redirect_uri) => redirect
            .port_or_known_default()
            .ok_or(UrlError::PortNotFound(redirect_uri)),
        None => Err(UrlError::PortNotFound(redirect_uri)),
    }
}

/// Whether the authority of `raw` spells out a `:port`.
fn names_port(raw: &str) -> bool {
    let Some((_, rest)) = raw.split_once("://") else {
        return false;
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let after_host = host_port.rsplit_once(']').map_or(host_port, |(_, tail)| tail);
    after_host
        .split_once(':')
        .is_some_and(|(_, port)| !port.is_empty())
}
