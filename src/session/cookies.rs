//! Cookie text normalization.
//!
//! Accepts a free-form cookie blob in any of three shapes and produces
//! a normalized, de-duplicated list of single-cookie strings:
//!
//! 1. Netscape-style tab-separated jar (7 fields per line)
//! 2. One `name=value; Attr; ...` record per line
//! 3. A single header-form line (`a=1; b=2; c=3`)
//!
//! Platform cookies are materialized against both platform domains so
//! either hostname can be used interchangeably.

use std::collections::HashSet;

/// The two interchangeable platform domains.
pub const PLATFORM_DOMAINS: [&str; 2] = ["x.com", "twitter.com"];

/// Cookie names a usable authenticated session must carry.
pub const REQUIRED_COOKIES: [&str; 2] = ["auth_token", "ct0"];

/// Attribute names that may follow the `name=value` pair of a cookie.
const COOKIE_ATTRIBUTES: [&str; 7] = [
    "domain", "path", "expires", "max-age", "secure", "httponly", "samesite",
];

#[derive(Debug, Clone, Default)]
struct ParsedCookie {
    name: String,
    value: String,
    domain: Option<String>,
    path: Option<String>,
    secure: bool,
    http_only: bool,
}

impl ParsedCookie {
    /// Render back to a single-cookie string with attributes in a
    /// fixed order, so equal cookies compare equal as strings.
    fn render(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);
        if let Some(domain) = &self.domain {
            out.push_str("; Domain=");
            out.push_str(domain);
        }
        if let Some(path) = &self.path {
            out.push_str("; Path=");
            out.push_str(path);
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        out
    }
}

/// Normalize a cookie blob into de-duplicated single-cookie strings.
///
/// Idempotent: normalizing the joined output again yields the same list.
pub fn normalize_cookies(input: &str) -> Vec<String> {
    let mut parsed = Vec::new();

    for line in input.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('#') && !line.starts_with("#HttpOnly_") {
            continue;
        }
        if let Some(cookie) = parse_jar_line(line) {
            parsed.push(cookie);
            continue;
        }
        parsed.extend(parse_cookie_line(line));
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for cookie in parsed.into_iter().flat_map(expand_domains) {
        let rendered = cookie.render();
        if seen.insert(rendered.clone()) {
            out.push(rendered);
        }
    }
    out
}

/// Parse one Netscape-style jar line: 7 tab-separated fields
/// `domain  include_subdomains  path  secure  expiry  name  value`.
fn parse_jar_line(line: &str) -> Option<ParsedCookie> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 7 {
        return None;
    }

    let (http_only, domain) = match fields[0].strip_prefix("#HttpOnly_") {
        Some(rest) => (true, rest),
        None => (false, fields[0]),
    };
    let name = fields[5].trim();
    if name.is_empty() {
        return None;
    }

    Some(ParsedCookie {
        name: name.to_string(),
        value: fields[6].trim().to_string(),
        domain: Some(domain.trim().to_string()).filter(|d| !d.is_empty()),
        path: Some(fields[2].trim().to_string()).filter(|p| !p.is_empty()),
        secure: fields[3].trim().eq_ignore_ascii_case("true"),
        http_only,
    })
}

/// Parse a `name=value; ...` line. Segments naming a known cookie
/// attribute refine the current cookie; any other `name=value`
/// segment starts a new cookie, which covers header-form input.
fn parse_cookie_line(line: &str) -> Vec<ParsedCookie> {
    let mut cookies: Vec<ParsedCookie> = Vec::new();

    for segment in line.split(';') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        let (key, value) = match segment.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (segment, ""),
        };

        let lowered = key.to_lowercase();
        if COOKIE_ATTRIBUTES.contains(&lowered.as_str()) {
            let Some(current) = cookies.last_mut() else {
                continue;
            };
            match lowered.as_str() {
                "domain" => current.domain = Some(value.to_string()).filter(|d| !d.is_empty()),
                "path" => current.path = Some(value.to_string()).filter(|p| !p.is_empty()),
                "secure" => current.secure = true,
                "httponly" => current.http_only = true,
                _ => {}
            }
            continue;
        }

        if !key.is_empty() && segment.contains('=') {
            cookies.push(ParsedCookie {
                name: key.to_string(),
                value: value.to_string(),
                ..Default::default()
            });
        }
    }

    cookies
}

/// Canonicalize the domain and cross-expand platform cookies.
///
/// Cookies without a domain are treated as platform cookies. A cookie
/// scoped to either platform domain (or a subdomain of one) is emitted
/// once per platform domain in leading-dot form.
fn expand_domains(cookie: ParsedCookie) -> Vec<ParsedCookie> {
    let base = cookie
        .domain
        .as_deref()
        .map(|d| d.trim().to_lowercase())
        .map(|d| d.trim_start_matches('.').to_string())
        .filter(|d| !d.is_empty());

    let is_platform = match &base {
        None => true,
        Some(domain) => PLATFORM_DOMAINS
            .iter()
            .any(|suffix| domain == suffix || domain.ends_with(&format!(".{}", suffix))),
    };

    if is_platform {
        PLATFORM_DOMAINS
            .iter()
            .map(|suffix| {
                let mut copy = cookie.clone();
                copy.domain = Some(format!(".{}", suffix));
                copy
            })
            .collect()
    } else {
        let mut copy = cookie;
        copy.domain = base;
        vec![copy]
    }
}

/// Cookie name: the part before the first `=` of the first segment.
pub fn cookie_name(cookie: &str) -> &str {
    let first = cookie.split(';').next().unwrap_or("");
    first.split('=').next().unwrap_or("").trim()
}

/// Cookie value: the part after the first `=` of the first segment.
pub fn cookie_value(cookie: &str) -> &str {
    let first = cookie.split(';').next().unwrap_or("");
    match first.split_once('=') {
        Some((_, v)) => v.trim(),
        None => "",
    }
}

/// The `Domain` attribute of a normalized cookie string, if present.
pub fn cookie_domain(cookie: &str) -> Option<String> {
    cookie.split(';').skip(1).find_map(|segment| {
        let (k, v) = segment.trim().split_once('=')?;
        if k.trim().eq_ignore_ascii_case("domain") {
            Some(v.trim().to_string())
        } else {
            None
        }
    })
}

/// Names from `required` with no matching cookie (case-insensitive).
///
/// Only names are reported, never values.
pub fn missing_required<'a>(cookies: &[String], required: &[&'a str]) -> Vec<&'a str> {
    required
        .iter()
        .filter(|name| {
            !cookies
                .iter()
                .any(|cookie| cookie_name(cookie).eq_ignore_ascii_case(name))
        })
        .copied()
        .collect()
}

/// First value of the cookie with the given name, case-insensitive.
pub fn find_value<'a>(cookies: &'a [String], name: &str) -> Option<&'a str> {
    cookies
        .iter()
        .find(|cookie| cookie_name(cookie).eq_ignore_ascii_case(name))
        .map(|cookie| cookie_value(cookie))
}

/// Build an HTTP `Cookie` header from first `name=value` pairs,
/// excluding the given names and keeping one value per name.
pub fn cookie_header_excluding(cookies: &[String], exclude: &[&str]) -> String {
    let mut seen = HashSet::new();
    let mut pairs = Vec::new();
    for cookie in cookies {
        let name = cookie_name(cookie);
        if name.is_empty()
            || exclude.iter().any(|e| name.eq_ignore_ascii_case(e))
            || !seen.insert(name.to_lowercase())
        {
            continue;
        }
        pairs.push(format!("{}={}", name, cookie_value(cookie)));
    }
    pairs.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_form_expands_to_both_domains() {
        let cookies = normalize_cookies("auth_token=A; ct0=C");
        assert_eq!(cookies.len(), 4);
        assert!(cookies.contains(&"auth_token=A; Domain=.x.com".to_string()));
        assert!(cookies.contains(&"auth_token=A; Domain=.twitter.com".to_string()));
        assert!(cookies.contains(&"ct0=C; Domain=.x.com".to_string()));
        assert!(cookies.contains(&"ct0=C; Domain=.twitter.com".to_string()));
    }

    #[test]
    fn test_line_form_with_attributes() {
        let cookies = normalize_cookies("sid=1; Domain=.twitter.com; Path=/; Secure; HttpOnly");
        assert_eq!(cookies.len(), 2);
        assert!(cookies
            .contains(&"sid=1; Domain=.x.com; Path=/; Secure; HttpOnly".to_string()));
        assert!(cookies
            .contains(&"sid=1; Domain=.twitter.com; Path=/; Secure; HttpOnly".to_string()));
    }

    #[test]
    fn test_jar_form() {
        let jar = "#HttpOnly_.twitter.com\tTRUE\t/\tTRUE\t0\tauth_token\tabc\n\
                   .x.com\tTRUE\t/\tFALSE\t0\tlang\ten\n";
        let cookies = normalize_cookies(jar);
        assert!(cookies
            .contains(&"auth_token=abc; Domain=.x.com; Path=/; Secure; HttpOnly".to_string()));
        assert!(cookies
            .contains(&"auth_token=abc; Domain=.twitter.com; Path=/; Secure; HttpOnly".to_string()));
        assert!(cookies.contains(&"lang=en; Domain=.x.com; Path=/".to_string()));
        assert_eq!(cookies.len(), 4);
    }

    #[test]
    fn test_comment_lines_skipped() {
        let cookies = normalize_cookies("# Netscape HTTP Cookie File\nfoo=1");
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().all(|c| c.starts_with("foo=1")));
    }

    #[test]
    fn test_foreign_domain_kept_as_is() {
        let cookies = normalize_cookies("tracker=1; Domain=.Example.ORG");
        assert_eq!(cookies, vec!["tracker=1; Domain=example.org".to_string()]);
    }

    #[test]
    fn test_subdomain_collapses_to_canonical() {
        let cookies = normalize_cookies("k=v; Domain=api.x.com");
        assert_eq!(cookies.len(), 2);
        assert!(cookies.contains(&"k=v; Domain=.x.com".to_string()));
        assert!(cookies.contains(&"k=v; Domain=.twitter.com".to_string()));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "auth_token=A; ct0=C",
            "sid=1; Domain=.twitter.com; Path=/; Secure",
            ".x.com\tTRUE\t/\tTRUE\t0\tauth_token\tabc",
        ];
        for input in inputs {
            let once = normalize_cookies(input);
            let twice = normalize_cookies(&once.join("\n"));
            assert_eq!(once, twice, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_duplicates_removed() {
        let cookies = normalize_cookies("a=1\na=1");
        assert_eq!(cookies.len(), 2);
    }

    #[test]
    fn test_missing_required_reports_names_only() {
        let cookies = normalize_cookies("auth_token=SECRET; dummy=1");
        let missing = missing_required(&cookies, &REQUIRED_COOKIES);
        assert_eq!(missing, vec!["ct0"]);

        let cookies = normalize_cookies("AUTH_TOKEN=a; Ct0=c");
        assert!(missing_required(&cookies, &REQUIRED_COOKIES).is_empty());
    }

    #[test]
    fn test_cookie_header_excluding() {
        let cookies = normalize_cookies("auth_token=A; ct0=C; lang=en; guest_id=g1");
        let header = cookie_header_excluding(&cookies, &["auth_token", "ct0"]);
        assert_eq!(header, "lang=en; guest_id=g1");
    }

    #[test]
    fn test_find_value() {
        let cookies = normalize_cookies("gt=12345; lang=en");
        assert_eq!(find_value(&cookies, "GT"), Some("12345"));
        assert_eq!(find_value(&cookies, "nope"), None);
    }
}
