//! Resolves `#include` lines in IRMF shaders by fetching recognized URLs.
//!
//! Multi-line comments are not honored; an include that should be ignored
//! must be commented out with `//`.

use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// Replaces each recognized `#include "..."` line with the fetched source.
///
/// A recognized include whose fetch fails is dropped entirely so that
/// locally-preprocessed shaders can keep their original include lines; any
/// resulting breakage surfaces later as a shader compile error.
pub async fn resolve_includes(source: &str) -> Result<String, ResolverError> {
    let include_re = Regex::new(r#"^#include\s+"([^"]+)""#).unwrap();

    let mut resolved = String::new();
    for line in source.lines() {
        let trimmed = line.trim();
        if let Some(caps) = include_re.captures(trimmed) {
            if let Some(url) = parse_include_url(&caps[1]) {
                if let Ok(content) = fetch_url(&url).await {
                    resolved.push_str(&content);
                    resolved.push('\n');
                }
                continue;
            }
        }
        resolved.push_str(line);
        resolved.push('\n');
    }

    Ok(resolved)
}

const GITHUB_RAW_PREFIX: &str = "https://raw.githubusercontent.com/";
const LYGIA_BASE_URL: &str = "https://lygia.xyz";
const PREFIX_LYGIA_XYZ: &str = "lygia.xyz/";
const PREFIX_LYGIA: &str = "lygia/";
const PREFIX_GITHUB: &str = "github.com/";

fn parse_include_url(inc: &str) -> Option<String> {
    if !inc.ends_with(".glsl") {
        return None;
    }

    if let Some(rest) = inc.strip_prefix(PREFIX_LYGIA_XYZ) {
        Some(format!("{LYGIA_BASE_URL}/{rest}"))
    } else if let Some(rest) = inc.strip_prefix(PREFIX_LYGIA) {
        Some(format!("{LYGIA_BASE_URL}/{rest}"))
    } else if let Some(rest) = inc.strip_prefix(PREFIX_GITHUB) {
        let location = rest.replacen("/blob/", "/", 1);
        Some(format!("{GITHUB_RAW_PREFIX}{location}"))
    } else {
        None
    }
}

async fn fetch_url(url: &str) -> Result<String, ResolverError> {
    println!("Fetching {url}");
    let content = reqwest::get(url).await?.text().await?;
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_include_url() {
        let include_re = Regex::new(r#"^#include\s+"([^"]+)""#).unwrap();
        let parse = |line: &str| -> Option<String> {
            include_re
                .captures(line)
                .and_then(|caps| parse_include_url(&caps[1]))
        };

        // Unrecognized lines and non-GLSL paths pass through untouched.
        assert_eq!(parse(""), None);
        assert_eq!(parse(r#"#include "bad/include.h""#), None);
        assert_eq!(parse(r#"#include "bad/x.glsl""#), None);

        assert_eq!(
            parse(r#"#include "lygia/math/decimation.glsl""#),
            Some("https://lygia.xyz/math/decimation.glsl".into())
        );
        assert_eq!(
            parse(r#"#include    "lygia/math/decimation.glsl""#),
            Some("https://lygia.xyz/math/decimation.glsl".into())
        );
        // Accidental copy/paste of the site URL is accepted too.
        assert_eq!(
            parse(r#"#include "lygia.xyz/math/decimation.glsl""#),
            Some("https://lygia.xyz/math/decimation.glsl".into())
        );
        assert_eq!(
            parse(r#"#include "github.com/u/r/blob/main/p.glsl""#),
            Some("https://raw.githubusercontent.com/u/r/main/p.glsl".into())
        );
        assert_eq!(
            parse(
                r#"#include "github.com/gmlewis/irmf-examples/blob/master/examples/012-bifilar-electromagnet/rotation.glsl""#
            ),
            Some(
                "https://raw.githubusercontent.com/gmlewis/irmf-examples/master/examples/012-bifilar-electromagnet/rotation.glsl"
                    .into()
            )
        );
    }
}
