//! Markdown records with YAML frontmatter.
//!
//! Every persistent object is a markdown file whose metadata lives in a
//! `---` delimited YAML block at the top. Decoding is tolerant: metadata
//! structs carry a flattened overlay map, so keys written by newer versions
//! survive a load-save round trip untouched.

use crate::error::{Result, StewardError};
use crate::io::atomic_write;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

const DELIMITER: &str = "---";

/// Split a record into its YAML frontmatter and markdown body.
pub fn parse<T: DeserializeOwned>(content: &str, origin: &Path) -> Result<(T, String)> {
    let malformed = |detail: &str| StewardError::MalformedRecord {
        path: origin.display().to_string(),
        detail: detail.to_string(),
    };

    let rest = content
        .strip_prefix(&format!("{DELIMITER}\n"))
        .ok_or_else(|| malformed("missing frontmatter delimiter"))?;
    let (yaml, body) = match rest.split_once(&format!("\n{DELIMITER}\n")) {
        Some((yaml, body)) => (yaml, body),
        None => match rest.strip_suffix(&format!("\n{DELIMITER}")) {
            Some(yaml) => (yaml, ""),
            None => return Err(malformed("unterminated frontmatter")),
        },
    };

    let meta: T = serde_yaml::from_str(yaml).map_err(|e| malformed(&e.to_string()))?;
    Ok((meta, body.trim_start_matches('\n').to_string()))
}

/// Render metadata and body back into record form.
pub fn render<T: Serialize>(meta: &T, body: &str) -> Result<String> {
    let yaml = serde_yaml::to_string(meta)?;
    let mut out = String::with_capacity(yaml.len() + body.len() + 16);
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(&yaml);
    if !yaml.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(DELIMITER);
    out.push('\n');
    if !body.is_empty() {
        out.push('\n');
        out.push_str(body);
        if !body.ends_with('\n') {
            out.push('\n');
        }
    }
    Ok(out)
}

pub fn read<T: DeserializeOwned>(path: &Path) -> Result<(T, String)> {
    let content = std::fs::read_to_string(path)?;
    parse(&content, path)
}

pub fn write<T: Serialize>(path: &Path, meta: &T, body: &str) -> Result<()> {
    let content = render(meta, body)?;
    atomic_write(path, content.as_bytes())
}
