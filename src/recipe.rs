//! Recipe files: one `<name>.pkg` per package under the recipe tree.
//!
//! The format is line-oriented. Scalar lines are `Key: value` with
//! case-insensitive keys; `Source` and `Sha256` may repeat and accumulate in
//! order. `Build: |` and `Install: |` open literal blocks terminated by
//! `Build: end` / `Install: end`:
//!
//! ```text
//! Name: zlib
//! Version: 1.3.1
//! Source: https://zlib.net/zlib-1.3.1.tar.gz
//! Sha256: 9a93b2b7dfdac77ceba5a558a580e74667dd6fede4585b91eefb60f03b72df23
//! Depends:
//! Build: |
//!   ./configure --prefix=/usr
//!   make $MAKEFLAGS
//! Build: end
//! ```
//!
//! Recipes are re-read on every operation; nothing is cached across
//! operations.

use crate::config::Config;
use crate::error::{Error, Result};

/// A parsed package recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub name: String,
    /// Free-form version string, ordered by [`crate::version::compare`].
    pub version: String,
    /// Source URLs, at least one.
    pub sources: Vec<String>,
    /// Expected SHA-256 hashes, aligned positionally with `sources`.
    /// May be shorter; missing entries are not verified.
    pub hashes: Vec<String>,
    /// Direct dependencies, de-duplicated, first-seen order.
    pub depends: Vec<String>,
    pub build_script: Option<String>,
    pub install_script: Option<String>,
}

/// Package names become path components under the recipe tree and the
/// database root; reject anything that could escape them.
pub fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+'))
}

impl Recipe {
    /// Load the recipe for `name` from the configured recipe tree.
    pub fn load(cfg: &Config, name: &str) -> Result<Self> {
        if !valid_name(name) {
            return Err(Error::RecipeNotFound(name.to_string()));
        }
        let path = cfg.recipe_path(name);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::RecipeNotFound(name.to_string()));
            }
            Err(e) => return Err(Error::Io(e)),
        };
        Self::parse(name, &content)
    }

    /// Parse recipe text. `stem` is the recipe filename stem; the `Name`
    /// field must match it.
    pub fn parse(stem: &str, content: &str) -> Result<Self> {
        let malformed = |reason: String| Error::RecipeMalformed {
            name: stem.to_string(),
            reason,
        };

        let mut name: Option<String> = None;
        let mut version: Option<String> = None;
        let mut sources: Vec<String> = Vec::new();
        let mut hashes: Vec<String> = Vec::new();
        let mut depends: Vec<String> = Vec::new();
        let mut build_script: Option<String> = None;
        let mut install_script: Option<String> = None;

        // (lowercased key, collected lines) while inside a block
        let mut block: Option<(String, Vec<String>)> = None;

        for (lineno, line) in content.lines().enumerate() {
            if let Some((key, body)) = &mut block {
                if let Some((k, v)) = split_kv(line)
                    && k.eq_ignore_ascii_case(key)
                    && v == "end"
                {
                    let script = body.join("\n");
                    match key.as_str() {
                        "build" => build_script = Some(script),
                        "install" => install_script = Some(script),
                        _ => {} // unknown block keys are ignored wholesale
                    }
                    block = None;
                    continue;
                }
                body.push(line.to_string());
                continue;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let Some((key, value)) = split_kv(trimmed) else {
                return Err(malformed(format!("line {}: expected 'Key: value'", lineno + 1)));
            };

            if value == "|" {
                block = Some((key.to_ascii_lowercase(), Vec::new()));
                continue;
            }

            match key.to_ascii_lowercase().as_str() {
                "name" => {
                    if name.is_none() {
                        name = Some(value.to_string());
                    }
                }
                "version" => {
                    if version.is_none() {
                        version = Some(value.to_string());
                    }
                }
                "source" => sources.push(value.to_string()),
                "sha256" => hashes.push(value.to_string()),
                "depends" => {
                    for dep in value.split([',', ' ', '\t']) {
                        let dep = dep.trim();
                        if !dep.is_empty() && !depends.iter().any(|d| d == dep) {
                            depends.push(dep.to_string());
                        }
                    }
                }
                // One-line script form
                "build" => {
                    if build_script.is_none() {
                        build_script = Some(value.to_string());
                    }
                }
                "install" => {
                    if install_script.is_none() {
                        install_script = Some(value.to_string());
                    }
                }
                _ => {} // unknown scalar keys are ignored
            }
        }

        if let Some((key, _)) = block {
            return Err(malformed(format!("unterminated '{key}: |' block")));
        }

        let name = match name {
            Some(n) if !n.is_empty() => n,
            _ => return Err(malformed("missing or empty Name".to_string())),
        };
        if name != stem {
            return Err(malformed(format!(
                "Name '{name}' does not match recipe filename stem '{stem}'"
            )));
        }
        let version = match version {
            Some(v) if !v.is_empty() => v,
            _ => return Err(malformed("missing or empty Version".to_string())),
        };
        if sources.is_empty() {
            return Err(malformed("at least one Source is required".to_string()));
        }

        Ok(Recipe {
            name,
            version,
            sources,
            hashes,
            depends,
            build_script,
            install_script,
        })
    }

    /// Expected hash for the source at `index`, if the recipe declares one.
    pub fn hash_for(&self, index: usize) -> Option<&str> {
        self.hashes.get(index).map(String::as_str)
    }
}

fn split_kv(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    Some((key.trim(), value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<Recipe> {
        Recipe::parse("foo", content)
    }

    #[test]
    fn test_parse_minimal() {
        let r = parse("Name: foo\nVersion: 1.0\nSource: https://example.com/foo-1.0.tar.gz\n")
            .unwrap();
        assert_eq!(r.name, "foo");
        assert_eq!(r.version, "1.0");
        assert_eq!(r.sources.len(), 1);
        assert!(r.hashes.is_empty());
        assert!(r.depends.is_empty());
        assert!(r.build_script.is_none());
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let r = parse("NAME: foo\nversion: 1.0\nSOURCE: u1\n").unwrap();
        assert_eq!(r.name, "foo");
        assert_eq!(r.version, "1.0");
    }

    #[test]
    fn test_repeated_sources_accumulate_in_order() {
        let r = parse("Name: foo\nVersion: 1.0\nSource: u1\nSource: u2\nSha256: h1\n").unwrap();
        assert_eq!(r.sources, vec!["u1", "u2"]);
        assert_eq!(r.hash_for(0), Some("h1"));
        assert_eq!(r.hash_for(1), None);
    }

    #[test]
    fn test_depends_splits_and_dedups() {
        let r = parse("Name: foo\nVersion: 1.0\nSource: u\nDepends: a, b c,, a\tb\n").unwrap();
        assert_eq!(r.depends, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_block_form() {
        let text = "Name: foo\nVersion: 1.0\nSource: u\n\
                    Build: |\n  ./configure\n  make\nBuild: end\n\
                    Install: |\nmake install\nInstall: end\n";
        let r = parse(text).unwrap();
        assert_eq!(r.build_script.as_deref(), Some("  ./configure\n  make"));
        assert_eq!(r.install_script.as_deref(), Some("make install"));
    }

    #[test]
    fn test_block_body_is_literal() {
        // Lines inside a block that look like keys are kept verbatim
        let text = "Name: foo\nVersion: 1.0\nSource: u\n\
                    Build: |\nVersion: not-a-key\nBuild: end\n";
        let r = parse(text).unwrap();
        assert_eq!(r.version, "1.0");
        assert_eq!(r.build_script.as_deref(), Some("Version: not-a-key"));
    }

    #[test]
    fn test_unterminated_block_is_malformed() {
        let err = parse("Name: foo\nVersion: 1.0\nSource: u\nBuild: |\nmake\n").unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn test_missing_name_or_version() {
        assert!(parse("Version: 1.0\nSource: u\n").is_err());
        assert!(parse("Name: foo\nSource: u\n").is_err());
        assert!(parse("Name: foo\nVersion:\nSource: u\n").is_err());
    }

    #[test]
    fn test_name_must_match_stem() {
        let err = Recipe::parse("foo", "Name: bar\nVersion: 1.0\nSource: u\n").unwrap_err();
        assert!(err.to_string().contains("filename stem"));
    }

    #[test]
    fn test_sources_required() {
        assert!(parse("Name: foo\nVersion: 1.0\n").is_err());
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let r = parse("Name: foo\nVersion: 1.0\nSource: u\nMaintainer: someone\n").unwrap();
        assert_eq!(r.name, "foo");
    }

    #[test]
    fn test_comments_and_blank_lines_skipped() {
        let r = parse("# a recipe\n\nName: foo\nVersion: 1.0\nSource: u\n").unwrap();
        assert_eq!(r.name, "foo");
    }

    #[test]
    fn test_line_without_key_is_malformed() {
        assert!(parse("Name: foo\nVersion: 1.0\nSource: u\njust some text\n").is_err());
    }

    #[test]
    fn test_one_line_script_form() {
        let r = parse("Name: foo\nVersion: 1.0\nSource: u\nBuild: make -C src\n").unwrap();
        assert_eq!(r.build_script.as_deref(), Some("make -C src"));
    }

    #[test]
    fn test_valid_name() {
        assert!(valid_name("zlib"));
        assert!(valid_name("gtk+3.0"));
        assert!(valid_name("libfoo-bar_baz"));
        assert!(!valid_name(""));
        assert!(!valid_name(".hidden"));
        assert!(!valid_name("../escape"));
        assert!(!valid_name("a/b"));
    }
}
