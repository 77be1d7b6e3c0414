//! Source acquisition: download cache, hash verification, scratch
//! preparation.
//!
//! Downloads are delegated to the configured `fetch_cmd` template, tokenized
//! and run as an argv array (never through a shell). The cache under
//! `src_cache` is keyed by the URL's filename; an existing regular file is a
//! hit and is never re-fetched.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::extract;
use crate::logging;
use crate::output;
use crate::recipe::Recipe;
use crate::shell;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Filename component of a source URL.
pub fn url_filename(url: &str) -> String {
    url.rsplit('/')
        .next()
        .unwrap_or(url)
        .split('?')
        .next()
        .unwrap_or(url)
        .to_string()
}

/// Expand the fetch template: substitute `{output}` / `{url}`, or append
/// both when the template names neither.
fn fetch_argv(template: &str, output: &Path, url: &str) -> Vec<String> {
    let mut argv = shell::tokenize(template);
    let out = output.display().to_string();
    let mut substituted = false;
    for token in &mut argv {
        if token == "{output}" {
            *token = out.clone();
            substituted = true;
        } else if token == "{url}" {
            *token = url.to_string();
            substituted = true;
        }
    }
    if !substituted {
        argv.push(out);
        argv.push(url.to_string());
    }
    argv
}

/// Fetch `url` into the source cache and return the cached path.
/// A failed fetch removes whatever partial output was written.
pub fn fetch(cfg: &Config, url: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(&cfg.src_cache)?;
    let filename = url_filename(url);
    let cache_path = cfg.src_cache.join(&filename);

    if cache_path.is_file() {
        output::detail(&format!("{filename} (cache hit)"));
        return Ok(cache_path);
    }

    let (log, _) = logging::open_stage_log(cfg, "fetch", url)?;
    let argv = fetch_argv(&cfg.fetch_cmd, &cache_path, url);
    match shell::run_argv(&argv, &log) {
        Ok(status) if status.success() => {}
        Ok(_) => {
            let _ = std::fs::remove_file(&cache_path);
            return Err(Error::FetchFailed {
                url: url.to_string(),
            });
        }
        Err(e) => {
            let _ = std::fs::remove_file(&cache_path);
            return Err(e);
        }
    }

    output::detail(&format!("fetched {filename}"));
    Ok(cache_path)
}

/// Verify a file against an expected SHA-256 hash; an absent expectation
/// succeeds unconditionally.
pub fn verify(file: &Path, expected: Option<&str>) -> Result<()> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let mut f = std::fs::File::open(file)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let n = f.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    let actual = hex::encode(hasher.finalize());

    if actual != expected.to_lowercase() {
        return Err(Error::HashMismatch {
            file: file.to_path_buf(),
            expected: expected.to_lowercase(),
            actual,
        });
    }
    Ok(())
}

/// Clear the package's scratch area, then fetch, verify, and extract every
/// source into it. Returns the working directory.
pub fn prepare(cfg: &Config, recipe: &Recipe) -> Result<PathBuf> {
    let scratch = cfg.build_dir_for(&recipe.name);
    if scratch.exists() {
        std::fs::remove_dir_all(&scratch)?;
    }
    std::fs::create_dir_all(&scratch)?;

    for (i, url) in recipe.sources.iter().enumerate() {
        let cached = fetch(cfg, url)?;
        verify(&cached, recipe.hash_for(i))?;
        extract::extract(&cached, &scratch)?;
    }

    workdir(&scratch)
}

/// The working directory inside a scratch area: the unique top-level
/// subdirectory when there is exactly one entry and it is a directory,
/// otherwise the scratch root itself.
pub fn workdir(scratch: &Path) -> Result<PathBuf> {
    let entries = std::fs::read_dir(scratch)?.collect::<std::io::Result<Vec<_>>>()?;
    if entries.len() == 1 && entries[0].file_type()?.is_dir() {
        return Ok(entries[0].path());
    }
    Ok(scratch.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;

    // SHA-256 of "hello world"
    const HELLO_SHA: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_url_filename() {
        assert_eq!(url_filename("https://x.org/a/b-1.0.tar.gz"), "b-1.0.tar.gz");
        assert_eq!(url_filename("https://x.org/dl?f=1"), "dl");
        assert_eq!(url_filename("plain.tar.gz"), "plain.tar.gz");
    }

    #[test]
    fn test_fetch_argv_placeholders() {
        let argv = fetch_argv("curl -L -o {output} {url}", Path::new("/tmp/out"), "http://u");
        assert_eq!(argv, vec!["curl", "-L", "-o", "/tmp/out", "http://u"]);
    }

    #[test]
    fn test_fetch_argv_appends_without_placeholders() {
        let argv = fetch_argv("wget -q -O", Path::new("/tmp/out"), "http://u");
        assert_eq!(argv, vec!["wget", "-q", "-O", "/tmp/out", "http://u"]);
    }

    #[test]
    fn test_fetch_copies_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config::sandbox(dir.path());

        // fetch_cmd is "cp {url} {output}": local paths stand in for URLs
        let src = dir.path().join("upstream.tar.gz");
        std::fs::write(&src, b"tarball bytes").unwrap();

        let cached = fetch(&cfg, &src.display().to_string()).unwrap();
        assert_eq!(std::fs::read(&cached).unwrap(), b"tarball bytes");

        // Second fetch hits the cache even if the origin disappears
        std::fs::remove_file(&src).unwrap();
        let again = fetch(&cfg, &src.display().to_string()).unwrap();
        assert_eq!(again, cached);
    }

    #[test]
    fn test_fetch_failure_reports_url() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config::sandbox(dir.path());

        let missing = dir.path().join("nope.tar.gz");
        match fetch(&cfg, &missing.display().to_string()) {
            Err(Error::FetchFailed { url }) => assert!(url.contains("nope.tar.gz")),
            other => panic!("expected FetchFailed, got {other:?}"),
        }
        assert!(!cfg.src_cache.join("nope.tar.gz").exists());
    }

    #[test]
    fn test_verify_absent_hash_passes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, b"anything").unwrap();
        verify(&file, None).unwrap();
    }

    #[test]
    fn test_verify_match_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, b"hello world").unwrap();
        verify(&file, Some(HELLO_SHA)).unwrap();
        verify(&file, Some(&HELLO_SHA.to_uppercase())).unwrap();
    }

    #[test]
    fn test_verify_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, b"tampered").unwrap();

        match verify(&file, Some(HELLO_SHA)) {
            Err(Error::HashMismatch { expected, actual, .. }) => {
                assert_eq!(expected, HELLO_SHA);
                assert_ne!(actual, expected);
            }
            other => panic!("expected HashMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_prepare_single_subdir_is_workdir() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config::sandbox(dir.path());

        let tarball = dir.path().join("pkg-1.0.tar.gz");
        crate::extract::make_tar_gz(&tarball, &[("pkg-1.0/README", "hi")]);

        let recipe = Recipe::parse(
            "pkg",
            &format!("Name: pkg\nVersion: 1.0\nSource: {}\n", tarball.display()),
        )
        .unwrap();

        let wd = prepare(&cfg, &recipe).unwrap();
        assert_eq!(wd, cfg.build_dir_for("pkg").join("pkg-1.0"));
        assert!(wd.join("README").is_file());
    }

    #[test]
    fn test_prepare_flat_archive_uses_scratch_root() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config::sandbox(dir.path());

        let tarball = dir.path().join("flat-1.0.tar.gz");
        crate::extract::make_tar_gz(&tarball, &[("a.txt", "a"), ("b.txt", "b")]);

        let recipe = Recipe::parse(
            "flat",
            &format!("Name: flat\nVersion: 1.0\nSource: {}\n", tarball.display()),
        )
        .unwrap();

        let wd = prepare(&cfg, &recipe).unwrap();
        assert_eq!(wd, cfg.build_dir_for("flat"));
        assert!(wd.join("a.txt").is_file());
    }

    #[test]
    fn test_prepare_clears_previous_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config::sandbox(dir.path());

        let stale = cfg.build_dir_for("pkg").join("stale.o");
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::fs::write(&stale, b"old").unwrap();

        let tarball = dir.path().join("pkg-2.0.tar.gz");
        crate::extract::make_tar_gz(&tarball, &[("pkg-2.0/README", "hi")]);
        let recipe = Recipe::parse(
            "pkg",
            &format!("Name: pkg\nVersion: 2.0\nSource: {}\n", tarball.display()),
        )
        .unwrap();

        prepare(&cfg, &recipe).unwrap();
        assert!(!stale.exists());
    }

    #[test]
    fn test_prepare_hash_mismatch_stops() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config::sandbox(dir.path());

        let tarball = dir.path().join("pkg-1.0.tar.gz");
        crate::extract::make_tar_gz(&tarball, &[("pkg-1.0/README", "hi")]);

        let recipe = Recipe::parse(
            "pkg",
            &format!(
                "Name: pkg\nVersion: 1.0\nSource: {}\nSha256: {HELLO_SHA}\n",
                tarball.display()
            ),
        )
        .unwrap();

        assert!(matches!(
            prepare(&cfg, &recipe),
            Err(Error::HashMismatch { .. })
        ));
        // Nothing extracted into the scratch area
        assert_eq!(
            std::fs::read_dir(cfg.build_dir_for("pkg")).unwrap().count(),
            0
        );
    }
}
