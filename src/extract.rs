//! Native archive extraction.
//!
//! Dispatches on the filename suffix; no external tools involved. Entries
//! that could escape the destination (absolute paths or `..` components)
//! are rejected.

use crate::error::{Error, Result};
use crate::output;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path};

/// Extract a tar stream with optional decompression already applied.
fn extract_tar<R: Read>(reader: R, dest: &Path) -> std::io::Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();

        if path.is_absolute() || path.components().any(|c| c == Component::ParentDir) {
            return Err(std::io::Error::other(format!(
                "archive contains unsafe path: {}",
                path.display()
            )));
        }

        let full_path = dest.join(&path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        entry.unpack(&full_path)?;
    }
    Ok(())
}

fn open_buffered(archive: &Path) -> std::io::Result<BufReader<File>> {
    Ok(BufReader::new(File::open(archive)?))
}

fn extract_zip(archive_path: &Path, dest: &Path) -> std::io::Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(std::io::Error::other)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(std::io::Error::other)?;

        // enclosed_name rejects absolute and parent-escaping paths
        let Some(name) = entry.enclosed_name() else {
            continue;
        };
        let outpath = dest.join(name);

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&outpath)?;
            std::io::copy(&mut entry, &mut outfile)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode)).ok();
                }
            }
        }
    }
    Ok(())
}

/// Archive format detected from a filename suffix.
fn detect_format(filename: &str) -> Option<&'static str> {
    let name = filename.to_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Some("tar.gz")
    } else if name.ends_with(".tar.xz") {
        Some("tar.xz")
    } else if name.ends_with(".tar.bz2") {
        Some("tar.bz2")
    } else if name.ends_with(".tar.zst") {
        Some("tar.zst")
    } else if name.ends_with(".zip") {
        Some("zip")
    } else if name.ends_with(".tar") {
        Some("tar")
    } else {
        None
    }
}

/// Extract `archive` into `dest`, creating it as needed. Fails with
/// [`Error::UnsupportedArchive`] for unrecognized suffixes.
pub fn extract(archive: &Path, dest: &Path) -> Result<()> {
    let filename = archive
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let format = detect_format(&filename)
        .ok_or_else(|| Error::UnsupportedArchive(filename.clone()))?;

    std::fs::create_dir_all(dest)?;

    match format {
        "tar.gz" => extract_tar(flate2::read::GzDecoder::new(open_buffered(archive)?), dest)?,
        "tar.xz" => extract_tar(xz2::read::XzDecoder::new(open_buffered(archive)?), dest)?,
        "tar.bz2" => extract_tar(bzip2::read::BzDecoder::new(open_buffered(archive)?), dest)?,
        "tar.zst" => extract_tar(
            zstd::stream::read::Decoder::new(open_buffered(archive)?)?,
            dest,
        )?,
        "tar" => extract_tar(open_buffered(archive)?, dest)?,
        "zip" => extract_zip(archive, dest)?,
        _ => return Err(Error::UnsupportedArchive(filename)),
    }

    output::detail(&format!("extracted {filename}"));
    Ok(())
}

/// Build a small gzipped tarball fixture, for tests across the crate.
#[cfg(test)]
pub(crate) fn make_tar_gz(archive_path: &Path, entries: &[(&str, &str)]) {
    let file = File::create(archive_path).unwrap();
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (name, content) in entries {
        let mut header = tar::Header::new_gnu();
        let name_bytes = name.as_bytes();
        header.as_gnu_mut().unwrap().name[..name_bytes.len()].copy_from_slice(name_bytes);
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, content.as_bytes()).unwrap();
    }

    let encoder = builder.into_inner().unwrap();
    encoder.finish().unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format("foo.tar.gz"), Some("tar.gz"));
        assert_eq!(detect_format("foo.TGZ"), Some("tar.gz"));
        assert_eq!(detect_format("foo.tar.xz"), Some("tar.xz"));
        assert_eq!(detect_format("foo.tar.bz2"), Some("tar.bz2"));
        assert_eq!(detect_format("foo.tar.zst"), Some("tar.zst"));
        assert_eq!(detect_format("foo.zip"), Some("zip"));
        assert_eq!(detect_format("foo.tar"), Some("tar"));
        assert_eq!(detect_format("foo.rar"), None);
        assert_eq!(detect_format("foo"), None);
    }

    #[test]
    fn test_extract_tar_gz_nested() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("pkg.tar.gz");
        make_tar_gz(&archive, &[("pkg-1.0/src/main.c", "int main;")]);

        let dest = dir.path().join("out");
        extract(&archive, &dest).unwrap();

        let extracted = dest.join("pkg-1.0/src/main.c");
        assert_eq!(std::fs::read_to_string(extracted).unwrap(), "int main;");
    }

    #[test]
    fn test_extract_zip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("pkg.zip");

        let file = File::create(&archive).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        zip.start_file("hello.txt", options).unwrap();
        zip.write_all(b"from zip").unwrap();
        zip.finish().unwrap();

        let dest = dir.path().join("out");
        extract(&archive, &dest).unwrap();
        assert_eq!(
            std::fs::read_to_string(dest.join("hello.txt")).unwrap(),
            "from zip"
        );
    }

    #[test]
    fn test_unsupported_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("pkg.rar");
        std::fs::write(&archive, b"not really").unwrap();

        match extract(&archive, &dir.path().join("out")) {
            Err(Error::UnsupportedArchive(name)) => assert_eq!(name, "pkg.rar"),
            other => panic!("expected UnsupportedArchive, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_parent_escape() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("evil.tar.gz");
        make_tar_gz(&archive, &[("../escape.txt", "gotcha")]);

        assert!(extract(&archive, &dir.path().join("out")).is_err());
        assert!(!dir.path().join("escape.txt").exists());
    }
}
