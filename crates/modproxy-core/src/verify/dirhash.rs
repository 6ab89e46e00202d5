//! Directory hashes over module artifacts.
//!
//! Hash-of-listing scheme: each file contributes the line
//! `"<sha256-hex>  <name>\n"`, lines are ordered by name, and the digest of
//! the concatenation is emitted as `h1:<base64>`. Recomputing over the same
//! bytes always yields the same string, which is what lets the result be
//! compared verbatim against checksum-database records.

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Hash a module source archive: the listing covers every member of the
/// zip, under its archive-internal name.
///
/// Blocking; callers on the async path should wrap it in
/// `tokio::task::spawn_blocking`.
pub fn hash_zip(zip_path: impl AsRef<Path>) -> Result<String> {
    let zip_path = zip_path.as_ref();
    let file =
        std::fs::File::open(zip_path).map_err(|e| Error::io_with_path(e, zip_path))?;
    let mut archive = zip::ZipArchive::new(file)?;

    let mut files = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();
        let mut hasher = Sha256::new();
        std::io::copy(&mut entry, &mut hasher)
            .map_err(|e| Error::io_with_path(e, zip_path))?;
        files.push((name, hasher.finalize()));
    }

    hash_listing(files)
}

/// Hash a module manifest: the listing is the single logical file `go.mod`
/// backed by the manifest's bytes.
pub fn hash_go_mod(mod_path: impl AsRef<Path>) -> Result<String> {
    let mod_path = mod_path.as_ref();
    let mut file =
        std::fs::File::open(mod_path).map_err(|e| Error::io_with_path(e, mod_path))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buffer)
            .map_err(|e| Error::io_with_path(e, mod_path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    hash_listing(vec![("go.mod".to_string(), hasher.finalize())])
}

fn hash_listing(
    mut files: Vec<(String, sha2::digest::Output<Sha256>)>,
) -> Result<String> {
    files.sort_by(|a, b| a.0.cmp(&b.0));
    let mut outer = Sha256::new();
    for (name, digest) in &files {
        if name.contains('\n') {
            return Err(Error::Other(
                "dirhash: filenames with newlines are not supported".to_string(),
            ));
        }
        outer.update(format!("{}  {}\n", hex::encode(digest), name));
    }
    Ok(format!("h1:{}", BASE64.encode(outer.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    const MOD_CONTENT: &[u8] = b"module example.com/m\n";

    fn write_zip(members: &[(&str, &[u8])]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut writer = zip::ZipWriter::new(file.reopen().unwrap());
        for (name, content) in members {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
        file
    }

    #[test]
    fn zip_hash_matches_known_value() {
        let zip = write_zip(&[("example.com/m@v1.2.3/go.mod", MOD_CONTENT)]);
        assert_eq!(
            hash_zip(zip.path()).unwrap(),
            "h1:4NIOFcPgw6dPaeCpMlXF8QFpZtzQUr0nhztG4cL6GCk="
        );
    }

    #[test]
    fn zip_hash_is_order_independent() {
        let forward = write_zip(&[
            ("example.com/m@v1.2.3/go.mod", MOD_CONTENT),
            ("example.com/m@v1.2.3/a.go", b"package m\n"),
        ]);
        let reversed = write_zip(&[
            ("example.com/m@v1.2.3/a.go", b"package m\n"),
            ("example.com/m@v1.2.3/go.mod", MOD_CONTENT),
        ]);
        let expected = "h1:U+2IBDroCHe8/V84uBjbDJiKQ2dbf69YQuEmKnZGPrQ=";
        assert_eq!(hash_zip(forward.path()).unwrap(), expected);
        assert_eq!(hash_zip(reversed.path()).unwrap(), expected);
    }

    #[test]
    fn zip_hash_changes_with_content() {
        let a = write_zip(&[("example.com/m@v1.2.3/go.mod", MOD_CONTENT)]);
        let b = write_zip(&[("example.com/m@v1.2.3/go.mod", b"module example.com/other\n")]);
        assert_ne!(hash_zip(a.path()).unwrap(), hash_zip(b.path()).unwrap());
    }

    #[test]
    fn go_mod_hash_matches_known_value() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MOD_CONTENT).unwrap();
        file.flush().unwrap();
        assert_eq!(
            hash_go_mod(file.path()).unwrap(),
            "h1:flS2VctbRrTv+sBE+VKgxx6hlkMGPVz9MGOmzMYFg3k="
        );
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            hash_zip("/nonexistent/m.zip"),
            Err(Error::Io { .. })
        ));
    }
}
