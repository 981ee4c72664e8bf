use crate::db::DB_FILE;
use anyhow::{anyhow, bail, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/school.sqlite3";
pub const BUNDLE_FORMAT: &str = "schoold-workspace-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_id: String,
    pub db_sha256: String,
    pub entry_count: usize,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_id: String,
    pub bundle_format: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Writes the workspace database into a zip bundle at `out_path`. The caller
/// is expected to have no write in flight on the database.
pub fn export_workspace_bundle(workspace: &Path, out_path: &Path) -> anyhow::Result<ExportSummary> {
    let db_path = workspace.join(DB_FILE);
    let db_bytes = std::fs::read(&db_path)
        .with_context(|| format!("failed to read database {}", db_path.to_string_lossy()))?;
    let db_sha256 = sha256_hex(&db_bytes);
    let bundle_id = uuid::Uuid::new_v4().to_string();

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path)
        .with_context(|| format!("failed to create bundle {}", out_path.to_string_lossy()))?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT,
        "bundleId": bundle_id,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": crate::domain::now_timestamp(),
        "dbSha256": db_sha256,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    zip.write_all(&db_bytes)
        .context("failed to write database entry")?;
    zip.finish().context("failed to finalize bundle")?;

    log::info!(
        "exported workspace {} to {}",
        workspace.to_string_lossy(),
        out_path.to_string_lossy()
    );
    Ok(ExportSummary {
        bundle_id,
        db_sha256,
        entry_count: 2,
    })
}

/// Verifies the bundle and replaces the workspace database with its copy.
/// Nothing in the workspace changes unless the checksum matches.
pub fn import_workspace_bundle(in_path: &Path, workspace: &Path) -> anyhow::Result<ImportSummary> {
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest.get("format").and_then(|v| v.as_str()).unwrap_or("");
    if format != BUNDLE_FORMAT {
        bail!("unsupported bundle format: {:?}", format);
    }
    let expected = manifest
        .get("dbSha256")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("manifest missing dbSha256"))?
        .to_string();
    let bundle_id = manifest
        .get("bundleId")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let mut db_bytes = Vec::new();
    archive
        .by_name(DB_ENTRY)
        .context("bundle missing db/school.sqlite3")?
        .read_to_end(&mut db_bytes)
        .context("failed to extract database entry")?;
    let actual = sha256_hex(&db_bytes);
    if actual != expected {
        bail!("database checksum mismatch: manifest {} but entry {}", expected, actual);
    }

    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.to_string_lossy()))?;
    let dst = workspace.join(DB_FILE);
    let tmp = workspace.join(format!("{}.importing", DB_FILE));
    {
        let mut out = File::create(&tmp)
            .with_context(|| format!("failed to create {}", tmp.to_string_lossy()))?;
        out.write_all(&db_bytes)
            .context("failed to write extracted database")?;
        out.flush().context("failed to flush extracted database")?;
    }
    std::fs::rename(&tmp, &dst)
        .with_context(|| format!("failed to move extracted database to {}", dst.to_string_lossy()))?;

    log::info!(
        "imported bundle {} into {}",
        bundle_id,
        workspace.to_string_lossy()
    );
    Ok(ImportSummary {
        bundle_id,
        bundle_format: format.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_dir(prefix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn tampered_database_entry_is_refused() {
        let src = temp_dir("schoold-backup-src");
        std::fs::write(src.join(DB_FILE), b"original").expect("write db");
        let bundle = src.join("out.zip");
        export_workspace_bundle(&src, &bundle).expect("export");

        // Same manifest, different database bytes.
        let mut archive = ZipArchive::new(File::open(&bundle).expect("open")).expect("zip");
        let mut manifest = String::new();
        archive
            .by_name(MANIFEST_ENTRY)
            .expect("manifest")
            .read_to_string(&mut manifest)
            .expect("read");
        let forged = src.join("forged.zip");
        let mut zip = ZipWriter::new(File::create(&forged).expect("create"));
        zip.start_file(MANIFEST_ENTRY, FileOptions::default()).expect("start");
        zip.write_all(manifest.as_bytes()).expect("write");
        zip.start_file(DB_ENTRY, FileOptions::default()).expect("start");
        zip.write_all(b"tampered").expect("write");
        zip.finish().expect("finish");

        let dst = temp_dir("schoold-backup-dst");
        let e = import_workspace_bundle(&forged, &dst).expect_err("checksum");
        assert!(e.to_string().contains("checksum"), "{}", e);
        assert!(!dst.join(DB_FILE).exists());

        let ok = import_workspace_bundle(&bundle, &dst).expect("import");
        assert_eq!(ok.bundle_format, BUNDLE_FORMAT);
        assert_eq!(std::fs::read(dst.join(DB_FILE)).expect("read"), b"original");
    }
}
