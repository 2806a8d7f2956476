//! File utilities for ingestion.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Magic bytes every PDF file starts with.
const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Path of the plain-text file extracted from `pdf_path`.
///
/// Only the extension changes; the directory and file stem are kept.
pub fn text_path_for(pdf_path: &Path) -> PathBuf {
    pdf_path.with_extension("txt")
}

/// Basename of a path, used as the `source` payload of stored chunks.
pub fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

/// Check whether a byte buffer starts with the PDF magic bytes.
pub fn is_pdf_bytes(data: &[u8]) -> bool {
    data.len() >= PDF_MAGIC.len() && &data[..PDF_MAGIC.len()] == PDF_MAGIC
}

/// Check whether a file starts with the PDF magic bytes.
pub fn is_pdf_file(path: &Path) -> bool {
    let Ok(mut file) = fs::File::open(path) else {
        return false;
    };
    let mut header = [0u8; 4];
    match file.read_exact(&mut header) {
        Ok(()) => is_pdf_bytes(&header),
        Err(_) => false,
    }
}

/// Check whether a path has a `.pdf` extension (any case).
pub fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("pdf"))
}

/// Calculate SHA-256 checksum of a file's bytes.
pub fn calculate_file_checksum(path: &Path) -> std::io::Result<String> {
    let content = fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&content)))
}

/// Collect PDF files under `path`.
///
/// A file path is returned as-is; a directory is walked recursively and
/// files matching any of `exclude` glob patterns are skipped.
pub fn collect_pdfs(path: &Path, exclude: &[String]) -> Result<Vec<PathBuf>, walkdir::Error> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let patterns: Vec<glob::Pattern> = exclude
        .iter()
        .filter_map(|p| glob::Pattern::new(p).ok())
        .collect();

    let mut files = Vec::new();
    for entry in WalkDir::new(path).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        let entry_path = entry.path();

        if !entry.file_type().is_file() || !has_pdf_extension(entry_path) {
            continue;
        }

        let path_str = entry_path.to_string_lossy();
        if patterns.iter().any(|p| p.matches(&path_str)) {
            continue;
        }

        files.push(entry_path.to_path_buf());
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_path_only_changes_extension() {
        assert_eq!(
            text_path_for(Path::new("/uploads/report.pdf")),
            PathBuf::from("/uploads/report.txt")
        );
        // Directory names containing "pdf" are left alone.
        assert_eq!(
            text_path_for(Path::new("/data/pdfs/pdf-guide.pdf")),
            PathBuf::from("/data/pdfs/pdf-guide.txt")
        );
    }

    #[test]
    fn test_source_name() {
        assert_eq!(source_name(Path::new("/uploads/report.txt")), "report.txt");
        assert_eq!(source_name(Path::new("notes.txt")), "notes.txt");
    }

    #[test]
    fn test_is_pdf_bytes() {
        assert!(is_pdf_bytes(b"%PDF-1.7\n"));
        assert!(!is_pdf_bytes(b"Not a PDF"));
        assert!(!is_pdf_bytes(b"%PD"));
    }

    #[test]
    fn test_has_pdf_extension() {
        assert!(has_pdf_extension(Path::new("a.pdf")));
        assert!(has_pdf_extension(Path::new("A.PDF")));
        assert!(!has_pdf_extension(Path::new("a.txt")));
        assert!(!has_pdf_extension(Path::new("pdf")));
    }

    #[test]
    fn test_collect_pdfs_walks_and_excludes() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("a.pdf"), b"%PDF-1.4").unwrap();
        fs::write(dir.path().join("b.txt"), b"text").unwrap();
        fs::write(nested.join("c.pdf"), b"%PDF-1.4").unwrap();
        fs::write(nested.join("skip.pdf"), b"%PDF-1.4").unwrap();

        let files = collect_pdfs(dir.path(), &["**/skip.pdf".to_string()]).unwrap();
        let names: Vec<String> = files.iter().map(|p| source_name(p)).collect();
        assert_eq!(names, vec!["a.pdf", "c.pdf"]);
    }

    #[test]
    fn test_checksum_and_magic_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        fs::write(&path, b"%PDF-1.4 body").unwrap();
        assert!(is_pdf_file(&path));
        assert_eq!(calculate_file_checksum(&path).unwrap().len(), 64);
    }
}
