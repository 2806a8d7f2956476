//! Streaming, bounded-memory reads of extracted text files.

use futures::Stream;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Upper bound for a raw load when no embedding chunk size applies.
pub const DEFAULT_LOAD_CHUNK_SIZE: usize = 50 * 1024 * 1024;

/// A single UTF-8 character can take four bytes.
pub const MIN_CHUNK_SIZE: usize = 4;

/// Forward-only reader yielding a text file in chunks of at most
/// `chunk_size` bytes.
///
/// A multi-byte character that would straddle a chunk boundary is carried
/// into the next chunk, so chunks are always valid UTF-8 and concatenate
/// back to the exact file contents.
pub struct ChunkReader {
    file: File,
    chunk_size: usize,
    carry: Vec<u8>,
    eof: bool,
}

impl ChunkReader {
    pub async fn open(path: &Path, chunk_size: usize) -> io::Result<Self> {
        if chunk_size < MIN_CHUNK_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("chunk size must be at least {MIN_CHUNK_SIZE} bytes, got {chunk_size}"),
            ));
        }

        let file = File::open(path).await?;
        Ok(Self {
            file,
            chunk_size,
            carry: Vec::new(),
            eof: false,
        })
    }

    /// Next chunk in file order, or `None` at end of file.
    pub async fn next_chunk(&mut self) -> io::Result<Option<String>> {
        let mut buf = std::mem::take(&mut self.carry);

        while buf.len() < self.chunk_size && !self.eof {
            let start = buf.len();
            buf.resize(self.chunk_size, 0);
            let n = self.file.read(&mut buf[start..]).await?;
            buf.truncate(start + n);
            if n == 0 {
                self.eof = true;
            }
        }

        if buf.is_empty() {
            return Ok(None);
        }

        let valid_up_to = match std::str::from_utf8(&buf) {
            Ok(_) => buf.len(),
            Err(e) if e.error_len().is_none() && !self.eof => e.valid_up_to(),
            Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
        };

        self.carry = buf.split_off(valid_up_to);
        String::from_utf8(buf)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// Stream the chunks of `path`. The file is opened on first poll; a failed
/// open surfaces as the stream's first item.
pub fn load_chunks(
    path: impl AsRef<Path>,
    chunk_size: usize,
) -> impl Stream<Item = io::Result<String>> {
    let path: PathBuf = path.as_ref().to_path_buf();

    futures::stream::try_unfold(None, move |reader: Option<ChunkReader>| {
        let path = path.clone();
        async move {
            let mut reader = match reader {
                Some(reader) => reader,
                None => ChunkReader::open(&path, chunk_size).await?,
            };
            let next = reader.next_chunk().await?;
            Ok::<_, io::Error>(next.map(|chunk| (chunk, Some(reader))))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    async fn collect(path: &Path, chunk_size: usize) -> io::Result<Vec<String>> {
        load_chunks(path, chunk_size).try_collect().await
    }

    fn write_temp(content: &[u8]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn test_ascii_chunk_count_and_sizes() {
        let content = "a".repeat(1000) + &"b".repeat(234);
        let (_dir, path) = write_temp(content.as_bytes());

        let chunks = collect(&path, 512).await.unwrap();
        assert_eq!(chunks.len(), 1234usize.div_ceil(512));
        assert!(chunks.iter().all(|c| c.len() <= 512));
        assert_eq!(chunks[0].len(), 512);
        assert_eq!(chunks.concat(), content);
    }

    #[tokio::test]
    async fn test_exact_multiple() {
        let (_dir, path) = write_temp(b"abcdefgh");
        let chunks = collect(&path, 4).await.unwrap();
        assert_eq!(chunks, vec!["abcd", "efgh"]);
    }

    #[tokio::test]
    async fn test_empty_file_yields_nothing() {
        let (_dir, path) = write_temp(b"");
        assert!(collect(&path, 512).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_multibyte_char_not_split() {
        // "é" is two bytes; with size 5 the third "é" would straddle the boundary.
        let content = "ab\u{e9}\u{e9}\u{e9}cd";
        let (_dir, path) = write_temp(content.as_bytes());

        let chunks = collect(&path, 5).await.unwrap();
        assert!(chunks.iter().all(|c| c.len() <= 5));
        assert_eq!(chunks[0], "ab\u{e9}");
        assert_eq!(chunks.concat(), content);
    }

    #[tokio::test]
    async fn test_four_byte_chars() {
        let content = "\u{1F600}x\u{1F600}";
        let (_dir, path) = write_temp(content.as_bytes());

        let chunks = collect(&path, 4).await.unwrap();
        assert_eq!(chunks, vec!["\u{1F600}", "x", "\u{1F600}"]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_invalid_data() {
        let (_dir, path) = write_temp(&[b'o', b'k', 0xff, 0xfe, b'!']);
        let err = collect(&path, 16).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_truncated_trailing_char_is_invalid_data() {
        let (_dir, path) = write_temp(&[b'o', b'k', 0xe2, 0x82]);
        let err = collect(&path, 16).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_chunk_size_too_small() {
        let (_dir, path) = write_temp(b"abc");
        let err = ChunkReader::open(&path, 3).await.err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_missing_file_surfaces_on_first_item() {
        let dir = tempfile::tempdir().unwrap();
        let err = collect(&dir.path().join("absent.txt"), 512)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_reader_restart_by_reopening() {
        let (_dir, path) = write_temp(b"abcdefgh");
        let mut reader = ChunkReader::open(&path, 4).await.unwrap();
        assert_eq!(reader.next_chunk().await.unwrap().as_deref(), Some("abcd"));

        let mut reopened = ChunkReader::open(&path, 4).await.unwrap();
        assert_eq!(reopened.next_chunk().await.unwrap().as_deref(), Some("abcd"));
        assert_eq!(reader.next_chunk().await.unwrap().as_deref(), Some("efgh"));
        assert_eq!(reader.next_chunk().await.unwrap(), None);
    }
}
