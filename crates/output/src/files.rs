//! Per-instance output files

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use contracts::InstanceId;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};

/// Which standard stream a file or prefix belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default file prefix: the binary path with its extension removed
pub fn default_stem(binary: &Path) -> PathBuf {
    binary.with_extension("")
}

/// `<stem>.<stream>.<instance>`
///
/// The suffix is appended to the whole stem, so a stem such as `out.v2`
/// keeps its dot.
pub fn output_file_path(stem: &Path, stream: StreamKind, instance: InstanceId) -> PathBuf {
    let mut name = OsString::from(stem.as_os_str());
    name.push(format!(".{}.{instance}", stream.as_str()));
    PathBuf::from(name)
}

/// Create (or truncate) `path` and copy `reader` into it until end-of-stream
///
/// Returns the number of bytes written.
#[instrument(name = "output_file", skip(reader), fields(path = %path.display()))]
pub async fn write_to_file<R>(path: &Path, mut reader: R) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let file = File::create(path).await?;
    let mut writer = BufWriter::new(file);
    let copied = tokio::io::copy(&mut reader, &mut writer).await?;
    writer.flush().await?;
    writer.into_inner().sync_all().await?;
    debug!(bytes = copied, "Output file written");
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_stem_strips_extension() {
        assert_eq!(default_stem(Path::new("/tmp/sol.exe")), Path::new("/tmp/sol"));
        assert_eq!(default_stem(Path::new("./sol")), Path::new("./sol"));
    }

    #[test]
    fn test_output_file_path_format() {
        assert_eq!(
            output_file_path(Path::new("/tmp/sol"), StreamKind::Stdout, 0),
            Path::new("/tmp/sol.stdout.0")
        );
        assert_eq!(
            output_file_path(Path::new("run.v2"), StreamKind::Stderr, 12),
            Path::new("run.v2.stderr.12")
        );
    }

    #[tokio::test]
    async fn test_write_to_file_truncates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sol.stdout.1");
        std::fs::write(&path, b"old contents that are longer").unwrap();

        let copied = write_to_file(&path, &b"new\n"[..]).await.unwrap();
        assert_eq!(copied, 4);
        assert_eq!(std::fs::read(&path).unwrap(), b"new\n");
    }

    #[tokio::test]
    async fn test_write_to_file_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("sol.stdout.0");
        assert!(write_to_file(&path, &b"x"[..]).await.is_err());
    }
}
