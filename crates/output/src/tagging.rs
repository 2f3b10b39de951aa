//! Line tagging copier.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::files::StreamKind;

/// Prefix used by the tagged modes, e.g. `STDOUT 3: `
pub fn stream_prefix(stream: StreamKind, instance: contracts::InstanceId) -> String {
    format!("{} {instance}: ", stream.as_str().to_uppercase())
}

/// Copy `src` to `dst`, inserting `prefix` before every line
///
/// A partial trailing line is tagged too; no byte is added or lost otherwise.
/// Each tagged line goes out in a single `write_all`, which keeps lines from
/// different instances apart on a shared [`crate::MuxWriter`].
///
/// Returns the number of lines copied. I/O errors are propagated unchanged.
pub async fn tag_lines<R, W>(prefix: &str, src: R, dst: &mut W) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(src);
    let mut line = Vec::new();
    let mut tagged = Vec::with_capacity(prefix.len() + 128);
    let mut lines = 0u64;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }

        tagged.clear();
        tagged.extend_from_slice(prefix.as_bytes());
        tagged.extend_from_slice(&line);
        dst.write_all(&tagged).await?;
        lines += 1;
    }

    dst.flush().await?;
    Ok(lines)
}
