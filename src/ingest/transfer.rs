//! Streaming a request body into its destination file.

use bytes::Bytes;
use futures_util::{pin_mut, Stream, StreamExt};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::ingest::error::{BoxError, TransferError};

/// Copy every chunk of `body` into `file`, in order, and return the number
/// of bytes written.
///
/// The file is flushed before returning so that write errors surface here
/// rather than being lost when the handle is dropped. With `sync` set the
/// data is also forced to stable storage.
pub async fn copy_body<S, E>(body: S, file: &mut File, sync: bool) -> Result<u64, TransferError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<BoxError>,
{
    pin_mut!(body);
    let mut written: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                // Land what was already accepted; partial files are kept.
                let _ = file.flush().await;
                return Err(TransferError::Read {
                    written,
                    source: e.into(),
                });
            }
        };
        file.write_all(&chunk)
            .await
            .map_err(|source| TransferError::Write { written, source })?;
        written += chunk.len() as u64;
    }

    file.flush()
        .await
        .map_err(|source| TransferError::Write { written, source })?;

    if sync {
        file.sync_all()
            .await
            .map_err(|source| TransferError::Sync { written, source })?;
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::io;

    async fn scratch_file(dir: &std::path::Path) -> File {
        tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dir.join("out"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn chunks_are_written_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let mut file = scratch_file(tmp.path()).await;

        let chunks = vec![
            Ok::<_, io::Error>(Bytes::from_static(b"abc")),
            Ok(Bytes::new()),
            Ok(Bytes::from_static(b"defgh")),
        ];
        let written = copy_body(stream::iter(chunks), &mut file, true).await.unwrap();

        assert_eq!(written, 8);
        assert_eq!(std::fs::read(tmp.path().join("out")).unwrap(), b"abcdefgh");
    }

    #[tokio::test]
    async fn empty_body_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut file = scratch_file(tmp.path()).await;

        let written = copy_body(stream::empty::<Result<Bytes, io::Error>>(), &mut file, false)
            .await
            .unwrap();

        assert_eq!(written, 0);
        assert!(std::fs::read(tmp.path().join("out")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_error_keeps_partial_data_and_count() {
        let tmp = tempfile::tempdir().unwrap();
        let mut file = scratch_file(tmp.path()).await;

        let chunks = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer went away")),
            Ok(Bytes::from_static(b"never")),
        ];
        let err = copy_body(stream::iter(chunks), &mut file, false).await.unwrap_err();

        assert!(matches!(err, TransferError::Read { written: 7, .. }));
        assert_eq!(err.written(), 7);
        drop(file);
        assert_eq!(std::fs::read(tmp.path().join("out")).unwrap(), b"partial");
    }
}
