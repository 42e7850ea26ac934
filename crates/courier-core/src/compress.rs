//! Compression stage for completed recordings.
//!
//! Never fails: on any error the original path is handed back so the raw file
//! is uploaded instead.
//!
//! # Output handling
//! - bytes are written to `<output>.part` and renamed into place once flushed
//! - a failed run removes only its own `.part` file; an existing `<output>`
//!   (for example from an earlier pass over the same recording) is left alone

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::{debug, warn};
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use crate::config::CompressionFormat;
use crate::domain::artifact::file_name_of;

/// Path the compressed file will be written to.
pub fn output_path(input: &Path, format: CompressionFormat) -> PathBuf {
    let suffix = match format {
        CompressionFormat::None => return input.to_path_buf(),
        CompressionFormat::Gzip => "gz",
        CompressionFormat::Zip => "zip",
    };
    let mut name = input.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Compress `input` and return the path to upload.
///
/// The input is removed only after the output is complete and flushed.
pub async fn compress(input: PathBuf, format: CompressionFormat) -> PathBuf {
    if format == CompressionFormat::None {
        return input;
    }

    let output = output_path(&input, format);
    let partial = partial_path(&output);
    let job_input = input.clone();
    let job_output = output.clone();
    let job_partial = partial.clone();
    let result = tokio::task::spawn_blocking(move || {
        let written = match format {
            CompressionFormat::Gzip => gzip_file(&job_input, &job_partial),
            CompressionFormat::Zip => zip_file(&job_input, &job_partial),
            CompressionFormat::None => Ok(0),
        }
        .and_then(|bytes| std::fs::rename(&job_partial, &job_output).map(|()| bytes));
        if written.is_err() {
            let _ = std::fs::remove_file(&job_partial);
        }
        written
    })
    .await
    .unwrap_or_else(|join_err| Err(io::Error::other(join_err)));

    match result {
        Ok(bytes) => {
            debug!(
                input = %input.display(),
                output = %output.display(),
                bytes,
                "recording compressed"
            );
            if let Err(e) = tokio::fs::remove_file(&input).await {
                warn!(path = %input.display(), error = %e, "failed to remove uncompressed recording");
            }
            output
        }
        Err(e) => {
            warn!(
                path = %input.display(),
                format = ?format,
                error = %e,
                "compression failed, uploading uncompressed recording"
            );
            // a panic skips the cleanup above
            let _ = tokio::fs::remove_file(&partial).await;
            input
        }
    }
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn gzip_file(input: &Path, output: &Path) -> io::Result<u64> {
    let mut reader = BufReader::new(File::open(input)?);
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(output)?), Compression::default());
    let copied = io::copy(&mut reader, &mut encoder)?;
    let mut writer = encoder.finish()?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(copied)
}

fn zip_file(input: &Path, output: &Path) -> io::Result<u64> {
    let mut reader = BufReader::new(File::open(input)?);
    let mut archive = zip::ZipWriter::new(BufWriter::new(File::create(output)?));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    archive
        .start_file(file_name_of(input), options)
        .map_err(io::Error::other)?;
    let copied = io::copy(&mut reader, &mut archive)?;
    let mut writer = archive.finish().map_err(io::Error::other)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(copied)
}
