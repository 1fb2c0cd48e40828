use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use log::debug;
use std::fs::File;
use std::io::{self, BufReader, Chain, Cursor, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

use crate::error::ConntopError;

type ChainReader<R> = Chain<Cursor<Vec<u8>>, R>;

/// Streaming decompression wrapper over any byte source.
/// Detects gzip (1F 8B 08) and zstd (28 B5 2F FD) compression using magic bytes
pub enum DecompressionReader<R: Read> {
    Gzip(MultiGzDecoder<ChainReader<R>>),
    /// zstd decoder requires BufRead input and provides Read output
    Zstd(zstd::Decoder<'static, BufReader<ChainReader<R>>>),
    Plain(ChainReader<R>),
}

impl<R: Read> std::fmt::Debug for DecompressionReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecompressionReader::Gzip(_) => write!(f, "DecompressionReader::Gzip"),
            DecompressionReader::Zstd(_) => write!(f, "DecompressionReader::Zstd"),
            DecompressionReader::Plain(_) => write!(f, "DecompressionReader::Plain"),
        }
    }
}

impl<R: Read> Read for DecompressionReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            DecompressionReader::Gzip(reader) => reader.read(buf),
            DecompressionReader::Zstd(reader) => reader.read(buf),
            DecompressionReader::Plain(reader) => reader.read(buf),
        }
    }
}

impl<R: Read> DecompressionReader<R> {
    /// Peek at the first bytes of `reader` and wrap it in the matching decoder.
    pub fn detect(mut reader: R) -> io::Result<Self> {
        let mut head = [0u8; 4];
        let n = read_head(&mut reader, &mut head)?;

        // Put the read bytes back in front using a cursor chain
        let chained = Cursor::new(head[..n].to_vec()).chain(reader);

        let is_gzip = n >= 3 && head[0] == 0x1F && head[1] == 0x8B && head[2] == 0x08;
        let is_zstd =
            n >= 4 && head[0] == 0x28 && head[1] == 0xB5 && head[2] == 0x2F && head[3] == 0xFD;

        if is_gzip {
            Ok(DecompressionReader::Gzip(MultiGzDecoder::new(chained)))
        } else if is_zstd {
            Ok(DecompressionReader::Zstd(zstd::Decoder::new(chained)?))
        } else {
            Ok(DecompressionReader::Plain(chained))
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DecompressionReader::Gzip(_) => "gzip",
            DecompressionReader::Zstd(_) => "zstd",
            DecompressionReader::Plain(_) => "plain",
        }
    }
}

/// Fill `head` as far as the source allows; short files yield fewer bytes.
fn read_head<R: Read>(reader: &mut R, head: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < head.len() {
        match reader.read(&mut head[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Stdout of an external decompression process such as `gzcat -c file.gz`.
///
/// The exit status is checked once the pipe reaches end-of-stream, so a
/// decompressor that dies half way surfaces as a read error instead of a
/// silently truncated input.
pub struct ExternalDecompressor {
    command: String,
    child: Child,
    stdout: ChildStdout,
    finished: bool,
}

impl ExternalDecompressor {
    pub fn spawn(command: &str, path: &Path) -> Result<Self> {
        let mut child = Command::new(command)
            .arg("-c")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| ConntopError::Decompressor {
                command: command.to_string(),
                detail: e.to_string(),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ConntopError::Decompressor {
                command: command.to_string(),
                detail: "stdout was not captured".to_string(),
            })?;

        Ok(Self {
            command: command.to_string(),
            child,
            stdout,
            finished: false,
        })
    }
}

impl Read for ExternalDecompressor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.finished {
            return Ok(0);
        }
        let n = self.stdout.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.finished = true;
            let status = self.child.wait()?;
            if !status.success() {
                return Err(io::Error::other(ConntopError::Decompressor {
                    command: self.command.clone(),
                    detail: format!("exited with {}", status),
                }));
            }
        }
        Ok(n)
    }
}

impl Drop for ExternalDecompressor {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Open the pipeline input.
///
/// `-` means standard input. A `.gz` path is handed to `decompressor` when one
/// is configured; everything else goes through magic-byte detection.
pub fn open_input(path: &str, decompressor: Option<&str>) -> Result<Box<dyn Read + Send>> {
    if path == "-" {
        let reader = DecompressionReader::detect(io::stdin())
            .context("Failed to detect compression format of stdin")?;
        debug!("reading stdin as {}", reader.kind());
        return Ok(Box::new(reader));
    }

    let path_ref = Path::new(path);
    let extension = path_ref
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    if extension.as_deref() == Some("zip") {
        return Err(ConntopError::UnsupportedArchive(format!(
            "ZIP file decompression is not supported. Only gzip and zstd files are supported for streaming decompression. Extract the ZIP file first: unzip {}",
            path_ref.display()
        ))
        .into());
    }

    if let (Some(command), Some("gz")) = (decompressor, extension.as_deref()) {
        if !path_ref.exists() {
            return Err(ConntopError::Open {
                path: path_ref.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
            }
            .into());
        }
        debug!("decompressing {} with external command '{}'", path, command);
        return Ok(Box::new(ExternalDecompressor::spawn(command, path_ref)?));
    }

    let file = File::open(path_ref).map_err(|source| ConntopError::Open {
        path: path_ref.to_path_buf(),
        source,
    })?;
    let reader = DecompressionReader::detect(file)
        .with_context(|| format!("Failed to detect compression format of {}", path))?;
    debug!("reading {} as {}", path, reader.kind());
    Ok(Box::new(reader))
}
