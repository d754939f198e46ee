//! The export sink: signatures written out as named rule files.
//!
//! Filenames come from [`Signature::file_name`], which derives from the same
//! `(technique_id, format)` naming rule as the renderers, so exported names
//! always match in-database rule identifiers.

use std::io;
use std::path::{Path, PathBuf};

use sigsmith_convert::Signature;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to write {name}: {source}")]
    Io { name: String, source: io::Error },
}

/// Anything that accepts a named text blob. The core only needs this narrow
/// surface; directories are one implementation.
pub trait ExportSink {
    fn write(&mut self, name: &str, body: &str) -> Result<(), WriteError>;
}

/// Writes each blob as `<dir>/<name>`.
pub struct DirSink {
    dir: PathBuf,
}

impl DirSink {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(DirSink { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ExportSink for DirSink {
    fn write(&mut self, name: &str, body: &str) -> Result<(), WriteError> {
        std::fs::write(self.dir.join(name), body).map_err(|source| WriteError::Io {
            name: name.to_string(),
            source,
        })
    }
}

/// Export every signature through the sink. A failed write is collected and
/// the remaining exports continue.
pub fn export_signatures(
    sink: &mut dyn ExportSink,
    signatures: &[Signature],
) -> (usize, Vec<WriteError>) {
    let mut written = 0;
    let mut failures = Vec::new();
    for signature in signatures {
        match sink.write(&signature.file_name(), &signature.body) {
            Ok(()) => written += 1,
            Err(e) => {
                warn!(error = %e, "export failed");
                failures.push(e);
            }
        }
    }
    (written, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigsmith_convert::Format;

    fn signature(id: &str, format: Format) -> Signature {
        Signature::new(id, format, format!("body for {id}"), 1)
    }

    #[test]
    fn dir_sink_writes_named_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirSink::new(dir.path()).unwrap();
        let sigs = vec![
            signature("T1055", Format::Yara),
            signature("T1055", Format::Sigma),
        ];

        let (written, failures) = export_signatures(&mut sink, &sigs);
        assert_eq!(written, 2);
        assert!(failures.is_empty());
        assert!(dir.path().join("mitre_t1055_yara.yar").exists());
        assert!(dir.path().join("mitre-t1055-sigma.yml").exists());
    }

    #[test]
    fn one_failed_write_does_not_stop_the_rest() {
        struct FlakySink {
            fail_on: &'static str,
            written: Vec<String>,
        }
        impl ExportSink for FlakySink {
            fn write(&mut self, name: &str, _body: &str) -> Result<(), WriteError> {
                if name.contains(self.fail_on) {
                    return Err(WriteError::Io {
                        name: name.to_string(),
                        source: io::Error::new(io::ErrorKind::Other, "disk full"),
                    });
                }
                self.written.push(name.to_string());
                Ok(())
            }
        }

        let mut sink = FlakySink {
            fail_on: "sigma",
            written: Vec::new(),
        };
        let sigs = vec![
            signature("T1055", Format::Yara),
            signature("T1055", Format::Sigma),
            signature("T1055", Format::Kql),
        ];

        let (written, failures) = export_signatures(&mut sink, &sigs);
        assert_eq!(written, 2);
        assert_eq!(failures.len(), 1);
        assert_eq!(sink.written.len(), 2);
    }
}
