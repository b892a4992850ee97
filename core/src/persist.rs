use chrono::Local;
use log::info;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Serializer, Value};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::SaveError;

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub backup_path: Option<PathBuf>,
    pub final_path: PathBuf,
    pub bytes_written: usize,
}

#[derive(Debug)]
pub(crate) enum ReadError {
    Io(io::Error),
    Json(serde_json::Error),
}

/// Read and parse a UTF-8 JSON document.
pub(crate) fn read_json(path: &Path) -> Result<Value, ReadError> {
    let content = fs::read_to_string(path).map_err(ReadError::Io)?;
    serde_json::from_str(&content).map_err(ReadError::Json)
}

/// Render `value` with `indent` spaces per level. Non-ASCII stays literal.
pub fn render_json(value: &Value, indent: usize) -> Result<Vec<u8>, serde_json::Error> {
    let indent = vec![b' '; indent];
    let mut out = Vec::new();
    let formatter = PrettyFormatter::with_indent(&indent);
    let mut serializer = Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    out.push(b'\n');
    Ok(out)
}

/// Write `value` to `target` through a temp file, optionally keeping a
/// timestamped copy of the previous contents.
pub fn write_json(
    target: &Path,
    value: &Value,
    indent: usize,
    backup_existing: bool,
) -> Result<SaveOutcome, SaveError> {
    let contents = render_json(value, indent)?;
    let io_err = |source: io::Error| SaveError::Io {
        path: target.to_path_buf(),
        source,
    };

    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let backup_path = if backup_existing && target.exists() {
        let timestamp = Local::now().format("%Y%m%d%H%M%S");
        let candidate = target.with_extension(format!(
            "{}.{timestamp}",
            target
                .extension()
                .map(|ext| format!("{}.bak", ext.to_string_lossy()))
                .unwrap_or_else(|| "bak".into()),
        ));
        fs::copy(target, &candidate).map_err(|source| SaveError::Backup {
            path: candidate.clone(),
            source,
        })?;
        Some(candidate)
    } else {
        None
    };

    let temp_path = build_temp_path(target);
    let written = (|| -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(&contents)?;
        file.sync_all()?;
        drop(file);
        replace_file(&temp_path, target)
    })();

    if let Err(err) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(io_err(err));
    }

    info!("saved {} bytes to {}", contents.len(), target.display());
    Ok(SaveOutcome {
        backup_path,
        final_path: target.to_path_buf(),
        bytes_written: contents.len(),
    })
}

#[cfg(target_os = "windows")]
fn replace_file(from: &Path, to: &Path) -> io::Result<()> {
    use std::io::ErrorKind;
    match fs::rename(from, to) {
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            fs::remove_file(to)?;
            fs::rename(from, to)
        }
        other => other,
    }
}

#[cfg(not(target_os = "windows"))]
fn replace_file(from: &Path, to: &Path) -> io::Result<()> {
    fs::rename(from, to)
}

fn build_temp_path(target: &Path) -> PathBuf {
    let mut temp = target.to_path_buf();
    let pid = std::process::id();
    let suffix = format!("__tmp__pid_{}", pid);
    match temp.file_name() {
        Some(name) => {
            let mut os_string = name.to_os_string();
            os_string.push(suffix);
            temp.set_file_name(os_string);
        }
        None => {
            temp.push(format!("temp_{pid}"));
        }
    }
    temp
}
