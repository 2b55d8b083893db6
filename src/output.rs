use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::record::{Field, ProjectRecord};

fn create(path: &Path) -> Result<File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    File::create(path).with_context(|| format!("Failed to create {}", path.display()))
}

/// Pretty JSON array; records keep canonical field order.
pub fn write_json<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut w = BufWriter::new(create(path)?);
    serde_json::to_writer_pretty(&mut w, rows).with_context(|| format!("Failed to write {}", path.display()))?;
    w.flush()?;
    Ok(())
}

/// CSV with the canonical header, empty cells for missing values.
pub fn write_csv<'a, I>(path: &Path, records: I) -> Result<()>
where
    I: IntoIterator<Item = &'a ProjectRecord>,
{
    let file = create(path)?;
    write_csv_to(file, records).with_context(|| format!("Failed to write {}", path.display()))
}

fn write_csv_to<'a, W, I>(writer: W, records: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a ProjectRecord>,
{
    let mut w = csv::Writer::from_writer(writer);
    w.write_record(Field::ALL.iter().map(|f| f.name()))?;
    for r in records {
        w.write_record(r.row())?;
    }
    w.flush()?;
    Ok(())
}

// ── Tests ──
