//! JSON files of the session directory

use crate::output::report::SessionReport;
use crate::output::OutputResult;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes `value` as pretty-printed JSON to `path`
pub fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> OutputResult<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Writes `session.json`, `sitemap.json` and `resources.json` into `dir`
pub fn write_session_files(report: &SessionReport, dir: &Path) -> OutputResult<()> {
    write_json(report, &dir.join("session.json"))?;
    write_json(&report.sitemap, &dir.join("sitemap.json"))?;
    write_json(&report.resources, &dir.join("resources.json"))?;
    Ok(())
}
