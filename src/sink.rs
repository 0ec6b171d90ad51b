use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::record::WineRecord;

/// Append-only JSONL feed, one record per line, flushed per record so an
/// aborted run keeps everything already emitted.
pub struct DatasetSink {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl DatasetSink {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        Ok(DatasetSink {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn emit(&mut self, record: &WineRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(name: &str) -> WineRecord {
        WineRecord {
            url: format!("https://www.wine-searcher.com/find/{name}"),
            name: name.to_string(),
            appellation: None,
            rating: Some(91),
            style: None,
            search_rank: None,
            avg_price: Some("$20.00".to_string()),
            scraped_at: Utc::now(),
        }
    }

    #[test]
    fn emits_one_json_line_per_record() {
        let path = std::env::temp_dir().join(format!("ws_sink_test_{}.jsonl", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let mut sink = DatasetSink::open(&path).unwrap();
        sink.emit(&sample("wine-a")).unwrap();
        sink.emit(&sample("wine-b")).unwrap();
        drop(sink);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in &lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value.get("name").is_some());
            assert!(value.get("url").is_some());
        }

        std::fs::remove_file(&path).unwrap();
    }
}
