use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Serialize a value to JSON (pretty or compact).
pub fn to_json<T: serde::Serialize>(value: &T, compact: bool) -> Result<String, String> {
    if compact {
        serde_json::to_string(value).map_err(|e| format!("JSON serialization failed: {}", e))
    } else {
        serde_json::to_string_pretty(value)
            .map_err(|e| format!("JSON serialization failed: {}", e))
    }
}

/// Line-oriented sink for records, stdout or a file.
pub struct LineWriter {
    inner: Box<dyn Write>,
}

impl LineWriter {
    pub fn open(output_path: Option<&str>) -> Result<Self, String> {
        let inner: Box<dyn Write> = match output_path {
            Some(path) if path != "-" => {
                let file = File::create(Path::new(path))
                    .map_err(|e| format!("Failed to create output file '{}': {}", path, e))?;
                Box::new(BufWriter::new(file))
            }
            _ => Box::new(std::io::stdout()),
        };
        Ok(Self { inner })
    }

    pub fn write_json<T: serde::Serialize>(&mut self, value: &T) -> Result<(), String> {
        let line = to_json(value, true)?;
        self.inner
            .write_all(line.as_bytes())
            .and_then(|_| self.inner.write_all(b"\n"))
            .and_then(|_| self.inner.flush())
            .map_err(|e| format!("Failed to write output: {}", e))
    }
}
