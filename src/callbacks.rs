//! Ready-made callbacks for [`Endpoint::download_async`](crate::Endpoint::download_async).

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn no_op<T>(_result: T) {}

/// Writes `result` to `<file_base>_<unix millis>.json` and returns the path.
pub fn save_to_json<T: Serialize>(result: &T, file_base: &Path) -> Result<PathBuf> {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let mut name = file_base.as_os_str().to_owned();
    name.push(format!("_{}.json", millis));
    let path = PathBuf::from(name);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }

    let file = std::fs::File::create(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer(std::io::BufWriter::new(file), result)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

/// Callback that saves each result with [`save_to_json`], logging failures.
pub fn json_saver<T: Serialize + 'static>(file_base: PathBuf) -> impl FnOnce(T) + Send + 'static {
    move |result| match save_to_json(&result, &file_base) {
        Ok(path) => tracing::info!(path = %path.display(), "Saved API result"),
        Err(e) => tracing::warn!(error = %e, "Failed to save API result"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn saves_timestamped_json() {
        let dir = std::env::temp_dir().join(format!("lizard-callbacks-{}", std::process::id()));
        let path = save_to_json(&json!({"uuid": 1}), &dir.join("api_result")).unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("api_result_"));
        assert!(name.ends_with(".json"));
        let back: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, json!({"uuid": 1}));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn no_op_accepts_anything() {
        no_op(json!(null));
        no_op(42);
    }
}
