use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Error;
use schemars::{JsonSchema, schema_for};
use tracing::info;
use view_plugin::message::{DocumentDetailLink, PluginContext};
use view_plugin::BridgeCommand;

use crate::view::UiState;

/// Write the JSON Schemas of the bridge vocabulary and the host UI snapshot
/// into `out_dir`. Returns the files written.
pub fn write_schema(out_dir: &Path) -> Result<Vec<PathBuf>, Error> {
    fs::create_dir_all(out_dir)?;
    let written = vec![
        write_one::<BridgeCommand>(out_dir, "bridge-command")?,
        write_one::<PluginContext>(out_dir, "plugin-context")?,
        write_one::<DocumentDetailLink>(out_dir, "document-detail-link")?,
        write_one::<UiState>(out_dir, "ui-state")?,
    ];
    info!("wrote {} schemas to {}", written.len(), out_dir.display());
    Ok(written)
}

fn write_one<T: JsonSchema>(out_dir: &Path, name: &str) -> Result<PathBuf, Error> {
    let schema = schema_for!(T);
    let path = out_dir.join(format!("{name}.schema.json"));
    fs::write(&path, serde_json::to_string_pretty(&schema)?)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn writes_every_schema() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_schema(dir.path()).unwrap();
        assert_eq!(files.len(), 4);

        let text = fs::read_to_string(dir.path().join("bridge-command.schema.json")).unwrap();
        let schema: Value = serde_json::from_str(&text).unwrap();
        assert!(text.contains("setViewFilterSelection"));
        assert!(schema.is_object());
    }
}
