use std::path::{Path, PathBuf};

use anyhow::bail;
use tipflow_core::RunConfig;

pub fn init(path: &str, name: &str) -> anyhow::Result<()> {
    let output = write_scaffold(Path::new(path), name)?;
    println!("✓ Generated {}", output.display());
    Ok(())
}

fn write_scaffold(dir: &Path, name: &str) -> anyhow::Result<PathBuf> {
    let output = dir.join("run.toml");
    if output.exists() {
        bail!("{} already exists", output.display());
    }
    std::fs::write(&output, RunConfig::scaffold(name).to_toml_string()?)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaffold_is_loadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_scaffold(dir.path(), "demo").unwrap();
        let config = RunConfig::from_file(&path).unwrap();
        assert_eq!(config.run.name, "demo");
        config.validate().unwrap();
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        write_scaffold(dir.path(), "demo").unwrap();
        assert!(write_scaffold(dir.path(), "demo").is_err());
    }
}
