//! `check-config` subcommand.

use std::path::Path;

use anyhow::bail;

use opsum_config::{ConfigLoader, ConfigValidator};

/// Load and validate a configuration, printing every finding.
pub(crate) fn handle_check_config(path: Option<&Path>) -> anyhow::Result<()> {
    let source = match path {
        Some(path) => path.display().to_string(),
        None => ConfigLoader::default_path()
            .filter(|path| path.exists())
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "<defaults>".to_string()),
    };

    let config = ConfigLoader::load_or_default(path)?;
    let result = ConfigValidator::validate(&config)?;

    for warning in &result.warnings {
        println!("warning: {}: {}", warning.path, warning.message);
    }
    for error in &result.errors {
        println!("error: {}: {}", error.path, error.message);
    }

    if !result.is_valid() {
        bail!("{} has {} error(s)", source, result.errors.len());
    }
    println!(
        "{} is valid (idle {}ms, max time {}ms, max ops {}, ack wait {}ms)",
        source,
        config.summary.idle_time_ms,
        config.summary.max_time_ms,
        config.summary.max_ops,
        config.summary.max_ack_wait_time_ms
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_valid_file_passes() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "[summary]\nmax_ops = 25").expect("write");
        assert!(handle_check_config(Some(file.path())).is_ok());
    }

    #[test]
    fn test_zero_max_ops_fails() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "[summary]\nmax_ops = 0").expect("write");
        assert!(handle_check_config(Some(file.path())).is_err());
    }

    #[test]
    fn test_missing_file_fails() {
        assert!(handle_check_config(Some(Path::new("/nonexistent/opsum.toml"))).is_err());
    }
}
