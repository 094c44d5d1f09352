// logging.rs - File logging for the app (the window owns the terminal)

use std::error::Error;
use std::fs::File;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

/// Truncates `path` and routes all tracing output into it.
/// `RUST_LOG` overrides the default `info` filter.
pub fn init(path: &str) -> Result<(), Box<dyn Error>> {
    let file = File::create(path)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|e| -> Box<dyn Error> { e })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn init_truncates_the_log_and_installs_once() {
        let path = std::env::temp_dir().join(format!("conway_actors_ui-{}.log", std::process::id()));
        fs::write(&path, "stale line\n").unwrap();
        let path = path.to_str().unwrap().to_string();

        init(&path).unwrap();
        assert!(!fs::read_to_string(&path).unwrap().contains("stale line"));
        // A global subscriber is already installed.
        assert!(init(&path).is_err());

        let _ = fs::remove_file(&path);
    }
}
