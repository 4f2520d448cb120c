//! Bootstrap helpers for siren-console.
//!
//! Bootstrap env vars (backend base URL, log filter) live on disk so the
//! console can find its backend before any interactive input. They are read
//! from `~/.siren-console/.env` (standard dotenvy format) in addition to the
//! working-directory `.env`.

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

/// Path to the console-specific `.env` file: `~/.siren-console/.env`.
pub fn siren_env_path() -> PathBuf {
    siren_home().join(".env")
}

/// The console's state directory: `~/.siren-console`.
pub fn siren_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".siren-console")
}

/// Load env vars from `~/.siren-console/.env` (in addition to the standard `.env`).
///
/// Call this **after** `dotenvy::dotenv()` so that the standard `./.env`
/// takes priority over `~/.siren-console/.env`. dotenvy never overwrites
/// existing env vars, so the effective priority is:
///
///   explicit env vars > `./.env` > `~/.siren-console/.env`
pub fn load_siren_env() {
    let path = siren_env_path();
    if path.exists() {
        let _ = dotenvy::from_path(&path);
    }
}

/// Write bootstrap vars to `~/.siren-console/.env`.
///
/// Used by `/connect` to persist the chosen backend across runs. Creates the
/// parent directory if it doesn't exist. Values are double-quoted so that
/// `#` and other shell-special characters are preserved by dotenvy.
pub fn save_bootstrap_env(vars: &[(&str, &str)]) -> std::io::Result<()> {
    let path = siren_env_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut content = String::new();
    for (key, value) in vars {
        // Escape backslashes and double quotes to prevent env var injection
        // (e.g. a value containing `"\nINJECTED="x` would break out of quotes).
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        content.push_str(&format!("{}=\"{}\"\n", key, escaped));
    }
    std::fs::write(&path, content)
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins over the `--log` flag, which wins over the quiet default.
pub fn init_tracing(flag: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(flag.unwrap_or("siren_console=warn")))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
