//! Verifies layered configuration precedence: defaults, file, environment, CLI.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use once_cell::sync::Lazy;
use ortho_config::OrthoConfig;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use rendezvous_config::{
    Config, DEFAULT_HOST, LogFormat, PortSelection, default_log_filter, default_log_format,
};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct Harness {
    temp_dir: TempDir,
    args: Vec<OsString>,
    overrides: Vec<(&'static str, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl Harness {
    fn new() -> Self {
        let guard = ENV_MUTEX
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Self {
            temp_dir: TempDir::new().expect("create temp dir"),
            args: vec![OsString::from("rendezvousd")],
            overrides: Vec::new(),
            _guard: guard,
        }
    }

    fn write_config(&mut self, contents: &str) {
        let path = self.temp_dir.path().join("rendezvous.toml");
        fs::write(&path, contents).expect("write configuration file");
        self.args.push(OsString::from("--config-path"));
        self.args.push(path.into_os_string());
    }

    fn set_env(&mut self, key: &'static str, value: &str) {
        let previous = std::env::var_os(key);
        // Environment mutation is `unsafe` on edition 2024; the mutex keeps
        // tests in this binary from racing and `Drop` restores the value.
        unsafe { std::env::set_var(key, OsStr::new(value)) };
        self.overrides.push((key, previous));
    }

    fn arg(&mut self, value: &str) {
        self.args.push(OsString::from(value));
    }

    fn load(&self) -> Config {
        Config::load_from_iter(self.args.clone()).expect("configuration should load")
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        while let Some((key, previous)) = self.overrides.pop() {
            match previous {
                Some(value) => unsafe { std::env::set_var(key, value) },
                None => unsafe { std::env::remove_var(key) },
            }
        }
    }
}

#[fixture]
fn harness() -> Harness {
    Harness::new()
}

#[rstest]
fn defaults_apply_without_overrides(harness: Harness) {
    let config = harness.load();
    assert_eq!(config.discovery_path(), None);
    assert_eq!(config.host, DEFAULT_HOST);
    assert_eq!(config.log_filter(), default_log_filter());
    assert_eq!(config.log_format(), default_log_format());
    let server = config.server_config();
    assert_eq!(server.port(), PortSelection::Any);
    assert_eq!(server.inactivity_timeout(), Duration::from_secs(60));
}

#[rstest]
fn file_values_are_loaded(mut harness: Harness) {
    harness.write_config(
        "port = 4100\ninactivity_timeout_secs = 5\nlog_format = \"compact\"\n",
    );
    let config = harness.load();
    assert_eq!(config.port, Some(4100));
    assert_eq!(config.inactivity_timeout_secs, 5);
    assert_eq!(config.log_format(), LogFormat::Compact);
}

#[rstest]
fn environment_overrides_file(mut harness: Harness) {
    harness.write_config("port = 4100\n");
    harness.set_env("RENDEZVOUS_PORT", "4200");
    let config = harness.load();
    assert_eq!(config.port, Some(4200));
}

#[rstest]
fn cli_overrides_environment(mut harness: Harness) {
    harness.set_env("RENDEZVOUS_PORT", "4200");
    harness.arg("--port");
    harness.arg("4300");
    harness.arg("--discovery-file");
    harness.arg("/tmp/rendezvous/server.url");
    let config = harness.load();
    assert_eq!(config.port, Some(4300));
    assert_eq!(
        config.discovery_path().map(camino::Utf8Path::as_str),
        Some("/tmp/rendezvous/server.url")
    );
}

#[rstest]
fn malformed_file_fails_to_load(mut harness: Harness) {
    harness.write_config("port = not_a_number\n");
    let result = Config::load_from_iter(harness.args.clone());
    assert!(result.is_err(), "malformed configuration must be rejected");
}
