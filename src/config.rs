use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Valgrind wrapping for the server-under-test.
///
/// `Summary` prefixes the command line with plain `valgrind`; `Full` adds
/// full leak reporting on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValgrindMode {
    #[default]
    Off,
    Summary,
    Full,
}

impl ValgrindMode {
    /// Parse the `WITH_VALGRIND` convention: unset/empty means off, the
    /// literal `full` selects full leak reporting, anything else is a
    /// plain valgrind run.
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value {
            None | Some("") => ValgrindMode::Off,
            Some("full") => ValgrindMode::Full,
            Some(_) => ValgrindMode::Summary,
        }
    }
}

/// Immutable per-suite settings. Created once, read-only thereafter.
#[derive(Debug, Clone)]
pub struct TestRunConfig {
    /// Path to the server binary under test
    pub binary: PathBuf,
    /// Path to the server configuration file passed via `-f`
    pub config_file: PathBuf,
    /// UDP port the server listens on for SIP
    pub sip_port: u16,
    /// TCP port the server listens on for XML-RPC, if the suite uses it
    pub xmlrpc_port: Option<u16>,
    /// Optional diagnostic-tool wrapping
    pub valgrind: ValgrindMode,
}

impl TestRunConfig {
    pub fn new(binary: impl Into<PathBuf>, config_file: impl Into<PathBuf>, sip_port: u16) -> Self {
        Self {
            binary: binary.into(),
            config_file: config_file.into(),
            sip_port,
            xmlrpc_port: None,
            valgrind: ValgrindMode::default(),
        }
    }

    pub fn with_xmlrpc_port(mut self, port: u16) -> Self {
        self.xmlrpc_port = Some(port);
        self
    }

    pub fn with_valgrind(mut self, mode: ValgrindMode) -> Self {
        self.valgrind = mode;
        self
    }

    /// Build a config from the environment contract the suites use:
    /// `SERVER_BINARY` names the binary, `SERVER_CONFIG_DIR` the directory
    /// holding `<config_base>.conf` (default `t`), `WITH_VALGRIND` the
    /// diagnostic wrapping. Returns `None` when no binary is configured,
    /// which the integration suites treat as "skip".
    pub fn from_env(config_base: &str, sip_port: u16) -> Option<Self> {
        let binary = env::var("SERVER_BINARY").ok()?;
        let config_dir = env::var("SERVER_CONFIG_DIR").unwrap_or_else(|_| "t".into());
        let config_file = PathBuf::from(config_dir).join(format!("{config_base}.conf"));
        let valgrind = ValgrindMode::from_env_value(env::var("WITH_VALGRIND").ok().as_deref());
        Some(Self::new(binary, config_file, sip_port).with_valgrind(valgrind))
    }
}

/// Timing knobs for the registration-cache scenario.
///
/// The garbage-collection sweep interval is owned by the server; the waits
/// here only need to be generously past it, never equal to it.
#[derive(Debug, Clone, Copy)]
pub struct RegisterCacheTiming {
    /// Lifetime requested in the binding's `Expires` header, seconds
    pub lifetime_secs: u32,
    /// Wait before checking that the binding expired
    pub expiry_wait: Duration,
    /// Additional wait before checking that the expired binding was swept
    pub gc_wait: Duration,
}

impl Default for RegisterCacheTiming {
    fn default() -> Self {
        Self {
            lifetime_secs: 5,
            expiry_wait: Duration::from_secs(7),
            gc_wait: Duration::from_secs(10),
        }
    }
}
