use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use sipconform::config::{RegisterCacheTiming, TestRunConfig, ValgrindMode};

/// Black-box conformance test harness for a SIP signaling server
#[derive(Parser)]
#[command(name = "sipconform")]
#[command(about = "Black-box conformance test harness for a SIP signaling server")]
#[command(version)]
pub struct Cli {
    /// Path to the server binary under test
    #[arg(long)]
    pub binary: PathBuf,

    /// Directory holding the per-suite server configuration files
    #[arg(long, default_value = "t")]
    pub config_dir: PathBuf,

    /// Which suite(s) to run
    #[arg(long, value_enum, default_value = "all")]
    pub suite: SuiteArg,

    /// Override the SIP port a suite's server config listens on
    #[arg(long)]
    pub sip_port: Option<u16>,

    /// Override the XML-RPC port a suite's server config listens on
    #[arg(long)]
    pub xmlrpc_port: Option<u16>,

    /// Domain of the monitoring target for the OPTIONS probe
    #[arg(long, default_value = "voip.example.local")]
    pub options_domain: String,

    /// Wrap the server in valgrind
    #[arg(long, value_enum, default_value = "off")]
    pub valgrind: ValgrindArg,

    /// Binding lifetime requested in the register-cache scenario (seconds)
    #[arg(long, default_value = "5")]
    pub lifetime_secs: u32,

    /// Wait before checking binding expiry (seconds)
    #[arg(long, default_value = "7")]
    pub expiry_wait_secs: u64,

    /// Additional wait for the server's garbage-collection sweep (seconds)
    #[arg(long, default_value = "10")]
    pub gc_wait_secs: u64,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SuiteArg {
    Basic,
    RegisterCache,
    All,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ValgrindArg {
    Off,
    Summary,
    Full,
}

impl From<ValgrindArg> for ValgrindMode {
    fn from(arg: ValgrindArg) -> Self {
        match arg {
            ValgrindArg::Off => ValgrindMode::Off,
            ValgrindArg::Summary => ValgrindMode::Summary,
            ValgrindArg::Full => ValgrindMode::Full,
        }
    }
}

/// One runnable suite: the server config it needs and the ports that
/// config listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suite {
    Basic,
    RegisterCache,
}

impl Suite {
    pub fn name(&self) -> &'static str {
        match self {
            Suite::Basic => "basic",
            Suite::RegisterCache => "register-cache",
        }
    }

    fn default_sip_port(&self) -> u16 {
        match self {
            Suite::Basic => 5080,
            Suite::RegisterCache => 5060,
        }
    }

    fn default_xmlrpc_port(&self) -> Option<u16> {
        match self {
            Suite::Basic => Some(8090),
            Suite::RegisterCache => None,
        }
    }
}

impl Cli {
    pub fn suites(&self) -> Vec<Suite> {
        match self.suite {
            SuiteArg::Basic => vec![Suite::Basic],
            SuiteArg::RegisterCache => vec![Suite::RegisterCache],
            SuiteArg::All => vec![Suite::Basic, Suite::RegisterCache],
        }
    }

    /// Per-suite run configuration: `<config_dir>/<suite>.conf` with the
    /// suite's ports unless overridden.
    pub fn suite_config(&self, suite: Suite) -> TestRunConfig {
        let config_file = self.config_dir.join(format!("{}.conf", suite.name()));
        let sip_port = self.sip_port.unwrap_or_else(|| suite.default_sip_port());
        let mut config = TestRunConfig::new(&self.binary, config_file, sip_port)
            .with_valgrind(self.valgrind.into());
        if let Some(port) = self.xmlrpc_port.or_else(|| suite.default_xmlrpc_port()) {
            config = config.with_xmlrpc_port(port);
        }
        config
    }

    pub fn register_cache_timing(&self) -> RegisterCacheTiming {
        RegisterCacheTiming {
            lifetime_secs: self.lifetime_secs,
            expiry_wait: Duration::from_secs(self.expiry_wait_secs),
            gc_wait: Duration::from_secs(self.gc_wait_secs),
        }
    }
}
