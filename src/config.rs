//! Configuration management for build-chromium.
//!
//! Reads the JSON builder configuration, applies command-line overrides and
//! falls back to host defaults. The result is an immutable [`Config`] that is
//! handed to every component; nothing reads configuration from globals.
//!
//! Precedence: command line > configuration file > host defaults.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{BuildError, BuildResult};
use crate::sink::LogSink;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONF_FILE: &str = ".build.conf";

/// Marker file name inside the output directory.
pub const MARKER_FILE: &str = "SUCCEED";

/// Default ninja target on desktop platforms.
pub const DEFAULT_TARGET: &str = "chrome";

/// Ninja target producing the Android APK.
pub const ANDROID_TARGET: &str = "chrome_public_apk";

// =============================================================================
// Typed values
// =============================================================================

/// Values accepted by `gn help target_os`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOs {
    Android,
    Chromeos,
    Linux,
    Nacl,
    Mac,
    Win,
}

impl TargetOs {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Android => "android",
            Self::Chromeos => "chromeos",
            Self::Linux => "linux",
            Self::Nacl => "nacl",
            Self::Mac => "mac",
            Self::Win => "win",
        }
    }

    /// OS of the machine running the build. Other unixes build as linux.
    pub fn host() -> Self {
        match std::env::consts::OS {
            "macos" => Self::Mac,
            "windows" => Self::Win,
            _ => Self::Linux,
        }
    }

    /// Mobile targets are packaged as an APK instead of the desktop binary.
    pub fn is_mobile(self) -> bool {
        self == Self::Android
    }
}

impl FromStr for TargetOs {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "android" => Ok(Self::Android),
            "chromeos" => Ok(Self::Chromeos),
            "linux" => Ok(Self::Linux),
            "nacl" => Ok(Self::Nacl),
            "mac" => Ok(Self::Mac),
            "win" => Ok(Self::Win),
            other => Err(format!(
                "unknown target OS '{}' (expected android|chromeos|linux|nacl|mac|win)",
                other
            )),
        }
    }
}

impl fmt::Display for TargetOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Values accepted by `gn help target_cpu`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetCpu {
    X86,
    X64,
    Arm,
    Arm64,
    Mipsel,
}

impl TargetCpu {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X86 => "x86",
            Self::X64 => "x64",
            Self::Arm => "arm",
            Self::Arm64 => "arm64",
            Self::Mipsel => "mipsel",
        }
    }

    /// CPU of the machine running the build.
    pub fn host() -> BuildResult<Self> {
        Self::from_rust_arch(std::env::consts::ARCH)
    }

    fn from_rust_arch(arch: &str) -> BuildResult<Self> {
        match arch {
            "x86_64" => Ok(Self::X64),
            "x86" => Ok(Self::X86),
            "aarch64" => Ok(Self::Arm64),
            "arm" => Ok(Self::Arm),
            // Rust's "mips" covers both endians; mipsel must be chosen explicitly.
            other => Err(BuildError::config(
                "target-cpu",
                format!("unsupported host arch '{}', set a target CPU explicitly", other),
            )),
        }
    }
}

impl FromStr for TargetCpu {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x86" => Ok(Self::X86),
            "x64" => Ok(Self::X64),
            "arm" => Ok(Self::Arm),
            "arm64" => Ok(Self::Arm64),
            "mipsel" => Ok(Self::Mipsel),
            other => Err(format!(
                "unknown target CPU '{}' (expected x86|x64|arm|arm64|mipsel)",
                other
            )),
        }
    }
}

impl fmt::Display for TargetCpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildType {
    Debug,
    Release,
}

impl FromStr for BuildType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "release" => Ok(Self::Release),
            other => Err(format!("unknown build type '{}' (expected debug|release)", other)),
        }
    }
}

/// Logging verbosity. `verbose` is accepted as an alias for `debug`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" | "verbose" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            other => Err(format!(
                "unknown log level '{}' (expected error|warn|info|verbose|debug|trace)",
                other
            )),
        }
    }
}

// =============================================================================
// Configuration file
// =============================================================================

/// Raw shape of the JSON configuration file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(rename = "target-os")]
    pub target_os: Option<String>,
    #[serde(rename = "target-cpu")]
    pub target_cpu: Option<String>,
    #[serde(rename = "gnArgs", default)]
    pub gn_args: GnArgsSection,
    #[serde(rename = "archive-server", default)]
    pub archive_server: ArchiveServer,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GnArgsSection {
    #[serde(rename = "is-debug")]
    pub is_debug: Option<bool>,
    #[serde(rename = "is-component")]
    pub is_component: Option<bool>,
    pub extra: Option<String>,
}

/// Remote host receiving artifacts and logs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveServer {
    pub host: Option<String>,
    pub dir: Option<String>,
    #[serde(rename = "ssh-user")]
    pub ssh_user: Option<String>,
}

impl ArchiveServer {
    /// Host, dir and ssh user are all non-empty.
    pub fn is_complete(&self) -> bool {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        set(&self.host) && set(&self.dir) && set(&self.ssh_user)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

impl ConfigFile {
    /// Parse configuration JSON. `path` is only used in the error.
    pub fn parse(json: &str, path: &Path) -> BuildResult<Self> {
        serde_json::from_str(json).map_err(|e| BuildError::ConfigParse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Read the configuration file.
    ///
    /// A missing file is only an error when the caller named it explicitly.
    pub fn read(path: &Path, explicit: bool) -> BuildResult<Self> {
        match fs::read_to_string(path) {
            Ok(json) => Self::parse(&json, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
                Ok(Self::default())
            }
            Err(e) => Err(BuildError::ConfigParse {
                path: path.to_path_buf(),
                error: e.to_string(),
            }),
        }
    }
}

/// Values given on the command line. They win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub build_type: Option<BuildType>,
    pub target_os: Option<TargetOs>,
    pub target_cpu: Option<TargetCpu>,
    pub extra_gn_args: Option<String>,
    pub log_level: Option<LogLevel>,
}

// =============================================================================
// Resolved configuration
// =============================================================================

/// Validated builder configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Chromium source checkout (contains `chrome/VERSION`).
    pub root_dir: PathBuf,
    /// `<root>/out/<os>_<cpu>_<debug|release>`
    pub out_dir: PathBuf,
    pub target_os: TargetOs,
    pub target_cpu: TargetCpu,
    pub is_debug: bool,
    pub is_component: bool,
    pub extra_gn_args: Option<String>,
    pub archive: ArchiveServer,
    pub log_level: LogLevel,
    pub log_file: PathBuf,
}

impl Config {
    /// Load and validate configuration for the checkout at `root_dir`.
    pub fn load(
        root_dir: &Path,
        conf_path: &Path,
        conf_explicit: bool,
        overrides: Overrides,
    ) -> BuildResult<Self> {
        let root_dir = validate_root_dir(root_dir)?;
        let file = ConfigFile::read(conf_path, conf_explicit)?;
        Self::resolve(root_dir, file, overrides)
    }

    /// Merge file values, overrides and host defaults.
    ///
    /// `root_dir` is taken as-is; use [`validate_root_dir`] first.
    pub fn resolve(root_dir: PathBuf, file: ConfigFile, overrides: Overrides) -> BuildResult<Self> {
        let target_os = match (overrides.target_os, file.target_os.as_deref()) {
            (Some(os), _) => os,
            (None, Some(s)) if !s.is_empty() => {
                s.parse().map_err(|e| BuildError::config("target-os", e))?
            }
            _ => TargetOs::host(),
        };

        let target_cpu = match (overrides.target_cpu, file.target_cpu.as_deref()) {
            (Some(cpu), _) => cpu,
            (None, Some(s)) if !s.is_empty() => {
                s.parse().map_err(|e| BuildError::config("target-cpu", e))?
            }
            _ => TargetCpu::host()?,
        };

        let is_debug = match overrides.build_type {
            Some(build_type) => build_type == BuildType::Debug,
            None => file.gn_args.is_debug.unwrap_or(false),
        };
        let is_component = file.gn_args.is_component.unwrap_or(false);

        let extra_gn_args = overrides
            .extra_gn_args
            .or(file.gn_args.extra)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let log_level = match (overrides.log_level, file.logging.level.as_deref()) {
            (Some(level), _) => level,
            (None, Some(s)) if !s.is_empty() => {
                s.parse().map_err(|e| BuildError::config("logging.level", e))?
            }
            _ => LogLevel::Info,
        };

        let log_file = file
            .logging
            .file
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(default_log_file);

        let out_dir = root_dir.join("out").join(format!(
            "{}_{}_{}",
            target_os,
            target_cpu,
            if is_debug { "debug" } else { "release" }
        ));

        Ok(Self {
            root_dir,
            out_dir,
            target_os,
            target_cpu,
            is_debug,
            is_component,
            extra_gn_args,
            archive: file.archive_server,
            log_level,
            log_file,
        })
    }

    /// Arguments for `gn gen --args=...`.
    ///
    /// Keys are always emitted in the same order so repeated configure runs
    /// with the same configuration produce byte-identical arguments.
    pub fn gn_args(&self) -> String {
        let mut args = format!(
            "target_os=\"{}\" target_cpu=\"{}\" is_debug={} is_component_build={}",
            self.target_os, self.target_cpu, self.is_debug, self.is_component
        );
        if let Some(ref extra) = self.extra_gn_args {
            args.push(' ');
            args.push_str(extra);
        }
        args
    }

    /// Ninja targets for the compile stage.
    pub fn compile_targets(&self) -> Vec<&'static str> {
        if self.target_os.is_mobile() {
            vec![ANDROID_TARGET]
        } else {
            vec![DEFAULT_TARGET]
        }
    }

    /// Last-succeeded changeset marker.
    pub fn marker_path(&self) -> PathBuf {
        self.out_dir.join(MARKER_FILE)
    }

    /// Written by `gn gen`; its absence means the output dir was never configured.
    pub fn args_gn_path(&self) -> PathBuf {
        self.out_dir.join("args.gn")
    }

    /// File the package stage is expected to leave behind for upload.
    pub fn artifact_path(&self) -> PathBuf {
        if self.target_os.is_mobile() {
            self.out_dir.join("apks").join("ChromePublic.apk")
        } else {
            self.out_dir
                .join(format!("chrome-{}-{}.zip", self.target_os, self.target_cpu))
        }
    }

    /// Log the resolved configuration at debug level.
    pub fn log_summary(&self, sink: &dyn LogSink) {
        let unset = "(unset)";
        sink.debug(&format!("root dir: {}", self.root_dir.display()));
        sink.debug(&format!("out dir: {}", self.out_dir.display()));
        sink.debug(&format!("target OS: {}", self.target_os));
        sink.debug(&format!("target CPU: {}", self.target_cpu));
        sink.debug(&format!("gn args: {}", self.gn_args()));
        sink.debug(&format!("log level: {}", self.log_level.as_str()));
        sink.debug(&format!("log file: {}", self.log_file.display()));
        sink.debug(&format!(
            "archive host: {}",
            self.archive.host.as_deref().unwrap_or(unset)
        ));
        sink.debug(&format!(
            "archive dir: {}",
            self.archive.dir.as_deref().unwrap_or(unset)
        ));
        sink.debug(&format!(
            "archive ssh user: {}",
            self.archive.ssh_user.as_deref().unwrap_or(unset)
        ));
    }
}

/// Check that `root_dir` is a chromium checkout and return its absolute path.
pub fn validate_root_dir(root_dir: &Path) -> BuildResult<PathBuf> {
    let root = fs::canonicalize(root_dir)
        .map_err(|_| BuildError::InvalidRootDir(root_dir.to_path_buf()))?;
    if !root.join("chrome").join("VERSION").is_file() {
        return Err(BuildError::InvalidRootDir(root));
    }
    Ok(root)
}

/// `<tmp>/chromium-<YYYY-MM-DD>.log`
pub fn default_log_file() -> PathBuf {
    let date = chrono::Local::now().format("%Y-%m-%d");
    std::env::temp_dir().join(format!("chromium-{}.log", date))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(json: &str, overrides: Overrides) -> BuildResult<Config> {
        let file = ConfigFile::parse(json, Path::new("test.conf"))?;
        Config::resolve(PathBuf::from("/src/chromium"), file, overrides)
    }

    #[test]
    fn test_gn_args_order() {
        let config = resolve(
            r#"{"target-os": "linux", "target-cpu": "x64", "gnArgs": {"is-debug": false}}"#,
            Overrides::default(),
        )
        .unwrap();

        assert_eq!(
            config.gn_args(),
            r#"target_os="linux" target_cpu="x64" is_debug=false is_component_build=false"#
        );
    }

    #[test]
    fn test_gn_args_appends_extra() {
        let config = resolve(
            r#"{"target-os": "android", "target-cpu": "arm",
                "gnArgs": {"is-debug": true, "is-component": true, "extra": "symbol_level=1"}}"#,
            Overrides::default(),
        )
        .unwrap();

        assert_eq!(
            config.gn_args(),
            r#"target_os="android" target_cpu="arm" is_debug=true is_component_build=true symbol_level=1"#
        );
    }

    #[test]
    fn test_out_dir_layout() {
        let config = resolve(
            r#"{"target-os": "mac", "target-cpu": "arm64", "gnArgs": {"is-debug": true}}"#,
            Overrides::default(),
        )
        .unwrap();

        assert_eq!(config.out_dir, PathBuf::from("/src/chromium/out/mac_arm64_debug"));
        assert_eq!(
            config.marker_path(),
            PathBuf::from("/src/chromium/out/mac_arm64_debug/SUCCEED")
        );
    }

    #[test]
    fn test_cli_overrides_file() {
        let overrides = Overrides {
            build_type: Some(BuildType::Release),
            target_cpu: Some(TargetCpu::X86),
            extra_gn_args: Some("use_goma=true".to_string()),
            ..Default::default()
        };
        let config = resolve(
            r#"{"target-os": "linux", "target-cpu": "x64",
                "gnArgs": {"is-debug": true, "extra": "symbol_level=1"}}"#,
            overrides,
        )
        .unwrap();

        assert!(!config.is_debug);
        assert_eq!(config.target_cpu, TargetCpu::X86);
        assert_eq!(config.extra_gn_args.as_deref(), Some("use_goma=true"));
    }

    #[test]
    fn test_invalid_cpu_names_field() {
        let err = resolve(r#"{"target-os": "linux", "target-cpu": "sparc"}"#, Overrides::default())
            .unwrap_err();

        match err {
            BuildError::Config { field, .. } => assert_eq!(field, "target-cpu"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        let err = resolve(r#"{"gnArgs": {"is-debug": "yes"}}"#, Overrides::default()).unwrap_err();
        assert!(matches!(err, BuildError::ConfigParse { .. }));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err =
            resolve(r#"{"archive-server": {"hots": "x"}}"#, Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("hots"));
    }

    #[test]
    fn test_android_targets_and_artifact() {
        let config = resolve(
            r#"{"target-os": "android", "target-cpu": "arm64"}"#,
            Overrides::default(),
        )
        .unwrap();

        assert_eq!(config.compile_targets(), vec![ANDROID_TARGET]);
        assert!(config.artifact_path().ends_with("apks/ChromePublic.apk"));
    }

    #[test]
    fn test_verbose_is_debug() {
        assert_eq!("verbose".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_host_arch_mapping() {
        assert_eq!(TargetCpu::from_rust_arch("x86_64").unwrap(), TargetCpu::X64);
        assert_eq!(TargetCpu::from_rust_arch("aarch64").unwrap(), TargetCpu::Arm64);
        assert!(TargetCpu::from_rust_arch("powerpc64").is_err());
        assert!(TargetCpu::from_rust_arch("mips").is_err());
    }
}
