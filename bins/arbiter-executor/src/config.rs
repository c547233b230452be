// Language toolchain and runtime settings for the Arbiter executor
use anyhow::{bail, Context, Result};
use arbiter_common::config::{env_or, env_parse};
use arbiter_common::types::Language;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::runner::Limits;

/// How a language is turned into a running process.
///
/// Command templates may use `{source}` (staged source file) and `{dir}`
/// (the job's private workspace directory).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Strategy {
    Compiled { compile: Vec<String>, run: Vec<String> },
    Interpreted { run: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toolchain {
    /// File name the source is staged under inside the workspace
    pub source_file: String,
    #[serde(flatten)]
    pub strategy: Strategy,
    /// Variables stripped from the child environment (JVM banner noise etc.)
    #[serde(default)]
    pub unset_env: Vec<String>,
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

impl Toolchain {
    /// Built-in toolchain used when languages.json does not override it
    pub fn default_for(language: Language) -> Self {
        match language {
            Language::Cpp => Toolchain {
                source_file: "main.cpp".to_string(),
                strategy: Strategy::Compiled {
                    compile: argv(&["g++", "-O2", "-o", "{dir}/main", "{source}"]),
                    run: argv(&["{dir}/main"]),
                },
                unset_env: Vec::new(),
            },
            Language::Python => Toolchain {
                source_file: "main.py".to_string(),
                strategy: Strategy::Interpreted {
                    run: argv(&["python3", "-u", "{source}"]),
                },
                unset_env: Vec::new(),
            },
            Language::Java => Toolchain {
                source_file: "Main.java".to_string(),
                strategy: Strategy::Compiled {
                    compile: argv(&["javac", "-d", "{dir}", "{source}"]),
                    run: argv(&["java", "-cp", "{dir}", "Main"]),
                },
                unset_env: argv(&["JAVA_TOOL_OPTIONS", "_JAVA_OPTIONS"]),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    pub name: String,
    #[serde(flatten)]
    pub toolchain: Toolchain,
}

#[derive(Debug, Serialize, Deserialize)]
struct LanguagesJson {
    languages: Vec<LanguageConfig>,
}

/// Language configuration manager
///
/// Every `Language` always resolves to a toolchain: entries from
/// languages.json override the built-in defaults.
#[derive(Debug, Clone)]
pub struct LanguageConfigManager {
    toolchains: HashMap<Language, Toolchain>,
}

impl LanguageConfigManager {
    pub fn defaults() -> Self {
        let toolchains = Language::ALL
            .iter()
            .map(|&lang| (lang, Toolchain::default_for(lang)))
            .collect();
        Self { toolchains }
    }

    /// Load overrides from languages.json on top of the defaults
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Language config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .context("Failed to read languages.json")?;

        let languages_json: LanguagesJson = serde_json::from_str(&content)
            .context("Failed to parse languages.json")?;

        let mut manager = Self::defaults();
        for entry in languages_json.languages {
            let language = Language::from_str(&entry.name)
                .with_context(|| format!("Unknown language '{}' in languages.json", entry.name))?;
            validate_toolchain(&entry.name, &entry.toolchain)?;
            manager.toolchains.insert(language, entry.toolchain);
        }

        Ok(manager)
    }

    /// Load `path` if it exists, otherwise fall back to the defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::defaults())
        }
    }

    pub fn with_toolchain(mut self, language: Language, toolchain: Toolchain) -> Self {
        self.toolchains.insert(language, toolchain);
        self
    }

    pub fn toolchain(&self, language: Language) -> &Toolchain {
        // Populated for every variant in `defaults`, and entries are only ever replaced
        &self.toolchains[&language]
    }

    pub fn list_languages(&self) -> Vec<String> {
        let mut names: Vec<String> = self.toolchains.keys().map(|l| l.to_string()).collect();
        names.sort();
        names
    }
}

fn validate_toolchain(name: &str, toolchain: &Toolchain) -> Result<()> {
    if toolchain.source_file.is_empty() || toolchain.source_file.contains('/') {
        bail!("Language '{}' has an invalid source_file", name);
    }
    let commands: Vec<&Vec<String>> = match &toolchain.strategy {
        Strategy::Compiled { compile, run } => vec![compile, run],
        Strategy::Interpreted { run } => vec![run],
    };
    if commands.iter().any(|c| c.is_empty()) {
        bail!("Language '{}' has an empty command", name);
    }
    Ok(())
}

/// Executor process settings, read once from the environment
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub bind_addr: String,
    pub staging_dir: PathBuf,
    pub languages_config: PathBuf,
    pub max_concurrent_runs: usize,
    pub limits: Limits,
}

impl ExecutorSettings {
    pub fn from_env() -> Self {
        let default_staging = std::env::temp_dir().join("arbiter-staging");
        let default_parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Self {
            bind_addr: env_or("EXECUTOR_ADDR", "0.0.0.0:8000"),
            staging_dir: std::env::var("STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(default_staging),
            languages_config: PathBuf::from(env_or("LANGUAGES_CONFIG", "config/languages.json")),
            max_concurrent_runs: env_parse("MAX_CONCURRENT_RUNS", default_parallelism).max(1),
            limits: Limits {
                run_timeout: Duration::from_millis(env_parse("RUN_TIMEOUT_MS", 10_000)),
                compile_timeout: Duration::from_millis(env_parse("COMPILE_TIMEOUT_MS", 30_000)),
                max_output_bytes: env_parse("MAX_OUTPUT_BYTES", 1024 * 1024),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_cover_every_language() {
        let manager = LanguageConfigManager::defaults();
        for lang in Language::ALL {
            let toolchain = manager.toolchain(lang);
            assert!(!toolchain.source_file.is_empty());
        }
        assert_eq!(manager.list_languages(), vec!["cpp", "java", "python"]);
    }

    #[test]
    fn test_python_is_interpreted_and_java_compiled() {
        assert!(matches!(
            Toolchain::default_for(Language::Python).strategy,
            Strategy::Interpreted { .. }
        ));
        let java = Toolchain::default_for(Language::Java);
        assert_eq!(java.source_file, "Main.java");
        assert!(matches!(java.strategy, Strategy::Compiled { .. }));
        assert!(java.unset_env.contains(&"JAVA_TOOL_OPTIONS".to_string()));
    }

    #[test]
    fn test_load_overrides_from_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"languages": [{{
                "name": "py",
                "source_file": "solution.py",
                "kind": "interpreted",
                "run": ["pypy3", "{{source}}"]
            }}]}}"#
        )
        .unwrap();

        let manager = LanguageConfigManager::load(file.path()).unwrap();
        let python = manager.toolchain(Language::Python);
        assert_eq!(python.source_file, "solution.py");
        assert_eq!(
            python.strategy,
            Strategy::Interpreted {
                run: vec!["pypy3".to_string(), "{source}".to_string()]
            }
        );
        // Untouched languages keep their defaults
        assert_eq!(manager.toolchain(Language::Cpp), &Toolchain::default_for(Language::Cpp));
    }

    #[test]
    fn test_load_rejects_unknown_language() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"languages": [{{"name": "ruby", "source_file": "main.rb", "kind": "interpreted", "run": ["ruby", "{{source}}"]}}]}}"#
        )
        .unwrap();

        let err = LanguageConfigManager::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("ruby"));
    }

    #[test]
    fn test_load_rejects_empty_command() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"languages": [{{"name": "cpp", "source_file": "main.cpp", "kind": "compiled", "compile": [], "run": ["{{dir}}/main"]}}]}}"#
        )
        .unwrap();

        assert!(LanguageConfigManager::load(file.path()).is_err());
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/languages.json");
        let manager = LanguageConfigManager::load(&path).unwrap();
        for lang in Language::ALL {
            assert_eq!(manager.toolchain(lang), &Toolchain::default_for(lang));
        }
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let manager =
            LanguageConfigManager::load_or_default(Path::new("does/not/exist/languages.json"))
                .unwrap();
        assert_eq!(manager.toolchain(Language::Java), &Toolchain::default_for(Language::Java));
    }
}
