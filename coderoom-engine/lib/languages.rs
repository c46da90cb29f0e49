//! Language registry for the coderoom engine.
//!
//! Supported languages form a closed enumeration, each bound to a validated,
//! immutable [`LanguageProfile`] describing how to build, run, and manage
//! packages for that language. The catalog is assembled once at startup;
//! lookups after that are pure and total — an unknown or inactive language
//! is a distinct error, never a silently-empty profile.

use std::{collections::BTreeMap, fmt, path::Path, str::FromStr};

use getset::Getters;
use serde::{Deserialize, Serialize};

use crate::{
    error::{EngineError, EngineResult},
    payload::LanguageInfo,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The closed set of languages the platform can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Python 3.
    Python,
    /// JavaScript on Node.
    JavaScript,
    /// TypeScript on Node.
    TypeScript,
    /// C compiled with gcc.
    C,
    /// C++ compiled with g++.
    Cpp,
    /// Java on a JDK.
    Java,
    /// Go.
    Go,
    /// Rust.
    Rust,
}

/// Relative resource cost of running a language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostTier {
    /// Interpreted, quick to start.
    Light,
    /// Moderate startup or toolchain weight.
    Standard,
    /// Compilation step or large runtime.
    Heavy,
}

/// Immutable run profile of one language.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct LanguageProfile {
    /// The language this profile describes.
    language: Language,

    /// Canonical lowercase name.
    name: String,

    /// Source file extension without the dot.
    extension: String,

    /// Container image backing sandboxes of this language.
    image: String,

    /// Memory limit in MB, enforced at sandbox creation.
    memory_limit_mb: u32,

    /// CPU share, enforced at sandbox creation.
    cpu_limit: f32,

    /// Execution timeout in milliseconds.
    exec_timeout_ms: u64,

    /// Maximum concurrent executions per context.
    concurrency_cap: u32,

    /// One-time setup commands run best-effort after sandbox creation.
    setup_commands: Vec<String>,

    /// Run command template; `{file}` expands to the source filename.
    run_template: String,

    /// Package install template; `{package}` expands to the package name.
    /// `None` means the language does not support package installation.
    install_template: Option<String>,

    /// Packages known to need extra build tooling and a longer install
    /// timeout.
    build_heavy_packages: Vec<String>,

    /// Relative resource cost.
    cost_tier: CostTier,

    /// Whether the language is currently offered to users.
    active: bool,
}

/// Per-language resource override loaded from the catalog file. Only known
/// languages may be overridden; the enumeration stays closed.
#[derive(Debug, Clone, Default, Deserialize)]
struct ProfileOverride {
    memory_limit_mb: Option<u32>,
    cpu_limit: Option<f32>,
    exec_timeout_ms: Option<u64>,
    concurrency_cap: Option<u32>,
    active: Option<bool>,
}

/// Validated catalog of language profiles.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    profiles: BTreeMap<Language, LanguageProfile>,
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Language {
    /// Canonical lowercase name of the language.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::Java => "java",
            Self::Go => "go",
            Self::Rust => "rust",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Language {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "python" | "python3" | "py" => Ok(Self::Python),
            "javascript" | "js" | "node" | "nodejs" => Ok(Self::JavaScript),
            "typescript" | "ts" => Ok(Self::TypeScript),
            "c" => Ok(Self::C),
            "cpp" | "c++" => Ok(Self::Cpp),
            "java" => Ok(Self::Java),
            "go" | "golang" => Ok(Self::Go),
            "rust" | "rs" => Ok(Self::Rust),
            _ => Err(EngineError::UnsupportedLanguage(s.to_string())),
        }
    }
}

impl fmt::Display for CostTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tier = match self {
            Self::Light => "light",
            Self::Standard => "standard",
            Self::Heavy => "heavy",
        };
        write!(f, "{}", tier)
    }
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LanguageProfile {
    /// Render the run command for `filename`.
    pub fn run_command(&self, filename: &str) -> String {
        self.run_template.replace("{file}", filename)
    }

    /// Render the install command for `package`, if the language supports
    /// package installation.
    pub fn install_command(&self, package: &str) -> Option<String> {
        self.install_template
            .as_ref()
            .map(|template| template.replace("{package}", package))
    }

    /// Whether `package` is known to need extra build tooling.
    pub fn is_build_heavy(&self, package: &str) -> bool {
        self.build_heavy_packages.iter().any(|p| p == package)
    }

    /// Public description of this profile.
    pub fn to_info(&self) -> LanguageInfo {
        LanguageInfo {
            name: self.name.clone(),
            extension: self.extension.clone(),
            cost_tier: self.cost_tier,
            memory_limit_mb: self.memory_limit_mb,
            cpu_limit: self.cpu_limit,
            exec_timeout_ms: self.exec_timeout_ms,
            concurrency_cap: self.concurrency_cap,
            supports_package_install: self.install_template.is_some(),
        }
    }

    fn apply_override(&mut self, patch: &ProfileOverride) {
        if let Some(memory) = patch.memory_limit_mb {
            self.memory_limit_mb = memory;
        }
        if let Some(cpus) = patch.cpu_limit {
            self.cpu_limit = cpus;
        }
        if let Some(timeout) = patch.exec_timeout_ms {
            self.exec_timeout_ms = timeout;
        }
        if let Some(cap) = patch.concurrency_cap {
            self.concurrency_cap = cap;
        }
        if let Some(active) = patch.active {
            self.active = active;
        }
    }
}

impl LanguageRegistry {
    /// The built-in catalog. Its validity is pinned by the tests below, so
    /// construction is infallible.
    pub fn builtin() -> Self {
        Self {
            profiles: builtin_profiles()
                .into_iter()
                .map(|profile| (profile.language, profile))
                .collect(),
        }
    }

    /// Build a registry from explicit profiles, rejecting duplicates and
    /// structurally invalid entries.
    pub fn from_profiles(profiles: Vec<LanguageProfile>) -> EngineResult<Self> {
        let mut map = BTreeMap::new();

        for profile in profiles {
            validate_profile(&profile)?;
            if map.insert(profile.language, profile.clone()).is_some() {
                return Err(EngineError::ConfigError(format!(
                    "duplicate language profile: {}",
                    profile.language
                )));
            }
        }

        Ok(Self { profiles: map })
    }

    /// Merge a YAML override file into the catalog. Only resource limits,
    /// caps, and the active flag of KNOWN languages may be overridden;
    /// an unknown name is a load error.
    pub fn with_overrides_file(mut self, path: &Path) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| EngineError::CatalogLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let overrides: BTreeMap<String, ProfileOverride> =
            serde_yaml::from_str(&raw).map_err(|e| EngineError::CatalogLoad {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        for (name, patch) in overrides {
            let language = Language::from_str(&name).map_err(|_| EngineError::CatalogLoad {
                path: path.to_path_buf(),
                reason: format!("unknown language '{}' in catalog override", name),
            })?;

            match self.profiles.get_mut(&language) {
                Some(profile) => profile.apply_override(&patch),
                None => {
                    return Err(EngineError::CatalogLoad {
                        path: path.to_path_buf(),
                        reason: format!("language '{}' has no base profile", name),
                    });
                }
            }
        }

        for profile in self.profiles.values() {
            validate_profile(profile)?;
        }

        tracing::info!("applied language catalog overrides from {}", path.display());
        Ok(self)
    }

    /// Look up a profile by user-supplied name, case-insensitively. Unknown
    /// and inactive languages are distinct errors from each other only in
    /// message; both surface as [`EngineError::UnsupportedLanguage`].
    pub fn lookup(&self, name: &str) -> EngineResult<&LanguageProfile> {
        let language = Language::from_str(name)?;
        self.get(language)
    }

    /// Look up a profile by the closed enum.
    pub fn get(&self, language: Language) -> EngineResult<&LanguageProfile> {
        let profile = self
            .profiles
            .get(&language)
            .ok_or_else(|| EngineError::UnsupportedLanguage(language.to_string()))?;

        if !profile.active {
            return Err(EngineError::UnsupportedLanguage(format!(
                "{} (inactive)",
                language
            )));
        }

        Ok(profile)
    }

    /// All active profiles in stable name order.
    pub fn list_active(&self) -> Vec<&LanguageProfile> {
        self.profiles.values().filter(|p| p.active).collect()
    }

    /// Active profiles in the given cost tier.
    pub fn by_cost_tier(&self, tier: CostTier) -> Vec<&LanguageProfile> {
        self.profiles
            .values()
            .filter(|p| p.active && p.cost_tier == tier)
            .collect()
    }

    /// Public catalog listing for callers.
    pub fn language_infos(&self) -> Vec<LanguageInfo> {
        self.list_active().iter().map(|p| p.to_info()).collect()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn validate_profile(profile: &LanguageProfile) -> EngineResult<()> {
    if profile.run_template.trim().is_empty() {
        return Err(EngineError::ConfigError(format!(
            "language {} has an empty run command template",
            profile.language
        )));
    }
    if !profile.run_template.contains("{file}") {
        return Err(EngineError::ConfigError(format!(
            "run command template for {} does not reference {{file}}",
            profile.language
        )));
    }
    if profile.extension.is_empty() {
        return Err(EngineError::ConfigError(format!(
            "language {} has an empty file extension",
            profile.language
        )));
    }
    if profile.memory_limit_mb == 0 {
        return Err(EngineError::ConfigError(format!(
            "language {} has a zero memory limit",
            profile.language
        )));
    }
    if profile.exec_timeout_ms == 0 {
        return Err(EngineError::ConfigError(format!(
            "language {} has a zero execution timeout",
            profile.language
        )));
    }
    if profile.concurrency_cap == 0 {
        return Err(EngineError::ConfigError(format!(
            "language {} has a zero concurrency cap",
            profile.language
        )));
    }
    if let Some(template) = &profile.install_template {
        if !template.contains("{package}") {
            return Err(EngineError::ConfigError(format!(
                "install command template for {} does not reference {{package}}",
                profile.language
            )));
        }
    }
    Ok(())
}

/// The built-in language catalog.
fn builtin_profiles() -> Vec<LanguageProfile> {
    vec![
        LanguageProfile {
            language: Language::Python,
            name: "python".to_string(),
            extension: "py".to_string(),
            image: "python:3.12-slim".to_string(),
            memory_limit_mb: 512,
            cpu_limit: 1.0,
            exec_timeout_ms: 10_000,
            concurrency_cap: 4,
            setup_commands: vec!["pip install --no-cache-dir --upgrade pip".to_string()],
            run_template: "python3 -u {file}".to_string(),
            install_template: Some("pip install --no-cache-dir {package}".to_string()),
            build_heavy_packages: vec![
                "numpy".to_string(),
                "pandas".to_string(),
                "scipy".to_string(),
                "torch".to_string(),
            ],
            cost_tier: CostTier::Light,
            active: true,
        },
        LanguageProfile {
            language: Language::JavaScript,
            name: "javascript".to_string(),
            extension: "js".to_string(),
            image: "node:20-slim".to_string(),
            memory_limit_mb: 512,
            cpu_limit: 1.0,
            exec_timeout_ms: 10_000,
            concurrency_cap: 4,
            setup_commands: vec!["npm init -y".to_string()],
            run_template: "node {file}".to_string(),
            install_template: Some("npm install --no-audit --no-fund {package}".to_string()),
            build_heavy_packages: vec!["node-gyp".to_string(), "sharp".to_string()],
            cost_tier: CostTier::Light,
            active: true,
        },
        LanguageProfile {
            language: Language::TypeScript,
            name: "typescript".to_string(),
            extension: "ts".to_string(),
            image: "node:20-slim".to_string(),
            memory_limit_mb: 512,
            cpu_limit: 1.0,
            exec_timeout_ms: 15_000,
            concurrency_cap: 4,
            setup_commands: vec![
                "npm init -y".to_string(),
                "npm install -g typescript tsx".to_string(),
            ],
            run_template: "tsx {file}".to_string(),
            install_template: Some("npm install --no-audit --no-fund {package}".to_string()),
            build_heavy_packages: vec!["node-gyp".to_string()],
            cost_tier: CostTier::Standard,
            active: true,
        },
        LanguageProfile {
            language: Language::C,
            name: "c".to_string(),
            extension: "c".to_string(),
            image: "gcc:13".to_string(),
            memory_limit_mb: 256,
            cpu_limit: 1.0,
            exec_timeout_ms: 15_000,
            concurrency_cap: 2,
            setup_commands: vec![],
            run_template: "gcc {file} -O2 -o /tmp/program && /tmp/program".to_string(),
            install_template: None,
            build_heavy_packages: vec![],
            cost_tier: CostTier::Standard,
            active: true,
        },
        LanguageProfile {
            language: Language::Cpp,
            name: "cpp".to_string(),
            extension: "cpp".to_string(),
            image: "gcc:13".to_string(),
            memory_limit_mb: 256,
            cpu_limit: 1.0,
            exec_timeout_ms: 15_000,
            concurrency_cap: 2,
            setup_commands: vec![],
            run_template: "g++ {file} -O2 -o /tmp/program && /tmp/program".to_string(),
            install_template: None,
            build_heavy_packages: vec![],
            cost_tier: CostTier::Standard,
            active: true,
        },
        LanguageProfile {
            language: Language::Java,
            name: "java".to_string(),
            extension: "java".to_string(),
            image: "eclipse-temurin:21".to_string(),
            memory_limit_mb: 768,
            cpu_limit: 1.0,
            exec_timeout_ms: 20_000,
            concurrency_cap: 2,
            setup_commands: vec![],
            run_template: "java {file}".to_string(),
            install_template: None,
            build_heavy_packages: vec![],
            cost_tier: CostTier::Heavy,
            active: true,
        },
        LanguageProfile {
            language: Language::Go,
            name: "go".to_string(),
            extension: "go".to_string(),
            image: "golang:1.22".to_string(),
            memory_limit_mb: 512,
            cpu_limit: 1.0,
            exec_timeout_ms: 20_000,
            concurrency_cap: 2,
            setup_commands: vec!["go mod init sandbox".to_string()],
            run_template: "go run {file}".to_string(),
            install_template: Some("go get {package}".to_string()),
            build_heavy_packages: vec![],
            cost_tier: CostTier::Standard,
            active: true,
        },
        LanguageProfile {
            language: Language::Rust,
            name: "rust".to_string(),
            extension: "rs".to_string(),
            image: "rust:1.75-slim".to_string(),
            memory_limit_mb: 768,
            cpu_limit: 1.0,
            exec_timeout_ms: 30_000,
            concurrency_cap: 1,
            setup_commands: vec![],
            run_template: "rustc {file} -o /tmp/program && /tmp/program".to_string(),
            install_template: None,
            build_heavy_packages: vec![],
            cost_tier: CostTier::Heavy,
            // Not yet offered to users; the toolchain image is too slow for
            // the interactive path.
            active: false,
        },
    ]
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
