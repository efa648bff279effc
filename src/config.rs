//! Project manifest (`Jetsam.toml`) model.
//!
//! The manifest is read once per invocation with [`Manifest::load`] and handed
//! around by reference; nothing mutates it afterwards.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use std::fmt;
use std::fs;
use std::path::Path;

pub const MANIFEST_FILE: &str = "Jetsam.toml";

#[derive(Deserialize, Debug, Clone)]
pub struct Manifest {
    pub package: PackageConfig,
    #[serde(default)]
    pub dependencies: DependencySet,
}

#[derive(Deserialize, Debug, Clone)]
pub struct PackageConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ProjectKind,
    pub build: BuildCommand,
    pub version: String,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    Bin,
    Lib,
}

impl fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectKind::Bin => write!(f, "bin"),
            ProjectKind::Lib => write!(f, "lib"),
        }
    }
}

/// A build command as an argument vector. Never handed to a shell.
///
/// `build = "make -j4"` is split on whitespace; use the array form
/// (`build = ["make", "CC=my cc"]`) when an argument contains spaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCommand {
    program: String,
    args: Vec<String>,
}

impl BuildCommand {
    pub fn new(argv: Vec<String>) -> Option<Self> {
        let mut iter = argv.into_iter().filter(|a| !a.is_empty());
        let program = iter.next()?;
        Some(Self {
            program,
            args: iter.collect(),
        })
    }

    pub fn parse(line: &str) -> Option<Self> {
        Self::new(line.split_whitespace().map(str::to_string).collect())
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The same command with extra trailing arguments (`make` → `make test`).
    pub fn with_arg(&self, arg: &str) -> Self {
        let mut args = self.args.clone();
        args.push(arg.to_string());
        Self {
            program: self.program.clone(),
            args,
        }
    }

    pub fn to_command(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for BuildCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for BuildCommand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Line(String),
            Argv(Vec<String>),
        }

        let cmd = match Raw::deserialize(deserializer)? {
            Raw::Line(line) => BuildCommand::parse(&line),
            Raw::Argv(argv) => BuildCommand::new(argv),
        };
        cmd.ok_or_else(|| de::Error::custom("build command must not be empty"))
    }
}

/// A single `(name, version)` pin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub name: String,
    pub version_ref: String,
}

impl Dependency {
    pub fn new(name: impl Into<String>, version_ref: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version_ref: version_ref.into(),
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version_ref)
    }
}

/// Dependencies in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySet(Vec<Dependency>);

impl DependencySet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Dependency> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Dependency] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a DependencySet {
    type Item = &'a Dependency;
    type IntoIter = std::slice::Iter<'a, Dependency>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Dependency> for DependencySet {
    fn from_iter<I: IntoIterator<Item = Dependency>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// Accepts both `name = "ref"` tables and `[[dependencies]]` arrays.
impl<'de> Deserialize<'de> for DependencySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SetVisitor;

        #[derive(Deserialize)]
        struct Entry {
            name: String,
            version: String,
        }

        impl<'de> Visitor<'de> for SetVisitor {
            type Value = DependencySet;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a table of name = \"version\" pairs or an array of {name, version}")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut deps = Vec::new();
                while let Some((name, version)) = map.next_entry::<String, String>()? {
                    deps.push(Dependency::new(name, version));
                }
                Ok(DependencySet(deps))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut deps = Vec::new();
                while let Some(entry) = seq.next_element::<Entry>()? {
                    deps.push(Dependency::new(entry.name, entry.version));
                }
                Ok(DependencySet(deps))
            }
        }

        deserializer.deserialize_any(SetVisitor)
    }
}

impl Manifest {
    /// Read and validate a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!(
                "{} not found.\n\n💡 Tip: run jetsam from the project root or pass --manifest <path>.",
                path.display()
            );
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid manifest {}", path.display()))
    }

    /// Load the dependency's own manifest if it ships one.
    pub fn load_optional(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(MANIFEST_FILE);
        if path.is_file() {
            Self::load(&path).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let manifest: Manifest = toml::from_str(content).context("Failed to parse manifest")?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        if self.package.name.trim().is_empty() {
            bail!("'name' in [package] must not be empty");
        }
        if self.package.version.trim().is_empty() {
            bail!("'version' in [package] must not be empty");
        }
        for dep in &self.dependencies {
            if dep.name.trim().is_empty() {
                bail!("dependency with empty name in [dependencies]");
            }
            if dep.version_ref.trim().is_empty() {
                bail!("dependency '{}' has an empty version", dep.name);
            }
        }
        Ok(())
    }
}
