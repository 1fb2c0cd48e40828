use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashSet};
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::ConntopError;

const PROJECT_FILE_NAME: &str = ".conntoprc";
const MAX_ALIAS_DEPTH: usize = 10;

/// Defaults and aliases read from `.conntoprc` style files
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub defaults: Option<String>,
    pub aliases: BTreeMap<String, String>,
    /// Files this configuration was read from, lowest precedence first.
    pub sources: Vec<PathBuf>,
}

impl ConfigFile {
    /// Walk up from the working directory looking for `.conntoprc`
    pub fn find_project_config() -> Option<PathBuf> {
        let start = env::current_dir().ok()?;
        start
            .ancestors()
            .map(|dir| dir.join(PROJECT_FILE_NAME))
            .find(|candidate| candidate.is_file())
    }

    /// User-level locations, most preferred first
    pub fn user_config_paths() -> Vec<PathBuf> {
        let home = env::var_os("HOME").map(PathBuf::from);
        let xdg = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| home.as_ref().map(|h| h.join(".config")));

        let mut paths = Vec::new();
        if let Some(xdg) = xdg {
            paths.push(xdg.join("conntop").join("config.ini"));
        }
        if let Some(home) = home {
            paths.push(home.join(PROJECT_FILE_NAME));
        }
        paths
    }

    /// First existing user file, then the project file on top of it.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_path) = Self::user_config_paths().into_iter().find(|p| p.is_file()) {
            config = config.overlay(Self::load_from_path(&user_path)?);
        }
        if let Some(project_path) = Self::find_project_config() {
            config = config.overlay(Self::load_from_path(&project_path)?);
        }

        Ok(config)
    }

    /// `--config-file` replaces the search entirely.
    pub fn load_with_custom_path(custom_path: Option<&str>) -> Result<Self> {
        match custom_path {
            Some(path) => Self::load_from_path(Path::new(path)),
            None => Self::load(),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        config.sources.push(path.to_path_buf());
        Ok(config)
    }

    /// Parse INI-like content: a root `defaults = ...` key and an `[aliases]` section.
    pub fn parse(content: &str) -> Result<Self, ConntopError> {
        let mut config = Self::default();
        let mut section: Option<String> = None;

        for (index, raw_line) in content.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = Some(name.trim().to_string());
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(ConntopError::config(format!(
                    "line {}: expected 'key = value', got '{}'",
                    index + 1,
                    line
                )));
            };
            let (key, value) = (key.trim(), value.trim());

            match section.as_deref() {
                None if key == "defaults" => config.defaults = Some(value.to_string()),
                Some("aliases") => {
                    config.aliases.insert(key.to_string(), value.to_string());
                }
                // unknown keys and sections are tolerated
                _ => {}
            }
        }

        Ok(config)
    }

    /// Layer `other` over `self`; `other` wins on conflicts.
    fn overlay(mut self, other: Self) -> Self {
        if other.defaults.is_some() {
            self.defaults = other.defaults;
        }
        self.aliases.extend(other.aliases);
        self.sources.extend(other.sources);
        self
    }

    /// Expand one alias into arguments, following nested `-a NAME` references.
    pub fn resolve_alias(&self, name: &str) -> Result<Vec<String>, ConntopError> {
        let mut chain = HashSet::new();
        self.expand_alias(name, &mut chain, 0)
    }

    fn expand_alias(
        &self,
        name: &str,
        chain: &mut HashSet<String>,
        depth: usize,
    ) -> Result<Vec<String>, ConntopError> {
        if depth > MAX_ALIAS_DEPTH {
            return Err(ConntopError::config(format!(
                "alias '{}' nests more than {} levels",
                name, MAX_ALIAS_DEPTH
            )));
        }
        if !chain.insert(name.to_string()) {
            return Err(ConntopError::config(format!(
                "alias '{}' refers to itself",
                name
            )));
        }

        let body = self
            .aliases
            .get(name)
            .ok_or_else(|| ConntopError::config(format!("unknown alias '{}'", name)))?;
        let words = shell_words::split(body).map_err(|e| {
            ConntopError::config(format!("alias '{}' is not valid shell syntax: {}", name, e))
        })?;

        let mut expanded = Vec::with_capacity(words.len());
        let mut words = words.into_iter();
        while let Some(word) = words.next() {
            match alias_flag_target(&word, &mut words) {
                Some(target) => expanded.extend(self.expand_alias(&target, chain, depth + 1)?),
                None => expanded.push(word),
            }
        }

        chain.remove(name);
        Ok(expanded)
    }

    /// Prepend `defaults` after the program name, then expand every alias.
    pub fn process_args(&self, args: Vec<String>) -> Result<Vec<String>, ConntopError> {
        let mut args = args.into_iter();
        let mut combined: Vec<String> = args.next().into_iter().collect();

        if let Some(defaults) = &self.defaults {
            let words = shell_words::split(defaults).map_err(|e| {
                ConntopError::config(format!("defaults are not valid shell syntax: {}", e))
            })?;
            combined.extend(words);
        }
        combined.extend(args);

        let mut expanded = Vec::with_capacity(combined.len());
        let mut words = combined.into_iter();
        while let Some(word) = words.next() {
            match alias_flag_target(&word, &mut words) {
                Some(target) => expanded.extend(self.resolve_alias(&target)?),
                None => expanded.push(word),
            }
        }
        Ok(expanded)
    }

    /// Describe where configuration is looked for and what is active.
    pub fn show_config<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        writeln!(
            out,
            "Configuration precedence: command line > project {} > user config\n",
            PROJECT_FILE_NAME
        )?;

        if self.sources.is_empty() {
            writeln!(out, "No configuration files loaded.")?;
        } else {
            writeln!(out, "Configuration loaded from:")?;
            for source in &self.sources {
                writeln!(out, "  {}", source.display())?;
            }
        }

        if let Some(defaults) = &self.defaults {
            writeln!(out, "\nActive defaults:\n  defaults = {}", defaults)?;
        }
        if !self.aliases.is_empty() {
            writeln!(out, "\nActive aliases:")?;
            for (name, body) in &self.aliases {
                writeln!(out, "  {} = {}", name, body)?;
            }
        }

        writeln!(out, "\nSearch locations:")?;
        match Self::find_project_config() {
            Some(path) => writeln!(out, "  project: {} (found)", path.display())?,
            None => writeln!(
                out,
                "  project: {} (searched up from the working directory, not found)",
                PROJECT_FILE_NAME
            )?,
        }
        for path in Self::user_config_paths() {
            let status = if path.is_file() { "found" } else { "not found" };
            writeln!(out, "  user: {} ({})", path.display(), status)?;
        }

        if self.sources.is_empty() {
            writeln!(out, "\nExample {}:\n", PROJECT_FILE_NAME)?;
            writeln!(out, "defaults = --top 20 --parsers 8")?;
            writeln!(out, "\n[aliases]")?;
            writeln!(out, "campus = --match 128.252.")?;
            writeln!(out, "lab = -a campus --match 10.20.0.0/16 --show-totals")?;
        }
        Ok(())
    }
}

/// If `word` is `-a`/`--alias` (or `--alias=NAME`), return the alias name.
fn alias_flag_target(word: &str, rest: &mut impl Iterator<Item = String>) -> Option<String> {
    if let Some(name) = word.strip_prefix("--alias=") {
        return Some(name.to_string());
    }
    if word == "-a" || word == "--alias" {
        return rest.next();
    }
    None
}
