//! Task model
//!
//! A [`TaskSpec`] is the loose, deserializable form of a task: a name, a kind
//! and a mapping of kind-specific parameters. [`Task::from_spec`] turns it into
//! a [`Task`] whose [`Action`] carries typed parameters, rejecting anything
//! malformed as a configuration error before the run starts.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};

/// Kind of a task, selecting which parameters are required
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    FileContent,
    ServiceState,
    PackageInstalled,
    RepoRegistered,
    ShellCommand,
    BlockInFile,
    IniValue,
    FetchFile,
    Hostname,
}

impl TaskKind {
    /// The snake_case name used in task files
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::FileContent => "file_content",
            TaskKind::ServiceState => "service_state",
            TaskKind::PackageInstalled => "package_installed",
            TaskKind::RepoRegistered => "repo_registered",
            TaskKind::ShellCommand => "shell_command",
            TaskKind::BlockInFile => "block_in_file",
            TaskKind::IniValue => "ini_value",
            TaskKind::FetchFile => "fetch_file",
            TaskKind::Hostname => "hostname",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_true() -> bool {
    true
}

/// Untyped task specification as read from a task file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Human-readable name
    pub name: String,
    /// Which kind of state this task asserts
    pub kind: TaskKind,
    /// When false, the idempotency check is bypassed and the action always runs
    #[serde(default = "default_true")]
    pub idempotent: bool,
    /// Kind-specific parameters
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

/// A cluster host entry rendered into `/etc/hosts`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostEntry {
    pub ip: String,
    pub shortname: String,
    pub fqdn: String,
}

impl HostEntry {
    pub fn new(ip: &str, shortname: &str, fqdn: &str) -> Self {
        Self {
            ip: ip.to_string(),
            shortname: shortname.to_string(),
            fqdn: fqdn.to_string(),
        }
    }

    /// Render as an `ip<TAB>shortname<TAB>fqdn` line
    pub fn render(&self) -> String {
        format!("{}\t{}\t{}", self.ip, self.shortname, self.fqdn)
    }
}

/// Where desired file content comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// Literal content
    Inline(String),
    /// A file on the controller, read when the task runs
    Local(PathBuf),
}

/// Desired content, mode and ownership of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub path: PathBuf,
    pub source: FileSource,
    /// Permission bits, e.g. `0o644`
    pub mode: Option<u32>,
    pub owner: Option<String>,
    pub group: Option<String>,
    /// When false, an existing file is left alone whatever its content
    pub force: bool,
}

impl FileContent {
    pub fn inline(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source: FileSource::Inline(content.into()),
            mode: None,
            owner: None,
            group: None,
            force: true,
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_owner(mut self, owner: &str, group: &str) -> Self {
        self.owner = Some(owner.to_string());
        self.group = Some(group.to_string());
        self
    }
}

/// Desired state of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceDesired {
    Started,
    Stopped,
    /// An action rather than a state: never already satisfied
    Restarted,
}

impl ServiceDesired {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceDesired::Started => "started",
            ServiceDesired::Stopped => "stopped",
            ServiceDesired::Restarted => "restarted",
        }
    }

    /// Verb passed to the service manager
    pub fn verb(&self) -> &'static str {
        match self {
            ServiceDesired::Started => "start",
            ServiceDesired::Stopped => "stop",
            ServiceDesired::Restarted => "restart",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceTask {
    pub service: String,
    pub state: ServiceDesired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageTask {
    pub package: String,
    /// Exact version to require; any installed version satisfies when absent
    #[serde(default)]
    pub version: Option<String>,
    /// Refresh the package index before installing
    #[serde(default)]
    pub update_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepoTask {
    /// Repository definition line, e.g. `deb http://... trusty main`
    pub repo: String,
    /// Registration store the line must appear in
    pub file: PathBuf,
    /// Refresh the package index after registering
    #[serde(default)]
    pub update_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShellTask {
    pub argv: Vec<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Marker path whose existence means the command already ran
    #[serde(default)]
    pub creates: Option<PathBuf>,
}

/// Body of a marked block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockContent {
    Entries(Vec<HostEntry>),
    Lines(Vec<String>),
}

impl BlockContent {
    /// Rendered body lines, in caller order
    pub fn lines(&self) -> Vec<String> {
        match self {
            BlockContent::Entries(entries) => entries.iter().map(HostEntry::render).collect(),
            BlockContent::Lines(lines) => lines.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            BlockContent::Entries(entries) => entries.is_empty(),
            BlockContent::Lines(lines) => lines.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTask {
    pub path: PathBuf,
    pub marker: String,
    pub content: BlockContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IniTask {
    pub path: PathBuf,
    pub section: String,
    pub option: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchTask {
    /// File on the target
    pub src: PathBuf,
    /// Destination on the controller, not rebased onto the target root
    pub dest: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostnameTask {
    pub hostname: String,
}

/// Typed action of a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    FileContent(FileContent),
    ServiceState(ServiceTask),
    PackageInstalled(PackageTask),
    RepoRegistered(RepoTask),
    ShellCommand(ShellTask),
    BlockInFile(BlockTask),
    IniValue(IniTask),
    FetchFile(FetchTask),
    Hostname(HostnameTask),
}

impl Action {
    pub fn kind(&self) -> TaskKind {
        match self {
            Action::FileContent(_) => TaskKind::FileContent,
            Action::ServiceState(_) => TaskKind::ServiceState,
            Action::PackageInstalled(_) => TaskKind::PackageInstalled,
            Action::RepoRegistered(_) => TaskKind::RepoRegistered,
            Action::ShellCommand(_) => TaskKind::ShellCommand,
            Action::BlockInFile(_) => TaskKind::BlockInFile,
            Action::IniValue(_) => TaskKind::IniValue,
            Action::FetchFile(_) => TaskKind::FetchFile,
            Action::Hostname(_) => TaskKind::Hostname,
        }
    }

    /// One-line summary of the target of this action
    pub fn target(&self) -> String {
        match self {
            Action::FileContent(f) => f.path.display().to_string(),
            Action::ServiceState(s) => format!("{} ({})", s.service, s.state.as_str()),
            Action::PackageInstalled(p) => match &p.version {
                Some(v) => format!("{}={}", p.package, v),
                None => p.package.clone(),
            },
            Action::RepoRegistered(r) => r.file.display().to_string(),
            Action::ShellCommand(s) => crate::runner::render(&s.argv),
            Action::BlockInFile(b) => format!("{} [{}]", b.path.display(), b.marker),
            Action::IniValue(i) => format!("{} [{}] {}", i.path.display(), i.section, i.option),
            Action::FetchFile(f) => format!("{} -> {}", f.src.display(), f.dest.display()),
            Action::Hostname(h) => h.hostname.clone(),
        }
    }
}

/// A validated task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub name: String,
    pub idempotent: bool,
    pub action: Action,
}

impl Task {
    pub fn new(name: impl Into<String>, action: Action) -> Self {
        Self {
            name: name.into(),
            idempotent: true,
            action,
        }
    }

    /// Always run the action, skipping the idempotency check
    pub fn always(mut self) -> Self {
        self.idempotent = false;
        self
    }

    pub fn kind(&self) -> TaskKind {
        self.action.kind()
    }

    /// Build and validate a task from its untyped specification
    pub fn from_spec(spec: &TaskSpec) -> Result<Self> {
        let name = spec.name.as_str();
        let action = match spec.kind {
            TaskKind::FileContent => {
                let raw: FileContentParams = params(name, &spec.params)?;
                let source = match (raw.content, raw.src) {
                    (Some(content), None) => FileSource::Inline(content),
                    (None, Some(src)) => FileSource::Local(src),
                    (None, None) => {
                        return Err(Error::config(name, "one of `content` or `src` is required"));
                    }
                    (Some(_), Some(_)) => {
                        return Err(Error::config(name, "`content` and `src` are exclusive"));
                    }
                };
                Action::FileContent(FileContent {
                    path: raw.path,
                    source,
                    mode: raw.mode,
                    owner: raw.owner,
                    group: raw.group,
                    force: raw.force,
                })
            }
            TaskKind::ServiceState => Action::ServiceState(params(name, &spec.params)?),
            TaskKind::PackageInstalled => Action::PackageInstalled(params(name, &spec.params)?),
            TaskKind::RepoRegistered => Action::RepoRegistered(params(name, &spec.params)?),
            TaskKind::ShellCommand => Action::ShellCommand(params(name, &spec.params)?),
            TaskKind::BlockInFile => {
                let raw: BlockParams = params(name, &spec.params)?;
                let content = match (raw.entries, raw.lines) {
                    (Some(entries), None) => BlockContent::Entries(entries),
                    (None, Some(lines)) => BlockContent::Lines(lines),
                    (None, None) => {
                        return Err(Error::config(name, "one of `entries` or `lines` is required"));
                    }
                    (Some(_), Some(_)) => {
                        return Err(Error::config(name, "`entries` and `lines` are exclusive"));
                    }
                };
                Action::BlockInFile(BlockTask {
                    path: raw.path,
                    marker: raw.marker,
                    content,
                })
            }
            TaskKind::IniValue => Action::IniValue(params(name, &spec.params)?),
            TaskKind::FetchFile => Action::FetchFile(params(name, &spec.params)?),
            TaskKind::Hostname => Action::Hostname(params(name, &spec.params)?),
        };

        let task = Task {
            name: spec.name.clone(),
            idempotent: spec.idempotent,
            action,
        };
        task.validate()?;
        Ok(task)
    }

    /// Check the invariants that typing alone cannot express
    pub fn validate(&self) -> Result<()> {
        let name = self.name.as_str();
        if name.trim().is_empty() {
            return Err(Error::config(name, "task name must not be empty"));
        }

        match &self.action {
            Action::FileContent(f) => {
                require_absolute(name, "path", &f.path)?;
                if let Some(mode) = f.mode
                    && mode > 0o7777
                {
                    return Err(Error::config(name, format!("mode {mode:o} is out of range")));
                }
            }
            Action::ServiceState(s) => require_word(name, "service", &s.service)?,
            Action::PackageInstalled(p) => {
                require_word(name, "package", &p.package)?;
                if let Some(v) = &p.version {
                    require_word(name, "version", v)?;
                }
            }
            Action::RepoRegistered(r) => {
                require_absolute(name, "file", &r.file)?;
                require_line(name, "repo", &r.repo)?;
            }
            Action::ShellCommand(s) => {
                match s.argv.first() {
                    Some(program) if !program.is_empty() => {}
                    _ => return Err(Error::config(name, "`argv` must name a program")),
                }
                if let Some(cwd) = &s.cwd {
                    require_absolute(name, "cwd", cwd)?;
                }
                if let Some(creates) = &s.creates {
                    require_absolute(name, "creates", creates)?;
                }
            }
            Action::BlockInFile(b) => {
                require_absolute(name, "path", &b.path)?;
                require_line(name, "marker", &b.marker)?;
                match &b.content {
                    BlockContent::Entries(entries) => {
                        for entry in entries {
                            require_word(name, "ip", &entry.ip)?;
                            require_word(name, "shortname", &entry.shortname)?;
                            require_word(name, "fqdn", &entry.fqdn)?;
                        }
                    }
                    BlockContent::Lines(lines) => {
                        for line in lines {
                            if line.contains('\n') {
                                return Err(Error::config(
                                    name,
                                    "block lines must not contain newlines",
                                ));
                            }
                        }
                    }
                }
            }
            Action::IniValue(i) => {
                require_absolute(name, "path", &i.path)?;
                require_line(name, "section", &i.section)?;
                require_line(name, "option", &i.option)?;
                if i.value.contains('\n') {
                    return Err(Error::config(name, "`value` must be a single line"));
                }
            }
            Action::FetchFile(f) => {
                require_absolute(name, "src", &f.src)?;
                if f.dest.as_os_str().is_empty() {
                    return Err(Error::config(name, "`dest` must not be empty"));
                }
            }
            Action::Hostname(h) => {
                let valid = !h.hostname.is_empty()
                    && h.hostname.len() <= 253
                    && h
                        .hostname
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
                    && !h.hostname.starts_with('-');
                if !valid {
                    return Err(Error::config(
                        name,
                        format!("'{}' is not a valid hostname", h.hostname),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Validate every specification, failing on the first malformed one
pub fn validate_all(specs: &[TaskSpec]) -> Result<Vec<Task>> {
    specs.iter().map(Task::from_spec).collect()
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FileContentParams {
    path: PathBuf,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    src: Option<PathBuf>,
    #[serde(default, deserialize_with = "deserialize_mode")]
    mode: Option<u32>,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    group: Option<String>,
    #[serde(default = "default_true")]
    force: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BlockParams {
    path: PathBuf,
    marker: String,
    #[serde(default)]
    entries: Option<Vec<HostEntry>>,
    #[serde(default)]
    lines: Option<Vec<String>>,
}

fn params<T: DeserializeOwned>(task: &str, params: &Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(params.clone()))
        .map_err(|e| Error::config(task, e.to_string()))
}

/// Modes are octal strings ("0644", "644") to avoid decimal/octal confusion
fn deserialize_mode<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map(|s| parse_mode(&s).map_err(serde::de::Error::custom))
        .transpose()
}

/// Parse an octal mode string such as `"0644"`
pub fn parse_mode(s: &str) -> std::result::Result<u32, String> {
    let trimmed = s.trim();
    let digits = trimmed.strip_prefix("0o").unwrap_or(trimmed);
    if digits.is_empty() || digits.len() > 5 {
        return Err(format!("invalid mode '{s}'"));
    }
    u32::from_str_radix(digits, 8).map_err(|_| format!("invalid octal mode '{s}'"))
}

fn require_absolute(task: &str, field: &str, path: &Path) -> Result<()> {
    if !path.is_absolute() {
        return Err(Error::config(
            task,
            format!("`{field}` must be an absolute path, got '{}'", path.display()),
        ));
    }
    Ok(())
}

fn require_line(task: &str, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() || value.contains('\n') {
        return Err(Error::config(
            task,
            format!("`{field}` must be a non-empty single line"),
        ));
    }
    Ok(())
}

fn require_word(task: &str, field: &str, value: &str) -> Result<()> {
    if value.is_empty() || value.contains(char::is_whitespace) {
        return Err(Error::config(
            task,
            format!("`{field}` must be non-empty without whitespace, got '{value}'"),
        ));
    }
    Ok(())
}
