use std::error::Error;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

pub const CONTENT_HEADER: &str = "--- content ---";
pub const NOTE_HEADER: &str = "--- note ---";

const TEMPLATE_PREAMBLE: &str = "\
// Peony tend: edit freely.
// The thought goes under the content header; the note is optional.
// Remove the note header and everything counts as the thought.
";

const FALLBACK_EDITORS: [&str; 3] = ["nano", "vim", "vi"];
const WAIT_FLAG_EDITORS: [&str; 4] = ["code", "code-insiders", "codium", "vscodium"];
const KNOWN_EDITORS: [&str; 14] = [
    "code",
    "code-insiders",
    "codium",
    "vscodium",
    "subl",
    "nvim",
    "vim",
    "vi",
    "nano",
    "emacs",
    "micro",
    "hx",
    "kate",
    "gedit",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edited {
    pub content: String,
    pub note: Option<String>,
}

#[derive(Debug)]
pub enum EditorError {
    NotFound(String),
    NoEditor,
    Io(io::Error),
    Failed { editor: String, status: ExitStatus },
    EmptyContent,
}

impl fmt::Display for EditorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditorError::NotFound(editor) => write!(f, "editor '{}' not found on PATH", editor),
            EditorError::NoEditor => write!(
                f,
                "no editor found in $VISUAL/$EDITOR and no fallback (nano/vim/vi) is available"
            ),
            EditorError::Io(err) => write!(f, "editor I/O error: {}", err),
            EditorError::Failed { editor, status } => {
                write!(f, "editor '{}' exited with {}", editor, status)
            }
            EditorError::EmptyContent => write!(f, "edited content is empty"),
        }
    }
}

impl Error for EditorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EditorError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for EditorError {
    fn from(value: io::Error) -> Self {
        EditorError::Io(value)
    }
}

pub fn render_template(content: &str, note: &str) -> String {
    format!("{TEMPLATE_PREAMBLE}\n{CONTENT_HEADER}\n{content}\n{NOTE_HEADER}\n{note}")
}

/// Splits an edited template back into content and note.
///
/// `//` lines are dropped. Text after the content header (and before the
/// note header, when it follows) is the content; text after the note header
/// is the note. Without headers the whole buffer is the content.
pub fn parse_template(text: &str) -> Result<Edited, EditorError> {
    let lines: Vec<&str> = text
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim_start().starts_with("//"))
        .collect();

    let content_at = lines.iter().position(|line| *line == CONTENT_HEADER);
    let note_at = lines.iter().position(|line| *line == NOTE_HEADER);

    let (content, note) = match (content_at, note_at) {
        (Some(c), Some(n)) if c < n => (&lines[c + 1..n], &lines[n + 1..]),
        (Some(c), _) => (&lines[c + 1..], &lines[..0]),
        (None, Some(n)) => (&lines[..n], &lines[n + 1..]),
        (None, None) => (&lines[..], &lines[..0]),
    };

    let content = content.join("\n").trim().to_string();
    if content.is_empty() {
        return Err(EditorError::EmptyContent);
    }
    let note = Some(note.join("\n").trim().to_string()).filter(|n| !n.is_empty());
    Ok(Edited { content, note })
}

/// Opens `content` in an editor and returns what the user saved.
///
/// A configured editor must exist; otherwise `$VISUAL`, `$EDITOR` and the
/// fallbacks are tried in order.
pub fn edit(configured: Option<&str>, content: &str) -> Result<Edited, EditorError> {
    let template = tempfile::Builder::new()
        .prefix("peony-tend-")
        .suffix(".txt")
        .tempfile()?;
    std::fs::write(template.path(), render_template(content, ""))?;
    run_editor(configured, template.path())?;
    let text = std::fs::read_to_string(template.path())?;
    template.close()?;
    parse_template(&text)
}

fn run_editor(configured: Option<&str>, path: &Path) -> Result<(), EditorError> {
    let (editor, mut command) = match configured {
        Some(editor) => (editor.to_string(), editor_command(editor, path)?),
        None => candidate_editors()
            .into_iter()
            .find_map(|editor| {
                editor_command(&editor, path)
                    .ok()
                    .map(|command| (editor, command))
            })
            .ok_or(EditorError::NoEditor)?,
    };
    tracing::debug!(editor = %editor, path = %path.display(), "launching editor");

    let status = command.status()?;
    if status.success() {
        Ok(())
    } else {
        Err(EditorError::Failed { editor, status })
    }
}

fn candidate_editors() -> Vec<String> {
    ["VISUAL", "EDITOR"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .chain(FALLBACK_EDITORS.iter().map(|e| e.to_string()))
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect()
}

/// Builds the command for an editor setting such as `code` or `emacs -nw`.
/// VS Code style editors get `--wait` so the call blocks until the file is
/// closed.
pub fn editor_command(editor: &str, path: &Path) -> Result<Command, EditorError> {
    let mut argv = editor.split_whitespace();
    let program = argv
        .next()
        .ok_or_else(|| EditorError::NotFound(editor.to_string()))?;
    let binary = find_on_path(program).ok_or_else(|| EditorError::NotFound(program.to_string()))?;

    let mut args: Vec<String> = argv.map(str::to_string).collect();
    let base = binary
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(program);
    if WAIT_FLAG_EDITORS.contains(&base) && !args.iter().any(|a| a == "--wait") {
        args.push("--wait".to_string());
    }

    let mut command = Command::new(&binary);
    command.args(&args).arg(path);
    Ok(command)
}

/// Editors from `$VISUAL`, `$EDITOR` and a list of common ones that are
/// installed, without duplicates.
pub fn available_editors() -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let candidates = ["VISUAL", "EDITOR"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .chain(KNOWN_EDITORS.iter().map(|e| e.to_string()));
    for candidate in candidates {
        let candidate = candidate.trim().to_string();
        let Some(program) = candidate.split_whitespace().next() else {
            continue;
        };
        if found.contains(&candidate) || find_on_path(program).is_none() {
            continue;
        }
        found.push(candidate);
    }
    found
}

/// Resolves `program` to an executable, either a path or a name on `PATH`.
pub fn find_on_path(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}
