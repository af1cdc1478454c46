use std::error::Error;
use std::fmt;
use std::io::{self, BufRead, IsTerminal};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::cli::{
    AddArgs, AnnotateArgs, ConfigArgs, ConfigSubcommands, EvolveArgs, PageArgs, ReleaseArgs,
    ResolveChoice, TendArgs, ViewArgs,
};
use crate::config::{self, Config, ConfigError, DEFAULT_SETTLE_DURATION};
use crate::domain::state::{ParseThoughtStateError, ThoughtState};
use crate::domain::thought::{Event, Thought};
use crate::editor::{self, EditorError};
use crate::prompt;
use crate::store::{Store, StoreError};
use crate::ui;

const RESOLVE_LATER: &str = "later";

/// Config as the thought commands see it, after falling back to defaults
/// for anything unreadable.
pub struct Settings {
    pub config: Config,
    pub settle: Duration,
}

pub fn load_settings() -> Settings {
    let config = match config::config_path().and_then(|path| config::load_from(&path)) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(error = %err, "ignoring unreadable config");
            Config::default()
        }
    };
    let settle = config.settle_duration().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "using default settle duration");
        DEFAULT_SETTLE_DURATION
    });
    tracing::debug!(settle = %config::format_duration(settle), "settings loaded");
    Settings { config, settle }
}

/// Prints the tend-ready notice to stderr when the count is positive and
/// differs from the last one recorded. Failures only get logged.
pub fn maybe_print_tend_notice(store: &mut Store) {
    match tend_notice(store) {
        Ok(Some(line)) => eprintln!("{line}"),
        Ok(None) => {}
        Err(err) => tracing::debug!(error = %err, "skipping tend notice"),
    }
}

fn tend_notice(store: &mut Store) -> Result<Option<String>, StoreError> {
    let ready = store.count_tend_eligible()?;
    if ready <= 0 {
        return Ok(None);
    }
    let changed = store.did_count_change(ready)?;
    tracing::debug!(ready, changed, "tend-ready count checked");
    Ok(changed.then(|| format!("{ready} thoughts feel ready for tending. Run: peony tend")))
}

pub fn run_add(
    store: &mut Store,
    args: &AddArgs,
    input: &mut impl BufRead,
) -> Result<(), CommandError> {
    let mut content = args.content.join(" ").trim().to_string();
    if content.is_empty() {
        content = prompt::ask_line(input, &mut io::stdout(), "What would you like to hold? ")?;
    }
    if content.is_empty() {
        return Err(CommandError::Usage("content is empty".to_string()));
    }
    let id = store.create(&content)?;
    println!("Saved as #{id}");
    Ok(())
}

#[derive(Serialize)]
struct ThoughtDetail<'a> {
    #[serde(flatten)]
    thought: &'a Thought,
    events: &'a [Event],
}

pub fn run_view(store: &mut Store, args: &ViewArgs) -> Result<(), CommandError> {
    let mut filter = args.state.as_deref().map(parse_state).transpose()?;
    if let Some(target) = args.target.as_deref() {
        if let Ok(id) = target.trim().parse::<i64>() {
            if filter.is_some() {
                return Err(CommandError::Usage(
                    "pass either a thought id or --state, not both".to_string(),
                ));
            }
            return show_thought(store, id, args.page.json);
        }
        if filter.is_some() {
            return Err(CommandError::Usage(format!(
                "unexpected argument '{target}' alongside --state"
            )));
        }
        filter = Some(parse_state(target)?);
    }

    require_page(&args.page)?;
    let thoughts = match filter {
        Some(state) => store.list_by_state(args.page.limit, args.page.offset(), state)?,
        None => store.list(args.page.limit, args.page.offset())?,
    };
    render_list(&thoughts, &args.page, "Thoughts", "No thoughts yet.")
}

fn show_thought(store: &mut Store, id: i64, json: bool) -> Result<(), CommandError> {
    let (thought, events) = store.get(id)?;
    if json {
        print_json(&ThoughtDetail {
            thought: &thought,
            events: &events,
        })
    } else {
        ui::print_thought_show(&thought, &events, store.now());
        Ok(())
    }
}

pub fn run_tend(
    store: &mut Store,
    args: &TendArgs,
    config: &Config,
    input: &mut impl BufRead,
) -> Result<(), CommandError> {
    let Some(id) = args.id else {
        require_page(&args.page)?;
        let thoughts = store.list_tend_eligible(args.page.limit, args.page.offset())?;
        return render_list(
            &thoughts,
            &args.page,
            "Ready for tending",
            "Nothing is ready for tending.",
        );
    };

    let (thought, _) = store.get(id)?;
    match thought.current_state {
        ThoughtState::Tended => {}
        state if state.awaits_tending() => {
            if !args.no_mark && !thought.is_tend_eligible(store.now()) {
                return Err(CommandError::Rejected(format!(
                    "thought #{id} is still settling; it can be tended at {}",
                    ui::short_utc(thought.eligibility_at)
                )));
            }
        }
        state => {
            return Err(CommandError::Rejected(format!(
                "thought #{id} is {state} and can no longer be tended"
            )))
        }
    }

    let (content, note) = if args.edit {
        let edited = editor::edit(config.editor(), &thought.content)?;
        (Some(edited.content), edited.note.or_else(|| args.note.clone()))
    } else {
        (args.content.clone(), args.note.clone())
    };

    if let Some(content) = content.filter(|c| c.trim() != thought.content.trim()) {
        store.update_content(id, content.trim())?;
        println!("Updated #{id}.");
    }

    if thought.current_state.awaits_tending() {
        if args.no_mark {
            if note.is_some() {
                tracing::warn!("note discarded because the thought was not marked tended");
            }
            return Ok(());
        }
        store.mark_tended(id, note.as_deref())?;
        println!("Tended #{id}.");
    } else if note.is_some() {
        tracing::warn!(id, "thought is already tended; note discarded");
    }

    let resolution = match args.resolve {
        Some(choice) => Some(choice),
        None if io::stdin().is_terminal() => ask_resolution(input)?,
        None => None,
    };
    match resolution {
        Some(choice) => {
            let next = choice.target_state();
            store.resolve(id, next, None)?;
            println!("#{id} is now {next}.");
        }
        None => println!(
            "#{id} stays tended. Resolve it with: peony tend {id} --resolve <rest|evolve|release|archive>"
        ),
    }
    Ok(())
}

fn ask_resolution(input: &mut impl BufRead) -> Result<Option<ResolveChoice>, CommandError> {
    let mut choices: Vec<&str> = ResolveChoice::ALL.iter().map(|c| c.as_str()).collect();
    choices.push(RESOLVE_LATER);
    let answer = prompt::choose(
        input,
        &mut io::stdout(),
        "What would you like to do next?",
        &choices,
    )?;
    Ok(ResolveChoice::from_answer(answer))
}

pub fn run_release(
    store: &mut Store,
    args: &ReleaseArgs,
    input: &mut impl BufRead,
) -> Result<(), CommandError> {
    store.get(args.id)?;
    if !args.yes {
        let question = format!("Release thought #{}? This will delete it.", args.id);
        if !prompt::confirm(input, &mut io::stdout(), &question)? {
            println!("Kept #{}.", args.id);
            return Ok(());
        }
    }
    let summary = store.release(args.id)?;
    println!("Released #{}.", args.id);
    if summary.moved > 0 {
        println!("Renumbered {} thought(s).", summary.moved);
    }
    Ok(())
}

pub fn run_evolve(store: &mut Store, args: &EvolveArgs) -> Result<(), CommandError> {
    match args.id {
        Some(id) => {
            store.evolve(id)?;
            println!("Evolved #{id}.");
            Ok(())
        }
        None => {
            require_page(&args.page)?;
            let thoughts =
                store.list_by_state(args.page.limit, args.page.offset(), ThoughtState::Evolved)?;
            render_list(&thoughts, &args.page, "Evolved", "No evolved thoughts yet.")
        }
    }
}

pub fn run_annotate(store: &mut Store, args: &AnnotateArgs) -> Result<(), CommandError> {
    store.set_annotations(args.id, args.valence, args.energy)?;
    println!("Annotated #{}.", args.id);
    Ok(())
}

pub fn run_reindex(store: &mut Store) -> Result<(), CommandError> {
    let summary = store.reindex()?;
    println!(
        "reindexed thoughts={} moved={}",
        summary.thoughts, summary.moved
    );
    Ok(())
}

pub fn run_config(args: &ConfigArgs) -> Result<(), CommandError> {
    let path = config::config_path()?;
    let mut config = config::load_from(&path)?;
    tracing::debug!(path = %path.display(), "config loaded");

    match &args.command {
        None | Some(ConfigSubcommands::Show) => {}
        Some(ConfigSubcommands::SetSettle(set)) => {
            let duration = config::parse_duration(&set.duration)?;
            config.set_settle_duration(duration);
            config::save_to(&path, &config)?;
        }
        Some(ConfigSubcommands::SetEditor(set)) => {
            let editor = set.editor.trim();
            let program = editor
                .split_whitespace()
                .next()
                .ok_or_else(|| CommandError::Usage("editor is empty".to_string()))?;
            if editor::find_on_path(program).is_none() {
                return Err(CommandError::Usage(format!(
                    "editor '{program}' not found on PATH"
                )));
            }
            config.editor = Some(editor.to_string());
            config::save_to(&path, &config)?;
        }
        Some(ConfigSubcommands::Editors) => {
            let editors = editor::available_editors();
            if editors.is_empty() {
                println!("No editors found on PATH.");
            }
            for (index, editor) in editors.iter().enumerate() {
                println!("[{index}] {editor}");
            }
            return Ok(());
        }
    }

    print!("{}", render_config(&path, &config));
    Ok(())
}

fn render_config(path: &Path, config: &Config) -> String {
    let editor = config.editor().unwrap_or("(unset)");
    let settle = match config.settle_duration() {
        Ok(duration) => config::format_duration(duration),
        Err(err) => format!(
            "{} ({err}; using {})",
            config.settle_duration.as_deref().unwrap_or_default(),
            config::format_duration(DEFAULT_SETTLE_DURATION)
        ),
    };
    format!(
        "Config file: {}\n\nCurrent configuration\nEditor: {editor}\nSettleDuration: {settle}\n",
        path.display()
    )
}

fn render_list(
    thoughts: &[Thought],
    page: &PageArgs,
    title: &str,
    empty_message: &str,
) -> Result<(), CommandError> {
    if page.json {
        return print_json(&thoughts);
    }
    ui::print_thought_list(title, thoughts, page.page, empty_message);
    Ok(())
}

fn require_page(page: &PageArgs) -> Result<(), CommandError> {
    if page.page < 1 {
        return Err(CommandError::Usage("page must be >= 1".to_string()));
    }
    Ok(())
}

fn parse_state(raw: &str) -> Result<ThoughtState, CommandError> {
    ThoughtState::from_str(raw).map_err(CommandError::from)
}

fn print_json(value: &impl Serialize) -> Result<(), CommandError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Debug)]
pub enum CommandError {
    Store(StoreError),
    Config(ConfigError),
    Editor(EditorError),
    ParseState(ParseThoughtStateError),
    Io(io::Error),
    Json(serde_json::Error),
    Usage(String),
    Rejected(String),
}

impl CommandError {
    /// 2 for bad input, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            CommandError::Usage(_) | CommandError::ParseState(_) => 2,
            CommandError::Store(err) if err.is_invalid_argument() => 2,
            CommandError::Config(ConfigError::InvalidDuration { .. }) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Store(err) => write!(f, "{}", err),
            CommandError::Config(err) => write!(f, "{}", err),
            CommandError::Editor(err) => write!(f, "{}", err),
            CommandError::ParseState(err) => write!(f, "{}", err),
            CommandError::Io(err) => write!(f, "I/O error: {}", err),
            CommandError::Json(err) => write!(f, "JSON error: {}", err),
            CommandError::Usage(message) | CommandError::Rejected(message) => {
                write!(f, "{}", message)
            }
        }
    }
}

impl Error for CommandError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CommandError::Store(err) => Some(err),
            CommandError::Config(err) => Some(err),
            CommandError::Editor(err) => Some(err),
            CommandError::ParseState(err) => Some(err),
            CommandError::Io(err) => Some(err),
            CommandError::Json(err) => Some(err),
            CommandError::Usage(_) | CommandError::Rejected(_) => None,
        }
    }
}

impl From<StoreError> for CommandError {
    fn from(value: StoreError) -> Self {
        CommandError::Store(value)
    }
}

impl From<ConfigError> for CommandError {
    fn from(value: ConfigError) -> Self {
        CommandError::Config(value)
    }
}

impl From<EditorError> for CommandError {
    fn from(value: EditorError) -> Self {
        CommandError::Editor(value)
    }
}

impl From<ParseThoughtStateError> for CommandError {
    fn from(value: ParseThoughtStateError) -> Self {
        CommandError::ParseState(value)
    }
}

impl From<io::Error> for CommandError {
    fn from(value: io::Error) -> Self {
        CommandError::Io(value)
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(value: serde_json::Error) -> Self {
        CommandError::Json(value)
    }
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
