use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Args, Parser, Subcommand};

pub use crate::cli_ops::*;

fn cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::BrightYellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightGreen.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::BrightMagenta.on_default())
}

#[derive(Debug, Parser)]
#[command(name = "peony")]
#[command(bin_name = "peony")]
#[command(version)]
#[command(about = "A calm holding space for unfinished thoughts")]
#[command(styles = cli_styles())]
pub struct Cli {
    #[arg(
        short = 'd',
        long,
        global = true,
        env = "PEONY_DB_PATH",
        help = "Path to the SQLite database (defaults to <data dir>/peony/peony.db)."
    )]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(visible_alias = "a", about = "Capture a thought.")]
    Add(AddArgs),
    #[command(
        visible_alias = "v",
        about = "List thoughts, show one by id, or filter by state."
    )]
    View(ViewArgs),
    #[command(
        visible_alias = "t",
        about = "List thoughts ready for tending, or tend one by id."
    )]
    Tend(TendArgs),
    #[command(
        visible_alias = "r",
        about = "Permanently delete a thought and compact ids."
    )]
    Release(ReleaseArgs),
    #[command(
        visible_alias = "e",
        about = "Mark a thought evolved, or list evolved thoughts."
    )]
    Evolve(EvolveArgs),
    #[command(about = "Record valence and energy for a thought.")]
    Annotate(AnnotateArgs),
    #[command(visible_alias = "c", about = "View and edit defaults.")]
    Config(ConfigArgs),
    #[command(about = "Renumber thought ids into a dense 1..N run.")]
    Reindex,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    #[arg(
        trailing_var_arg = true,
        help = "Thought content. Prompts on stdin when omitted."
    )]
    pub content: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ViewArgs {
    #[arg(help = "Thought id, or a state name such as captured or archived.")]
    pub target: Option<String>,

    #[arg(short = 's', long, help = "Only show thoughts in this state.")]
    pub state: Option<String>,

    #[command(flatten)]
    pub page: PageArgs,
}

#[derive(Debug, Args)]
pub struct TendArgs {
    #[arg(help = "Thought id. Lists thoughts ready for tending when omitted.")]
    pub id: Option<i64>,

    #[arg(
        short = 'c',
        long,
        conflicts_with = "edit",
        help = "Replace the thought content."
    )]
    pub content: Option<String>,

    #[arg(short = 'n', long, help = "Note stored with the tended event.")]
    pub note: Option<String>,

    #[arg(
        short = 'e',
        long,
        help = "Edit content and note in the configured editor."
    )]
    pub edit: bool,

    #[arg(
        short = 'r',
        long,
        value_enum,
        conflicts_with = "no_mark",
        help = "Where the thought goes after tending."
    )]
    pub resolve: Option<ResolveChoice>,

    #[arg(long, help = "Save content changes without marking the thought tended.")]
    pub no_mark: bool,

    #[command(flatten)]
    pub page: PageArgs,
}

#[derive(Debug, Args)]
pub struct ReleaseArgs {
    #[arg(help = "Thought id.")]
    pub id: i64,

    #[arg(short = 'y', long, help = "Skip the confirmation prompt.")]
    pub yes: bool,
}

#[derive(Debug, Args)]
pub struct EvolveArgs {
    #[arg(help = "Thought id. Lists evolved thoughts when omitted.")]
    pub id: Option<i64>,

    #[command(flatten)]
    pub page: PageArgs,
}

#[derive(Debug, Args)]
pub struct AnnotateArgs {
    #[arg(help = "Thought id.")]
    pub id: i64,

    #[arg(long, allow_negative_numbers = true, help = "Emotional valence.")]
    pub valence: Option<i64>,

    #[arg(long, allow_negative_numbers = true, help = "Energy level.")]
    pub energy: Option<i64>,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
