use clap::{Args, Subcommand, ValueEnum};

use crate::domain::state::ThoughtState;

pub const DEFAULT_PAGE_SIZE: i64 = 10;

#[derive(Debug, Clone, Args)]
pub struct PageArgs {
    #[arg(
        short = 'l',
        long,
        default_value_t = DEFAULT_PAGE_SIZE,
        help = "Rows per page."
    )]
    pub limit: i64,

    #[arg(short = 'p', long, default_value_t = 1, help = "Page number, starting at 1.")]
    pub page: i64,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

impl PageArgs {
    /// Row offset for the requested page. Non-positive pages are rejected by
    /// the caller before this is used.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

/// Resolutions offered after tending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResolveChoice {
    Rest,
    Evolve,
    Release,
    Archive,
}

impl ResolveChoice {
    pub const ALL: [ResolveChoice; 4] = [
        ResolveChoice::Rest,
        ResolveChoice::Evolve,
        ResolveChoice::Release,
        ResolveChoice::Archive,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResolveChoice::Rest => "rest",
            ResolveChoice::Evolve => "evolve",
            ResolveChoice::Release => "release",
            ResolveChoice::Archive => "archive",
        }
    }

    pub fn target_state(self) -> ThoughtState {
        match self {
            ResolveChoice::Rest => ThoughtState::Resting,
            ResolveChoice::Evolve => ThoughtState::Evolved,
            ResolveChoice::Release => ThoughtState::Released,
            ResolveChoice::Archive => ThoughtState::Archived,
        }
    }

    pub fn from_answer(answer: &str) -> Option<ResolveChoice> {
        Self::ALL
            .into_iter()
            .find(|choice| choice.as_str().eq_ignore_ascii_case(answer.trim()))
    }
}

#[derive(Debug, Args)]
#[command(about = "View and edit defaults.")]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: Option<ConfigSubcommands>,
}

#[derive(Debug, Subcommand)]
pub enum ConfigSubcommands {
    #[command(about = "Print the config file path and current settings.")]
    Show,
    #[command(about = "Set how long new and resting thoughts settle, e.g. 18h or 2h30m.")]
    SetSettle(SetSettleArgs),
    #[command(about = "Set the editor used by `tend --edit`.")]
    SetEditor(SetEditorArgs),
    #[command(about = "List editors found on PATH.")]
    Editors,
}

#[derive(Debug, Args)]
pub struct SetSettleArgs {
    #[arg(help = "Duration built from h, m, s and ms components.")]
    pub duration: String,
}

#[derive(Debug, Args)]
pub struct SetEditorArgs {
    #[arg(help = "Editor command, optionally with arguments (quote it).")]
    pub editor: String,
}
