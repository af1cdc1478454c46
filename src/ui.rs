use std::io::{self, IsTerminal};

use time::{Duration, OffsetDateTime, UtcOffset};

use crate::domain::state::ThoughtState;
use crate::domain::thought::{Event, Thought};

const LIST_OVERVIEW_WIDTH: usize = 80;

pub fn print_thought_list(title: &str, thoughts: &[Thought], page: i64, empty_message: &str) {
    let palette = Palette::auto();
    println!("{}", palette.heading(title));
    if thoughts.is_empty() {
        println!("{}", palette.dim(empty_message));
        return;
    }
    for line in format_thought_table(thoughts, page, &palette) {
        println!("{line}");
    }
}

fn format_thought_table(thoughts: &[Thought], page: i64, palette: &Palette) -> Vec<String> {
    let mut lines = vec![
        palette.dim(&format!("Page {page}")),
        format!(
            "{:<6} {:<10} {:<5} {:<17} {}",
            "ID", "STATE", "TEND", "UPDATED", "OVERVIEW"
        ),
    ];
    for thought in thoughts {
        let state = thought.current_state.as_str();
        let padded_state = format!("{state:<10}");
        lines.push(format!(
            "{} {} {:<5} {:<17} {}",
            palette.id(&format!("{:<6}", thought.id)),
            palette.state(thought.current_state, &padded_state),
            thought.tend_counter,
            short_utc(thought.updated_at),
            overview(&thought.content, LIST_OVERVIEW_WIDTH)
        ));
    }
    lines
}

pub fn print_thought_show(thought: &Thought, events: &[Event], now: OffsetDateTime) {
    let palette = Palette::auto();
    print!("{}", format_thought_detail(thought, events, now, &palette));
}

fn format_thought_detail(
    thought: &Thought,
    events: &[Event],
    now: OffsetDateTime,
    palette: &Palette,
) -> String {
    let mut out = format!(
        "{}  {}  (tends: {})\n",
        palette.id(&format!("#{}", thought.id)),
        palette.state(thought.current_state, thought.current_state.as_str()),
        thought.tend_counter
    );
    out.push_str(&status_line(thought, now));
    out.push('\n');

    out.push_str(&format!("\n{}\n{}\n", palette.heading("CONTENT"), thought.content));

    out.push_str(&format!("\n{}\n", palette.heading("META")));
    let stamp = |at: OffsetDateTime| format!("{} ({})", short_utc(at), relative(at, now));
    out.push_str(&format!("Created:  {}\n", stamp(thought.created_at)));
    out.push_str(&format!("Updated:  {}\n", stamp(thought.updated_at)));
    out.push_str(&format!("Eligible: {}\n", stamp(thought.eligibility_at)));
    if let Some(tended) = thought.last_tended_at {
        out.push_str(&format!("Last tended: {}\n", stamp(tended)));
    }
    if let Some(valence) = thought.valence {
        out.push_str(&format!("Valence: {valence}\n"));
    }
    if let Some(energy) = thought.energy {
        out.push_str(&format!("Energy: {energy}\n"));
    }

    if !events.is_empty() {
        out.push_str(&format!("\n{}\n", palette.heading("EVENTS")));
        for event in events {
            out.push_str(&format!(
                "- {}  {}{}\n",
                short_utc(event.at),
                event.kind,
                event_transition(event)
            ));
            if let Some(note) = event.note.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
                out.push_str(&format!("  note: {note}\n"));
            }
        }
    }
    out
}

fn status_line(thought: &Thought, now: OffsetDateTime) -> String {
    match thought.current_state {
        ThoughtState::Captured | ThoughtState::Resting => {
            if thought.is_tend_eligible(now) {
                "Eligible: yes".to_string()
            } else {
                format!(
                    "Eligible: {} (at {})",
                    relative(thought.eligibility_at, now),
                    short_utc(thought.eligibility_at)
                )
            }
        }
        ThoughtState::Tended => "Needs resolution: rest/evolve/release/archive".to_string(),
        terminal => format!("Terminal: {terminal}"),
    }
}

fn event_transition(event: &Event) -> String {
    match (event.previous_state, event.next_state) {
        (None, None) => String::new(),
        (Some(only), None) | (None, Some(only)) => format!(" {only}"),
        (Some(from), Some(to)) => format!(" {from} → {to}"),
    }
}

/// Collapses `content` onto one line and cuts it to `max` characters,
/// ending with an ellipsis when shortened.
pub fn overview(content: &str, max: usize) -> String {
    let flat = content.replace(['\n', '\r'], " ");
    let flat = flat.trim();
    if flat.chars().count() <= max {
        return flat.to_string();
    }
    let mut cut: String = flat.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// `YYYY-MM-DD HH:MMZ` in UTC.
pub fn short_utc(at: OffsetDateTime) -> String {
    let at = at.to_offset(UtcOffset::UTC);
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}Z",
        at.year(),
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute()
    )
}

/// Coarse distance from `now`: `just now`, `5m ago`, `in 3h`, `in 2d`.
pub fn relative(at: OffsetDateTime, now: OffsetDateTime) -> String {
    let delta = at - now;
    let past = delta.is_negative();
    let span = delta.abs();

    let amount = if span < Duration::MINUTE {
        return if past {
            "just now".to_string()
        } else {
            "in <1m".to_string()
        };
    } else if span < Duration::HOUR {
        format!("{}m", span.whole_minutes())
    } else if span < Duration::DAY {
        format!("{}h", span.whole_hours())
    } else {
        format!("{}d", span.whole_days())
    };

    if past {
        format!("{amount} ago")
    } else {
        format!("in {amount}")
    }
}

pub struct Palette {
    enabled: bool,
}

impl Palette {
    pub fn auto() -> Self {
        let enabled = std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal();
        Self { enabled }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    pub fn heading(&self, text: &str) -> String {
        self.paint("1;36", text)
    }

    pub fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }

    pub fn id(&self, text: &str) -> String {
        self.paint("1;94", text)
    }

    pub fn state(&self, state: ThoughtState, text: &str) -> String {
        self.paint(state_color_code(state), text)
    }
}

fn state_color_code(state: ThoughtState) -> &'static str {
    match state {
        ThoughtState::Captured => "34",
        ThoughtState::Resting => "36",
        ThoughtState::Tended => "33",
        ThoughtState::Evolved => "32",
        ThoughtState::Released => "35",
        ThoughtState::Archived => "90",
    }
}
