use std::io::{self, BufRead, Write};

/// Asks a yes/no question until the answer parses. End of input is an
/// error rather than an implicit "no".
pub fn confirm<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
) -> io::Result<bool> {
    loop {
        write!(output, "{question} [y/n]: ")?;
        output.flush()?;
        match read_answer(input)?.as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => writeln!(output, "Please answer yes or no.")?,
        }
    }
}

/// Asks the user to pick one of `choices` (case-insensitive) and returns the
/// chosen entry as written in `choices`.
pub fn choose<'a, R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
    choices: &[&'a str],
) -> io::Result<&'a str> {
    if choices.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "no choices provided",
        ));
    }
    loop {
        write!(output, "{question} ({}): ", choices.join("/"))?;
        output.flush()?;
        let answer = read_answer(input)?;
        if let Some(choice) = choices
            .iter()
            .copied()
            .find(|c| c.eq_ignore_ascii_case(&answer))
        {
            return Ok(choice);
        }
        writeln!(output, "Please choose one of: {}", choices.join(", "))?;
    }
}

/// Reads one free-form line, trimmed. Empty input is allowed.
pub fn ask_line<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
) -> io::Result<String> {
    write!(output, "{question}")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn read_answer<R: BufRead>(input: &mut R) -> io::Result<String> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "no answer on stdin",
        ));
    }
    Ok(line.trim().to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::{ask_line, choose, confirm};
    use std::io::Cursor;

    #[test]
    fn confirm_reprompts_until_answer_parses() {
        let mut input = Cursor::new("maybe\nYES\n");
        let mut output = Vec::new();
        assert!(confirm(&mut input, &mut output, "Release thought #3?").unwrap());

        let rendered = String::from_utf8(output).unwrap();
        assert_eq!(rendered.matches("Release thought #3? [y/n]: ").count(), 2);
        assert!(rendered.contains("Please answer yes or no."));

        let mut input = Cursor::new(" n \n");
        assert!(!confirm(&mut input, &mut Vec::new(), "ok?").unwrap());
    }

    #[test]
    fn confirm_fails_on_closed_input() {
        let mut input = Cursor::new("");
        let err = confirm(&mut input, &mut Vec::new(), "ok?").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn choose_matches_case_insensitively() {
        let choices = ["rest", "evolve", "release", "archive"];
        let mut input = Cursor::new("compost\nEvolve\n");
        let mut output = Vec::new();
        let picked = choose(&mut input, &mut output, "What next?", &choices).unwrap();
        assert_eq!(picked, "evolve");

        let rendered = String::from_utf8(output).unwrap();
        assert!(rendered.starts_with("What next? (rest/evolve/release/archive): "));
        assert!(rendered.contains("Please choose one of: rest, evolve, release, archive"));

        assert!(choose(&mut Cursor::new("x\n"), &mut Vec::new(), "q", &[]).is_err());
    }

    #[test]
    fn ask_line_trims_and_allows_empty() {
        let mut output = Vec::new();
        let line = ask_line(&mut Cursor::new("  hold this  \n"), &mut output, "> ").unwrap();
        assert_eq!(line, "hold this");
        assert_eq!(output, b"> ");
        assert_eq!(ask_line(&mut Cursor::new(""), &mut Vec::new(), "> ").unwrap(), "");
    }
}
