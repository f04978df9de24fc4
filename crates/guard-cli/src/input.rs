/// One line typed on the monitor's stdin.
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    SetThreshold(f32),
    StepUp,
    StepDown,
    Diagnostics,
    Status,
    Quit,
    Unknown(String),
}

/// Blank lines yield `None`.
pub fn parse_command(line: &str) -> Option<UserCommand> {
    let s = line.trim();
    if s.is_empty() {
        return None;
    }
    let cmd = match s.to_ascii_lowercase().as_str() {
        "+" => UserCommand::StepUp,
        "-" => UserCommand::StepDown,
        "diag" | "d" => UserCommand::Diagnostics,
        "status" | "s" => UserCommand::Status,
        "quit" | "q" | "exit" => UserCommand::Quit,
        other => match parse_threshold(other) {
            Some(v) => UserCommand::SetThreshold(v),
            None => UserCommand::Unknown(s.to_string()),
        },
    };
    Some(cmd)
}

// "0.65" or "65%"
fn parse_threshold(s: &str) -> Option<f32> {
    match s.strip_suffix('%') {
        Some(pct) => pct.trim().parse::<f32>().ok().map(|v| v / 100.0),
        None => s.parse::<f32>().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_thresholds() {
        assert_eq!(parse_command("0.65"), Some(UserCommand::SetThreshold(0.65)));
        assert_eq!(parse_command(" 70% "), Some(UserCommand::SetThreshold(0.7)));
        // range is enforced by the threshold itself
        assert_eq!(parse_command("3"), Some(UserCommand::SetThreshold(3.0)));
    }

    #[test]
    fn parses_keywords() {
        assert_eq!(parse_command("+"), Some(UserCommand::StepUp));
        assert_eq!(parse_command("-"), Some(UserCommand::StepDown));
        assert_eq!(parse_command("DIAG"), Some(UserCommand::Diagnostics));
        assert_eq!(parse_command("status"), Some(UserCommand::Status));
        assert_eq!(parse_command("q"), Some(UserCommand::Quit));
        assert_eq!(parse_command("   "), None);
        assert_eq!(parse_command("louder"), Some(UserCommand::Unknown("louder".into())));
    }
}
