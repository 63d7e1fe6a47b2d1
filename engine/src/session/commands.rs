//! Administrative commands
//!
//! Parsing and acknowledgment texts only. Commands are applied by
//! `BotSession::execute`.

/// A parsed administrative command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    ResetHistory,
    SetMemorySize(usize),
    Debug(bool),
    SetDelay { min: u64, max: u64 },
    NightMode(bool),
    RefreshPrompt,
    Help,
}

/// Parse a channel message as a command.
///
/// Returns `None` when the text is not a known command. `Some(Err(ack))`
/// carries the rejection to post back when the arguments are invalid.
pub fn parse(text: &str, prefix: &str) -> Option<Result<AdminCommand, String>> {
    let body = text.trim().strip_prefix(prefix)?;
    let mut parts = body.split_whitespace();
    let name = parts.next()?;
    let args: Vec<&str> = parts.collect();

    let command = match name {
        "reset_history" => Ok(AdminCommand::ResetHistory),
        "set_memory_size" => match args.as_slice() {
            [size] => size
                .parse::<usize>()
                .map(AdminCommand::SetMemorySize)
                .map_err(|_| invalid_memory_size(prefix)),
            _ => Err(usage(prefix, "set_memory_size <size>")),
        },
        "debug" => match args.as_slice() {
            [value] => parse_flag(value)
                .map(AdminCommand::Debug)
                .ok_or_else(|| invalid_flag(prefix)),
            _ => Err(usage(prefix, "debug <true/false>")),
        },
        "set_delay" => match args.as_slice() {
            [min, max] => match (min.parse::<u64>(), max.parse::<u64>()) {
                (Ok(min), Ok(max)) => Ok(AdminCommand::SetDelay { min, max }),
                _ => Err(invalid_delay(prefix)),
            },
            _ => Err(usage(prefix, "set_delay <min_delay> <max_delay>")),
        },
        "night_mode" => match args.as_slice() {
            [value] => parse_flag(value)
                .map(AdminCommand::NightMode)
                .ok_or_else(|| invalid_flag(prefix)),
            _ => Err(usage(prefix, "night_mode <true/false>")),
        },
        "refresh_prompt" => Ok(AdminCommand::RefreshPrompt),
        "help" => Ok(AdminCommand::Help),
        _ => return None,
    };

    Some(command)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn usage(prefix: &str, signature: &str) -> String {
    format!("{}Usage: {}{}", prefix, prefix, signature)
}

pub fn invalid_memory_size(prefix: &str) -> String {
    format!(
        "{}Invalid memory size. Please choose a number between 1 and 100.",
        prefix
    )
}

pub fn invalid_flag(prefix: &str) -> String {
    format!("{}Invalid value. Please use 'true' or 'false'.", prefix)
}

pub fn invalid_delay(prefix: &str) -> String {
    format!(
        "{}Invalid delay range. Min must be ≥1, max must be ≤60, and min must be less than max.",
        prefix
    )
}

pub fn help_text(prefix: &str) -> String {
    [
        "Available commands:",
        "reset_history - Reset the message history.",
        "set_memory_size <size> - Set the message memory size (1-100).",
        "debug <true/false> - Enable or disable debug mode.",
        "set_delay <min_delay> <max_delay> - Set the delay range in seconds.",
        "night_mode <true/false> - Enable or disable night mode.",
        "refresh_prompt - Refresh the system prompt.",
    ]
    .iter()
    .map(|line| format!("{}{}", prefix, line))
    .collect::<Vec<_>>()
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse("#reset_history", "#"), Some(Ok(AdminCommand::ResetHistory)));
        assert_eq!(parse("#refresh_prompt", "#"), Some(Ok(AdminCommand::RefreshPrompt)));
        assert_eq!(parse("  #help  ", "#"), Some(Ok(AdminCommand::Help)));
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(
            parse("#set_memory_size 25", "#"),
            Some(Ok(AdminCommand::SetMemorySize(25)))
        );
        assert_eq!(parse("#debug TRUE", "#"), Some(Ok(AdminCommand::Debug(true))));
        assert_eq!(
            parse("#night_mode false", "#"),
            Some(Ok(AdminCommand::NightMode(false)))
        );
        assert_eq!(
            parse("#set_delay 5 10", "#"),
            Some(Ok(AdminCommand::SetDelay { min: 5, max: 10 }))
        );
    }

    #[test]
    fn test_parse_rejections() {
        assert_eq!(
            parse("#set_memory_size lots", "#"),
            Some(Err(invalid_memory_size("#")))
        );
        assert_eq!(parse("#debug maybe", "#"), Some(Err(invalid_flag("#"))));
        assert_eq!(parse("#set_delay a 10", "#"), Some(Err(invalid_delay("#"))));
        assert!(matches!(parse("#set_delay 5", "#"), Some(Err(_))));
        assert!(matches!(parse("#set_memory_size", "#"), Some(Err(_))));
    }

    #[test]
    fn test_non_commands() {
        assert_eq!(parse("hello #help", "#"), None);
        assert_eq!(parse("#dance", "#"), None);
        assert_eq!(parse("#", "#"), None);
        assert_eq!(parse("!help", "#"), None);
    }

    #[test]
    fn test_custom_prefix() {
        assert_eq!(parse("!help", "!"), Some(Ok(AdminCommand::Help)));
        assert!(help_text("!").lines().all(|line| line.starts_with('!')));
    }

    #[test]
    fn test_help_lists_every_command() {
        let help = help_text("#");
        for name in [
            "reset_history",
            "set_memory_size",
            "debug",
            "set_delay",
            "night_mode",
            "refresh_prompt",
        ] {
            assert!(help.contains(&format!("#{}", name)), "missing {}", name);
        }
        assert!(help.lines().all(|line| line.starts_with('#')));
    }
}
