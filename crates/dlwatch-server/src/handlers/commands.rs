// src/handlers/commands.rs
// Splits a raw message into a command name and its argument string. Actual
// text parsing and wire delivery belong to the chat-update dispatcher
// (spec §1 Non-goals); this is just the thin shape the handlers expect.

/// Splits `"/add http://example/file.bin"` into `("add", "http://example/file.bin")`.
/// The leading `/` is required; a bot username suffix (`/add@mybot`) is stripped.
pub fn parse_command(text: &str) -> Option<(&str, &str)> {
    let text = text.trim();
    let rest = text.strip_prefix('/')?;
    let (head, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let name = head.split('@').next().unwrap_or(head);
    if name.is_empty() {
        return None;
    }
    Some((name, args.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_with_argument() {
        assert_eq!(parse_command("/add http://example/file.bin"), Some(("add", "http://example/file.bin")));
    }

    #[test]
    fn parses_command_with_no_argument() {
        assert_eq!(parse_command("/history"), Some(("history", "")));
    }

    #[test]
    fn strips_bot_username_suffix() {
        assert_eq!(parse_command("/status@dlwatch_bot 0123456789abcdef"), Some(("status", "0123456789abcdef")));
    }

    #[test]
    fn rejects_text_without_leading_slash() {
        assert_eq!(parse_command("hello"), None);
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(parse_command("  /help  "), Some(("help", "")));
    }
}
