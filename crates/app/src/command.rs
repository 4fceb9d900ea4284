//! Chat command grammar
//!
//! Recognition is ordered and case-insensitive; the first match wins.

use once_cell::sync::Lazy;
use regex::Regex;

static HELP: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^h[ea]+l+p+$").unwrap());
static ENTER_OFFICE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:go|drive|enter)(?:\s+to)?\s+(?:the\s+)?office$").unwrap()
});
static INSTALL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^!install (.+)$").unwrap());
static UNINSTALL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^!uninstall$").unwrap());
static GO: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^go(?:\s+to)?\s+(.+)$").unwrap());
static LOOK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^l(?:ook)?$").unwrap());

/// A recognized chat command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Help,
    Offices,
    Sync,
    EnterOffice,
    Install(&'a str),
    Uninstall,
    Look,
    Go(&'a str),
    Unknown,
}

fn capture<'a>(re: &Regex, content: &'a str) -> Option<&'a str> {
    re.captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
}

/// Classify message content with the bot prefix already stripped
pub fn parse(content: &str) -> Command<'_> {
    let content = content.trim();

    if HELP.is_match(content) {
        return Command::Help;
    }
    if content.eq_ignore_ascii_case("offices") {
        return Command::Offices;
    }
    if content.eq_ignore_ascii_case("!sync") {
        return Command::Sync;
    }
    if ENTER_OFFICE.is_match(content) {
        return Command::EnterOffice;
    }
    if let Some(office_id) = capture(&INSTALL, content) {
        return Command::Install(office_id);
    }
    if UNINSTALL.is_match(content) {
        return Command::Uninstall;
    }
    if LOOK.is_match(content) {
        return Command::Look;
    }
    if let Some(destination) = capture(&GO, content) {
        return Command::Go(destination);
    }
    Command::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_help_variants() {
        for text in ["help", "HELP", "halp", "heeelllppp"] {
            assert_eq!(parse(text), Command::Help, "{}", text);
        }
        assert_eq!(parse("help me"), Command::Unknown);
    }

    #[test]
    fn test_enter_office_phrases() {
        for text in [
            "go to office",
            "go to the office",
            "drive to the office",
            "enter office",
            "Enter The Office",
            "go office",
        ] {
            assert_eq!(parse(text), Command::EnterOffice, "{}", text);
        }
    }

    #[test]
    fn test_admin_commands() {
        assert_eq!(parse("!install awnam"), Command::Install("awnam"));
        assert_eq!(parse("!INSTALL awnam"), Command::Install("awnam"));
        assert_eq!(parse("!uninstall"), Command::Uninstall);
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse("offices"), Command::Offices);
        assert_eq!(parse("Offices"), Command::Offices);
        assert_eq!(parse("!sync"), Command::Sync);
        assert_eq!(parse("l"), Command::Look);
        assert_eq!(parse("LOOK"), Command::Look);
    }

    #[test]
    fn test_go_destination() {
        assert_eq!(parse("go reception"), Command::Go("reception"));
        assert_eq!(parse("go to Sarah's office"), Command::Go("Sarah's office"));
    }

    #[test]
    fn test_unknown() {
        assert_eq!(parse("dance"), Command::Unknown);
        assert_eq!(parse(""), Command::Unknown);
    }
}
