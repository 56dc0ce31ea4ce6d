//! Line syntax of text commands.
//!
//! ```text
//! !version=dp:4.21.2
//! # comment
//! 1 join flags=auth,mod name=Bob\sSmith
//! 1 classicdabs layer=0x0001 x=0.25 y=0.5 color=#000000 mode=1 {
//!     1 1.25 1 255 128
//! }
//! ```
//!
//! A message line is `<user_id> <command>` followed by `key=value`
//! arguments. Values escape backslash, space, tab, carriage return and
//! newline as `\\`, `\s`, `\t`, `\r` and `\n`; any other whitespace
//! character is written as `\u{hex}`. A trailing `{` opens a block of
//! struct-array records, one per line, closed by a line holding only `}`.

use crate::error::TextError;
use crate::text::TextMessage;
use std::fmt;
use std::str::FromStr;

/// Result of feeding one line to a [`TextParser`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParseResult {
    /// Blank or comment line.
    Skip,
    /// Inside a record block; the message is not complete yet.
    NeedMore,
    /// A `!key=value` metadata line.
    Metadata(String, String),
    Message(TextMessage),
}

/// Incremental parser for text recordings.
#[derive(Debug, Default)]
pub struct TextParser {
    pending: Option<TextMessage>,
}

impl TextParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_line(&mut self, line: &str) -> Result<ParseResult, TextError> {
        let line = line.trim();

        if let Some(mut msg) = self.pending.take() {
            if line == "}" {
                return Ok(ParseResult::Message(msg));
            }
            if !line.is_empty() && !line.starts_with('#') {
                msg.dabs.push(parse_record(line)?);
            }
            self.pending = Some(msg);
            return Ok(ParseResult::NeedMore);
        }

        if line.is_empty() || line.starts_with('#') {
            return Ok(ParseResult::Skip);
        }

        if let Some(meta) = line.strip_prefix('!') {
            let (key, value) = meta
                .split_once('=')
                .ok_or_else(|| TextError::Syntax(format!("metadata line without '=': {}", line)))?;
            return Ok(ParseResult::Metadata(key.trim().to_string(), unescape(value)?));
        }

        let (msg, opens_block) = parse_message_line(line)?;
        if opens_block {
            self.pending = Some(msg);
            Ok(ParseResult::NeedMore)
        } else {
            Ok(ParseResult::Message(msg))
        }
    }

    /// Whether a record block is still open.
    pub fn in_block(&self) -> bool {
        self.pending.is_some()
    }

    /// Checks that the input did not end inside a record block.
    pub fn finish(&mut self) -> Result<(), TextError> {
        match self.pending.take() {
            Some(msg) => Err(TextError::Syntax(format!(
                "unterminated record block in '{}' message",
                msg.name
            ))),
            None => Ok(()),
        }
    }
}

fn parse_message_line(line: &str) -> Result<(TextMessage, bool), TextError> {
    let mut tokens: Vec<&str> = line.split_whitespace().collect();

    let opens_block = tokens.last() == Some(&"{");
    if opens_block {
        tokens.pop();
    }

    let (user_id, name, args) = match tokens.as_slice() {
        [user_id, name, args @ ..] => (user_id, name, args),
        _ => {
            return Err(TextError::Syntax(format!(
                "expected '<user_id> <command>': {}",
                line
            )))
        }
    };

    let user_id = user_id
        .parse::<u8>()
        .map_err(|_| TextError::Syntax(format!("invalid user ID '{}'", user_id)))?;

    let mut msg = TextMessage::new(user_id, *name);
    for arg in args {
        let (key, value) = arg
            .split_once('=')
            .ok_or_else(|| TextError::Syntax(format!("expected key=value, got '{}'", arg)))?;
        msg = msg.set(key, unescape(value)?);
    }
    Ok((msg, opens_block))
}

fn parse_record(line: &str) -> Result<Vec<f64>, TextError> {
    line.split_whitespace()
        .map(|item| {
            item.parse::<f64>()
                .map_err(|_| TextError::Syntax(format!("invalid record value '{}'", item)))
        })
        .collect()
}

/// Escapes a value so that it forms a single token.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ' ' => out.push_str("\\s"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            // the parser splits tokens on any whitespace
            c if c.is_whitespace() => out.push_str(&format!("\\u{{{:x}}}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

pub fn unescape(value: &str) -> Result<String, TextError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('s') => out.push(' '),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('u') => out.push(unescape_code_point(&mut chars)?),
            Some(other) => {
                return Err(TextError::Syntax(format!("unknown escape '\\{}'", other)));
            }
            None => return Err(TextError::Syntax("dangling '\\' at end of value".to_string())),
        }
    }
    Ok(out)
}

/// Reads the `{hex}` part of a `\u{hex}` escape.
fn unescape_code_point(chars: &mut std::str::Chars<'_>) -> Result<char, TextError> {
    let bad = || TextError::Syntax("malformed '\\u{..}' escape".to_string());
    if chars.next() != Some('{') {
        return Err(bad());
    }
    let mut hex = String::new();
    loop {
        match chars.next() {
            Some('}') => break,
            Some(c) if c.is_ascii_hexdigit() && hex.len() < 6 => hex.push(c),
            _ => return Err(bad()),
        }
    }
    u32::from_str_radix(&hex, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(bad)
}

impl fmt::Display for TextMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.user_id, self.name)?;
        for (key, value) in &self.args {
            write!(f, " {}={}", key, escape(value))?;
        }

        if !self.dabs.is_empty() {
            f.write_str(" {")?;
            for dab in &self.dabs {
                f.write_str("\n\t")?;
                for (i, v) in dab.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", v)?;
                }
            }
            f.write_str("\n}")?;
        }
        Ok(())
    }
}

impl FromStr for TextMessage {
    type Err = TextError;

    /// Parses exactly one message, which may span several lines.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = TextParser::new();
        let mut message = None;

        for line in s.lines() {
            match parser.parse_line(line)? {
                ParseResult::Message(msg) if message.is_none() => message = Some(msg),
                ParseResult::Message(_) => {
                    return Err(TextError::Syntax("more than one message".to_string()));
                }
                ParseResult::Metadata(key, _) => {
                    return Err(TextError::Syntax(format!(
                        "unexpected metadata line '{}'",
                        key
                    )));
                }
                ParseResult::Skip | ParseResult::NeedMore => {}
            }
        }
        parser.finish()?;

        message.ok_or_else(|| TextError::Syntax("no message".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_display_simple() {
        let msg = TextMessage::new(1, "join")
            .set("flags", "auth,mod")
            .set("name", "XYZ");
        assert_eq!(msg.to_string(), "1 join flags=auth,mod name=XYZ");
    }

    #[test]
    fn test_escaping_roundtrip() {
        let msg = TextMessage::new(7, "chat").set("message", "hello world\\\n\tbye");
        let line = msg.to_string();
        assert_eq!(line, "7 chat message=hello\\sworld\\\\\\n\\tbye");
        assert_eq!(line.parse::<TextMessage>().unwrap(), msg);
    }

    #[test]
    fn test_unicode_whitespace_is_escaped() {
        for (value, escaped) in [
            ("a\rb", "a\\rb"),
            ("a\u{3000}b", "a\\u{3000}b"),
            ("a\u{a0}b", "a\\u{a0}b"),
            ("trailing\r", "trailing\\r"),
        ] {
            let msg = TextMessage::new(7, "chat").set("message", value);
            let line = msg.to_string();
            assert_eq!(line, format!("7 chat message={}", escaped));
            assert_eq!(line.parse::<TextMessage>().unwrap().get("message"), Some(value));
        }
    }

    #[test]
    fn test_value_with_equals_sign() {
        let msg: TextMessage = "1 command msg={\"a\":1}".parse().unwrap();
        assert_eq!(msg.get("msg"), Some("{\"a\":1}"));
    }

    #[test]
    fn test_record_block() {
        let msg = TextMessage::new(1, "classicdabs")
            .set("layer", "0x0001")
            .with_dabs(vec![vec![1.0, 1.25, 1.0, 255.0, 128.0], vec![-0.5, 0.0, 0.5, 10.0, 0.0]]);
        let text = msg.to_string();
        assert_eq!(
            text,
            "1 classicdabs layer=0x0001 {\n\t1 1.25 1 255 128\n\t-0.5 0 0.5 10 0\n}"
        );
        assert_eq!(text.parse::<TextMessage>().unwrap(), msg);
    }

    #[test]
    fn test_parser_lines() {
        let mut parser = TextParser::new();
        assert_eq!(
            parser.parse_line("!version=dp:4.21.2").unwrap(),
            ParseResult::Metadata("version".to_string(), "dp:4.21.2".to_string())
        );
        assert_eq!(parser.parse_line("").unwrap(), ParseResult::Skip);
        assert_eq!(parser.parse_line("# note").unwrap(), ParseResult::Skip);
        assert_eq!(
            parser.parse_line("2 pixeldabs x=1 {").unwrap(),
            ParseResult::NeedMore
        );
        assert!(parser.in_block());
        assert_eq!(parser.parse_line("  1 2 3 4").unwrap(), ParseResult::NeedMore);
        match parser.parse_line("}").unwrap() {
            ParseResult::Message(msg) => {
                assert_eq!(msg.user_id, 2);
                assert_eq!(msg.dabs, vec![vec![1.0, 2.0, 3.0, 4.0]]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(parser.finish().is_ok());
    }

    #[test]
    fn test_unterminated_block() {
        let result = "1 pixeldabs {\n1 2 3 4".parse::<TextMessage>();
        assert!(matches!(result, Err(TextError::Syntax(_))));
    }

    #[test]
    fn test_syntax_errors() {
        assert!("join".parse::<TextMessage>().is_err());
        assert!("300 join".parse::<TextMessage>().is_err());
        assert!("1 join name".parse::<TextMessage>().is_err());
        assert!("1 join name=a\\x".parse::<TextMessage>().is_err());
        assert!("1 join name=a\\u{20".parse::<TextMessage>().is_err());
        assert!("1 join name=a\\u20".parse::<TextMessage>().is_err());
        assert!("1 join name=a\\u{d800}".parse::<TextMessage>().is_err());
        assert!("1 pixeldabs {\nabc\n}".parse::<TextMessage>().is_err());
        assert!("1 leave\n2 leave".parse::<TextMessage>().is_err());
        assert!("".parse::<TextMessage>().is_err());
    }

    #[test]
    fn test_empty_value_is_dropped() {
        let msg: TextMessage = "1 join name= flags=bot".parse().unwrap();
        assert_eq!(msg.get("name"), None);
        assert_eq!(msg.get("flags"), Some("bot"));
    }

    proptest! {
        #[test]
        fn any_value_survives_a_line(value in any::<String>()) {
            let msg = TextMessage::new(3, "chat").set("message", value.as_str());
            let parsed: TextMessage = msg.to_string().parse().unwrap();
            prop_assert_eq!(parsed, msg);
        }
    }
}
