//! Tokenizer and keyword table for autonomous scripts.
//!
//! A line is a keyword followed by its parameters. Any run of [`DELIMITERS`] separates tokens,
//! so `MMOVE 0.5, 24, 3.0`, `MMOVE(0.5 24 3.0)` and `MMOVE [0.5,24,3.0]` read the same.
use core::fmt::{self, Display, Formatter};

use crate::config::{KeywordMatch, MAX_VELOCITY_PARAM};
use crate::robot::commands::MoveParams;

pub const DELIMITERS: &[char] = &[' ', ',', '[', ']', '(', ')', '\r', '\n', '\t'];
pub const COMMENT: char = '#';

/// Splits a line the way `strtok` does: skip leading delimiters, take everything up to the next
/// delimiter, and consume that one delimiter.
#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    rest: &'a str,
}

impl<'a> Tokens<'a> {
    pub fn new(line: &'a str) -> Self {
        Self { rest: line }
    }

    /// Text not yet tokenized.
    pub fn rest(&self) -> &'a str {
        self.rest
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let start = self.rest.trim_start_matches(DELIMITERS);
        if start.is_empty() {
            self.rest = start;
            return None;
        }
        match start.find(DELIMITERS) {
            Some(end) => {
                let (token, tail) = start.split_at(end);
                // delimiters are all one byte
                self.rest = &tail[1..];
                Some(token)
            }
            None => {
                self.rest = "";
                Some(start)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Mode,
    Debug,
    Message,
    Begin,
    End,
    Delay,
    Move,
    MeasuredMove,
    ProximityMove,
    TimedMove,
    Turn,
    ReleaseGear,
    HoldGear,
    HangGear,
    Climber,
    Nop,
}

impl Keyword {
    /// Lookup order. With prefix matching the first entry that prefixes the token wins.
    pub const TABLE: [Keyword; 16] = [
        Keyword::Mode,
        Keyword::Debug,
        Keyword::Message,
        Keyword::Begin,
        Keyword::End,
        Keyword::Delay,
        Keyword::Move,
        Keyword::MeasuredMove,
        Keyword::ProximityMove,
        Keyword::TimedMove,
        Keyword::Turn,
        Keyword::ReleaseGear,
        Keyword::HoldGear,
        Keyword::HangGear,
        Keyword::Climber,
        Keyword::Nop,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Keyword::Mode => "MODE",
            Keyword::Debug => "DEBUG",
            Keyword::Message => "MESSAGE",
            Keyword::Begin => "BEGIN",
            Keyword::End => "END",
            Keyword::Delay => "DELAY",
            Keyword::Move => "MOVE",
            Keyword::MeasuredMove => "MMOVE",
            Keyword::ProximityMove => "PMOVE",
            Keyword::TimedMove => "TMOVE",
            Keyword::Turn => "TURN",
            Keyword::ReleaseGear => "RGEAR",
            Keyword::HoldGear => "HGEAR",
            Keyword::HangGear => "GEARM",
            Keyword::Climber => "CLIMBER",
            Keyword::Nop => "NOP",
        }
    }

    pub fn lookup(token: &str, matching: KeywordMatch) -> Option<Keyword> {
        Self::TABLE.into_iter().find(|keyword| match matching {
            KeywordMatch::Exact => token == keyword.as_str(),
            KeywordMatch::Prefix => token.starts_with(keyword.as_str()),
        })
    }

    /// Reads this keyword's parameters from the rest of the line.
    pub fn parse<'a>(self, mut args: Tokens<'a>) -> Result<Statement<'a>, ParseError> {
        let number = |args: &mut Tokens<'a>| -> Result<f32, ParseError> {
            let token = args.next().ok_or(ParseError::MissingParameter(self))?;
            token.parse::<f32>().map_err(|_| ParseError::BadNumber(self))
        };

        let statement = match self {
            Keyword::Mode => Statement::Mode(number(&mut args)? as i32),
            Keyword::Debug => Statement::Debug(number(&mut args)? != 0.0),
            Keyword::Message => Statement::Message(args.rest().trim_matches(DELIMITERS)),
            Keyword::Begin => Statement::Begin,
            Keyword::End => Statement::End,
            Keyword::Delay => Statement::Delay(number(&mut args)?),
            Keyword::Move => {
                let left = number(&mut args)?;
                let right = number(&mut args)?;
                if left.abs() > MAX_VELOCITY_PARAM || right.abs() > MAX_VELOCITY_PARAM {
                    return Err(ParseError::OutOfRange(self));
                }
                Statement::Move { left, right }
            }
            Keyword::MeasuredMove | Keyword::ProximityMove => {
                let params = MoveParams {
                    speed: number(&mut args)?,
                    distance: number(&mut args)?,
                    timeout: number(&mut args)?,
                };
                if self == Keyword::MeasuredMove {
                    Statement::MeasuredMove(params)
                } else {
                    Statement::ProximityMove(params)
                }
            }
            Keyword::TimedMove => Statement::TimedMove {
                speed: number(&mut args)?,
                time: number(&mut args)?,
            },
            Keyword::Turn => Statement::Turn {
                angle: number(&mut args)?,
                timeout: number(&mut args)?,
            },
            Keyword::ReleaseGear => Statement::ReleaseGear,
            Keyword::HoldGear => Statement::HoldGear,
            Keyword::HangGear => Statement::HangGear,
            Keyword::Climber => Statement::Climber,
            Keyword::Nop => Statement::Nop,
        };
        Ok(statement)
    }
}

impl Display for Keyword {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed script line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Statement<'a> {
    Mode(i32),
    Debug(bool),
    Message(&'a str),
    Begin,
    End,
    /// Seconds.
    Delay(f32),
    Move { left: f32, right: f32 },
    MeasuredMove(MoveParams),
    ProximityMove(MoveParams),
    TimedMove { speed: f32, time: f32 },
    Turn { angle: f32, timeout: f32 },
    ReleaseGear,
    HoldGear,
    HangGear,
    Climber,
    Nop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// The line holds nothing but delimiters.
    MissingToken,
    UnknownKeyword,
    MissingParameter(Keyword),
    BadNumber(Keyword),
    OutOfRange(Keyword),
}

impl ParseError {
    /// Errors in the keyword itself end the script; parameter errors only skip the line.
    pub fn terminates(self) -> bool {
        matches!(self, ParseError::MissingToken | ParseError::UnknownKeyword)
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MissingToken => f.write_str("missing token"),
            ParseError::UnknownKeyword => f.write_str("no tokens - check script spelling"),
            ParseError::MissingParameter(k) => write!(f, "{k}: missing parameter"),
            ParseError::BadNumber(k) => write!(f, "{k}: parameter is not a number"),
            ParseError::OutOfRange(k) => write!(f, "{k}: parameter out of range"),
        }
    }
}

impl core::error::Error for ParseError {}

/// Comments and blank lines carry no command.
pub fn is_skippable(line: &str) -> bool {
    let line = line.trim_start_matches(DELIMITERS);
    line.is_empty() || line.starts_with(COMMENT)
}

/// Finds the keyword at the start of `line` and hands back the tokenizer positioned after it.
pub fn split_keyword(line: &str, matching: KeywordMatch) -> Result<(Keyword, Tokens<'_>), ParseError> {
    let mut tokens = Tokens::new(line);
    let token = tokens.next().ok_or(ParseError::MissingToken)?;
    let keyword = Keyword::lookup(token, matching).ok_or(ParseError::UnknownKeyword)?;
    Ok((keyword, tokens))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Statement<'_>, ParseError> {
        let (keyword, args) = split_keyword(line, KeywordMatch::Exact)?;
        keyword.parse(args)
    }

    #[test]
    fn any_run_of_delimiters_separates_tokens() {
        let tokens: std::vec::Vec<&str> = Tokens::new("  MMOVE(0.5,, 24]\t[3.0)\r\n").collect();
        assert_eq!(tokens, ["MMOVE", "0.5", "24", "3.0"]);
        assert_eq!(Tokens::new(" ,\t").next(), None);
    }

    #[test]
    fn every_keyword_is_found_by_exact_match() {
        for keyword in Keyword::TABLE {
            assert_eq!(Keyword::lookup(keyword.as_str(), KeywordMatch::Exact), Some(keyword));
        }
        assert_eq!(Keyword::lookup("MOVEMENT", KeywordMatch::Exact), None);
        assert_eq!(Keyword::lookup("mmove", KeywordMatch::Exact), None);
    }

    #[test]
    fn prefix_match_takes_the_first_table_entry() {
        assert_eq!(
            Keyword::lookup("MOVEMENT", KeywordMatch::Prefix),
            Some(Keyword::Move)
        );
        assert_eq!(Keyword::lookup("ENDING", KeywordMatch::Prefix), Some(Keyword::End));
        assert_eq!(
            Keyword::lookup("MMOVE", KeywordMatch::Prefix),
            Some(Keyword::MeasuredMove)
        );
        assert_eq!(Keyword::lookup("XYZ", KeywordMatch::Prefix), None);
    }

    #[test]
    fn parameters_are_read_per_keyword() {
        assert_eq!(
            parse("MMOVE 0.5 24 3.0"),
            Ok(Statement::MeasuredMove(MoveParams {
                speed: 0.5,
                distance: 24.0,
                timeout: 3.0
            }))
        );
        assert_eq!(
            parse("TURN [90, 2.0]"),
            Ok(Statement::Turn {
                angle: 90.0,
                timeout: 2.0
            })
        );
        assert_eq!(parse("DEBUG 1"), Ok(Statement::Debug(true)));
        assert_eq!(parse("MODE 3"), Ok(Statement::Mode(3)));
        assert_eq!(parse("MESSAGE  hello robot "), Ok(Statement::Message("hello robot")));
        assert_eq!(parse("GEARM"), Ok(Statement::HangGear));
    }

    #[test]
    fn short_or_bad_parameters_are_errors_that_do_not_terminate() {
        let missing = parse("MMOVE 0.5 24").unwrap_err();
        assert_eq!(missing, ParseError::MissingParameter(Keyword::MeasuredMove));
        assert!(!missing.terminates());
        assert_eq!(parse("TURN ninety 2"), Err(ParseError::BadNumber(Keyword::Turn)));
        assert_eq!(parse("MOVE 1.5 0.5"), Err(ParseError::OutOfRange(Keyword::Move)));
        assert_eq!(parse("MOVE 0.5"), Err(ParseError::MissingParameter(Keyword::Move)));
    }

    #[test]
    fn keyword_errors_terminate() {
        assert_eq!(parse("   "), Err(ParseError::MissingToken));
        assert_eq!(parse("JUMP 3"), Err(ParseError::UnknownKeyword));
        assert!(ParseError::MissingToken.terminates());
        assert!(ParseError::UnknownKeyword.terminates());
    }

    #[test]
    fn comments_and_blanks_are_skipped() {
        assert!(is_skippable(""));
        assert!(is_skippable("  \t"));
        assert!(is_skippable("# MMOVE 1 2 3"));
        assert!(is_skippable("  # indented"));
        assert!(!is_skippable("NOP # trailing"));
    }
}
