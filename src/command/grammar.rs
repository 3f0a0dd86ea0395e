//! Recursive-descent parser for the one-line command language.
//!
//! ```text
//! command   := ws? ("@" identifier)? ws? (subscribe | show_meta | feed_command | simple) ws?
//! subscribe := "subscribe" ws url ws "as" ws identifier (ws "with" ws (option ws?)*)?
//! option    := "meta_filter(" key ("=" value ")" | "=~/" regex "/)")
//!            | "feed_author_filter(" value ")"
//!            | "tag(" identifier ("," ws? identifier)* ")"
//!            | "redirect_url"
//! ```
//!
//! Identifiers are any run of characters other than whitespace and
//! `:()=,`, so names in any script are accepted.

use thiserror::Error;

use crate::subscription::{Matcher, MetaFilter, SubscriptionOptions};

/// A command line that does not match the grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot parse '{input}': {reason}")]
pub struct GrammarError {
    pub input: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand {
    Help,
    Version,
    List,
    Fetch,
    ShowArticles(String),
    ShowMeta(String),
    Unsubscribe(String),
    Subscribe {
        url: String,
        id: String,
        options: SubscriptionOptions,
    },
    EndSession,
    Unrecognized(GrammarError),
}

impl ParsedCommand {
    /// Parses `input`, turning grammar failures into [`ParsedCommand::Unrecognized`].
    pub fn from_input(input: &str) -> Self {
        parse(input).unwrap_or_else(ParsedCommand::Unrecognized)
    }
}

/// Parses one command line.
pub fn parse(input: &str) -> Result<ParsedCommand, GrammarError> {
    let mut cursor = Cursor::new(input);

    cursor.skip_ws();
    if cursor.eat("@") {
        cursor
            .identifier()
            .ok_or_else(|| cursor.error("expected a name after '@'"))?;
        cursor.skip_ws();
    }

    let command = if cursor.keyword("subscribe") {
        subscribe(&mut cursor)?
    } else if cursor.keyword("show_meta") {
        cursor.require_ws()?;
        ParsedCommand::ShowMeta(cursor.url()?)
    } else if cursor.keyword("show_articles") {
        cursor.require_ws()?;
        ParsedCommand::ShowArticles(cursor.required_identifier()?)
    } else if cursor.keyword("unsubscribe") {
        cursor.require_ws()?;
        ParsedCommand::Unsubscribe(cursor.required_identifier()?)
    } else if cursor.keyword("list") {
        ParsedCommand::List
    } else if cursor.keyword("fetch") {
        ParsedCommand::Fetch
    } else if cursor.keyword("version") {
        ParsedCommand::Version
    } else if cursor.keyword("help") {
        ParsedCommand::Help
    } else if cursor.keyword("end") || cursor.keyword("quit") {
        ParsedCommand::EndSession
    } else {
        return Err(cursor.error("unknown command"));
    };

    cursor.skip_ws();
    if !cursor.at_end() {
        return Err(cursor.error(format!("unexpected '{}'", cursor.rest())));
    }
    Ok(command)
}

fn subscribe(cursor: &mut Cursor<'_>) -> Result<ParsedCommand, GrammarError> {
    cursor.require_ws()?;
    let url = cursor.url()?;
    cursor.require_ws()?;
    if !cursor.keyword("as") {
        return Err(cursor.error("expected 'as <feed id>'"));
    }
    cursor.require_ws()?;
    let id = cursor.required_identifier()?;

    let mut options = SubscriptionOptions::default();
    let before_with = cursor.pos;
    if cursor.skip_ws() && cursor.keyword("with") {
        cursor.skip_ws();
        while option(cursor, &mut options)? {
            cursor.skip_ws();
        }
    } else {
        cursor.pos = before_with;
    }

    Ok(ParsedCommand::Subscribe { url, id, options })
}

/// Parses one subscribe option into `options`; later options of the same
/// kind replace earlier ones. Returns false if no option starts here.
fn option(cursor: &mut Cursor<'_>, options: &mut SubscriptionOptions) -> Result<bool, GrammarError> {
    if cursor.eat("meta_filter(") {
        let key = cursor.take_while(|c| !matches!(c, '=' | '~' | '(' | ')'));
        if key.is_empty() {
            return Err(cursor.error("meta_filter needs a key"));
        }
        let matcher = if cursor.eat("=~/") {
            let pattern = cursor.take_until("/)")?;
            if pattern.is_empty() {
                return Err(cursor.error("meta_filter needs a pattern"));
            }
            Matcher::pattern(pattern)
                .map_err(|e| cursor.error(format!("invalid pattern /{pattern}/: {e}")))?
        } else if cursor.eat("=") {
            let value = cursor.take_while(|c| !matches!(c, '~' | ')'));
            if value.is_empty() {
                return Err(cursor.error("meta_filter needs a value"));
            }
            cursor.expect(")")?;
            Matcher::Exact(value.to_string())
        } else {
            return Err(cursor.error("expected '=' or '=~/' in meta_filter"));
        };
        options.meta_filter = Some(MetaFilter::new(key, matcher));
    } else if cursor.eat("feed_author_filter(") {
        let author = cursor.take_while(|c| !matches!(c, '~' | ')'));
        if author.is_empty() {
            return Err(cursor.error("feed_author_filter needs an author"));
        }
        cursor.expect(")")?;
        options.feed_author_filter = Some(author.to_string());
    } else if cursor.eat("tag(") {
        let mut tags = vec![cursor.required_identifier()?];
        loop {
            cursor.skip_ws();
            if !cursor.eat(",") {
                break;
            }
            cursor.skip_ws();
            tags.push(cursor.required_identifier()?);
        }
        cursor.expect(")")?;
        options.tags = tags;
    } else if cursor.eat("redirect_url") {
        options.redirect_url = true;
    } else {
        return Ok(false);
    }
    Ok(true)
}

fn is_identifier_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, ':' | '(' | ')' | '=' | ',')
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos == self.input.len()
    }

    fn error(&self, reason: impl Into<String>) -> GrammarError {
        GrammarError {
            input: self.input.to_string(),
            reason: reason.into(),
        }
    }

    fn eat(&mut self, literal: &str) -> bool {
        if self.rest().starts_with(literal) {
            self.pos += literal.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, literal: &str) -> Result<(), GrammarError> {
        if self.eat(literal) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{literal}'")))
        }
    }

    /// Like [`eat`](Self::eat), but only when the word ends at whitespace
    /// or end of input.
    fn keyword(&mut self, word: &str) -> bool {
        let rest = self.rest();
        let ends_word = rest
            .strip_prefix(word)
            .is_some_and(|after| after.chars().next().map_or(true, char::is_whitespace));
        if ends_word {
            self.pos += word.len();
        }
        ends_word
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|&(_, c)| !pred(c))
            .map_or(rest.len(), |(i, _)| i);
        self.pos += len;
        &rest[..len]
    }

    /// Consumes up to and including `terminator`, returning the text before it.
    fn take_until(&mut self, terminator: &str) -> Result<&'a str, GrammarError> {
        let rest = self.rest();
        let end = rest
            .find(terminator)
            .ok_or_else(|| self.error(format!("expected '{terminator}'")))?;
        self.pos += end + terminator.len();
        Ok(&rest[..end])
    }

    /// Returns true if any whitespace was skipped.
    fn skip_ws(&mut self) -> bool {
        !self.take_while(char::is_whitespace).is_empty()
    }

    fn require_ws(&mut self) -> Result<(), GrammarError> {
        if self.skip_ws() {
            Ok(())
        } else {
            Err(self.error("expected whitespace"))
        }
    }

    fn identifier(&mut self) -> Option<String> {
        let ident = self.take_while(is_identifier_char);
        (!ident.is_empty()).then(|| ident.to_string())
    }

    fn required_identifier(&mut self) -> Result<String, GrammarError> {
        self.identifier()
            .ok_or_else(|| self.error("expected a feed id"))
    }

    fn url(&mut self) -> Result<String, GrammarError> {
        let url = self.take_while(|c| !c.is_whitespace());
        if url.is_empty() {
            Err(self.error("expected a URL"))
        } else {
            Ok(url.to_string())
        }
    }
}
