#![allow(clippy::module_name_repetitions)]

//! Lexer and parser for control lines.
//!
//! The lexer uses `regal` to produce a bounded token stream, while the parser
//! composes `winnow` combinators over those tokens to build [`Command`]
//! values. Everything stays allocation free so the firmware can parse lines
//! straight out of its USB receive buffer.

use core::fmt;
use core::ops::Range;
use core::time::Duration;

use heapless::Vec as HeaplessVec;
use regal::IncrementalError;
use regal::TokenCache;
use regal_macros::RegalLexer;
#[allow(deprecated)]
use winnow::error::ErrorKind;
use winnow::error::{ErrMode, ParserError};
use winnow::prelude::*;
use winnow::stream::Stream;

use super::catalog::{self, ChoiceBranch, ChoiceTag, CommandTag, Node, ValueSpec};
use crate::button::ButtonEvent;

/// Maximum number of tokens produced per control line.
pub const MAX_TOKENS: usize = 16;
const MAX_CACHE_RECORDS: usize = MAX_TOKENS * 2;

/// Lexical token kinds recognized by the control grammar.
#[derive(RegalLexer, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TokenKind {
    /// Duration literal ending in `ms` or `s`.
    #[regex(r"[0-9]+(?:ms|s)", priority = 2)]
    Duration,
    /// Unsuffixed integer literal.
    #[regex(r"[0-9]+")]
    Integer,
    /// Identifier or keyword (case-insensitive match performed later).
    #[regex(r"[A-Za-z][A-Za-z0-9_-]*")]
    Ident,
    /// Inline whitespace is ignored.
    #[regex(r"[ \t]+", skip)]
    Whitespace,
    /// End-of-line token (`\r`, `\n`, or `\r\n`).
    #[token("\r\n")]
    #[token("\n")]
    #[token("\r")]
    Eol,
    /// Pseudo variant used when the lexer encounters unsupported input.
    #[default]
    #[regex(r".", priority = 1024)]
    Error,
}

/// Token emitted by the lexer with a byte span back into the source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub span: Range<usize>,
}

pub type TokenBuffer<'a> = HeaplessVec<Token<'a>, MAX_TOKENS>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LexError {
    /// Input produced more tokens than the static buffer allows.
    TooManyTokens { processed: usize },
    /// Underlying lexer reported an unrecoverable error.
    Engine,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::TooManyTokens { processed } => {
                write!(f, "token buffer exhausted after {processed} items")
            }
            LexError::Engine => write!(f, "lexer engine error"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrammarErrorKind<'a> {
    UnexpectedToken {
        expected: &'static str,
        found: Option<TokenKind>,
        span: Range<usize>,
    },
    UnexpectedEnd {
        expected: &'static str,
    },
    InvalidBoolean {
        span: Range<usize>,
        lexeme: &'a str,
    },
    InvalidDuration {
        span: Range<usize>,
    },
    InvalidToken {
        span: Range<usize>,
        lexeme: &'a str,
    },
}

impl fmt::Display for GrammarErrorKind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarErrorKind::UnexpectedToken {
                expected,
                found,
                span,
            } => write!(f, "expected {expected}, found {found:?} at {span:?}"),
            GrammarErrorKind::UnexpectedEnd { expected } => {
                write!(f, "unexpected end of input, expected {expected}")
            }
            GrammarErrorKind::InvalidBoolean { lexeme, .. } => {
                write!(f, "`{lexeme}` is not a boolean")
            }
            GrammarErrorKind::InvalidDuration { span } => {
                write!(f, "invalid duration literal at {span:?}")
            }
            GrammarErrorKind::InvalidToken { span, lexeme } => {
                write!(f, "unsupported token `{lexeme}` at {span:?}")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrammarError<'a> {
    pub kind: GrammarErrorKind<'a>,
}

impl fmt::Display for GrammarError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl<'a> GrammarError<'a> {
    fn unexpected(expected: &'static str, token: Option<&Token<'a>>) -> Self {
        GrammarError {
            kind: match token {
                Some(tok) => GrammarErrorKind::UnexpectedToken {
                    expected,
                    found: Some(tok.kind),
                    span: tok.span.clone(),
                },
                None => GrammarErrorKind::UnexpectedEnd { expected },
            },
        }
    }

    fn invalid_boolean(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidBoolean {
                span: token.span.clone(),
                lexeme: token.lexeme,
            },
        }
    }

    fn invalid_duration(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidDuration {
                span: token.span.clone(),
            },
        }
    }

    fn invalid_token(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidToken {
                span: token.span.clone(),
                lexeme: token.lexeme,
            },
        }
    }
}

type Input<'src, 'slice> = &'slice [Token<'src>];

#[allow(deprecated)]
impl<'src, 'slice> ParserError<Input<'src, 'slice>> for GrammarError<'src>
where
    'src: 'slice,
{
    fn from_error_kind(input: &Input<'src, 'slice>, _kind: ErrorKind) -> Self {
        GrammarError::unexpected("token", input.first())
    }

    fn append(
        self,
        _input: &Input<'src, 'slice>,
        _token_start: &<Input<'src, 'slice> as Stream>::Checkpoint,
        _kind: ErrorKind,
    ) -> Self {
        self
    }

    fn or(self, other: Self) -> Self {
        other
    }
}

/// Combined lex/parse error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError<'a> {
    Lex(LexError),
    Grammar(GrammarError<'a>),
}

impl fmt::Display for ParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Lex(err) => err.fmt(f),
            ParseError::Grammar(err) => err.fmt(f),
        }
    }
}

/// Structured commands produced by the parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    State(StateArg<'a>),
    Power(bool),
    Button(ButtonEvent),
    Status,
    History,
    Help(HelpCommand<'a>),
    Wait(Duration),
}

/// Argument of the `state` command. Mode names are resolved against the ring
/// by the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateArg<'a> {
    Step,
    Reset,
    Resume,
    Mode(&'a str),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelpCommand<'a> {
    pub topic: Option<&'a str>,
}

pub(crate) fn parse_tokens_partial<'src, 'slice>(
    tokens: &'slice [Token<'src>],
) -> Result<(Command<'src>, &'slice [Token<'src>]), GrammarError<'src>>
where
    'src: 'slice,
{
    let mut input = tokens;
    match command().parse_next(&mut input) {
        Ok(cmd) => Ok((cmd, input)),
        Err(ErrMode::Backtrack(err) | ErrMode::Cut(err)) => Err(err),
        Err(ErrMode::Incomplete(_)) => Err(GrammarError::unexpected("token", input.first())),
    }
}

/// Tokenize the provided line.
///
/// # Errors
///
/// Fails when the line produces more than [`MAX_TOKENS`] tokens or the lexer
/// engine gives up.
pub fn lex(line: &str) -> Result<TokenBuffer<'_>, LexError> {
    let compiled = TokenKind::lexer();
    let mut cache: TokenCache<TokenKind, MAX_CACHE_RECORDS> = TokenCache::new();
    let partial = cache
        .rebuild(compiled, line)
        .map_err(map_incremental_error)?;
    let mut buffer = TokenBuffer::new();

    for record in cache.tokens() {
        if record.skipped {
            continue;
        }

        let span = record.start..record.end;
        let lexeme = &line[span.clone()];
        push_token(&mut buffer, record.token, lexeme, span)?;
    }

    if let Some(partial) = partial.filter(|partial| !partial.fragment.is_empty()) {
        let start = partial.start;
        let end = start + partial.fragment.len();
        push_token(&mut buffer, TokenKind::Error, partial.fragment, start..end)?;
    }

    Ok(buffer)
}

fn push_token<'a>(
    buffer: &mut TokenBuffer<'a>,
    kind: TokenKind,
    lexeme: &'a str,
    span: Range<usize>,
) -> Result<(), LexError> {
    buffer
        .push(Token { kind, lexeme, span })
        .map_err(|_| LexError::TooManyTokens {
            processed: buffer.len() + 1,
        })
}

fn map_incremental_error(error: IncrementalError) -> LexError {
    match error {
        IncrementalError::TokenOverflow => LexError::TooManyTokens {
            processed: MAX_TOKENS,
        },
        _ => LexError::Engine,
    }
}

/// Parse a control command from the provided line.
///
/// # Errors
///
/// Returns [`ParseError`] for unsupported characters, unknown keywords,
/// missing or malformed arguments and trailing input.
pub fn parse(line: &str) -> Result<Command<'_>, ParseError<'_>> {
    let tokens = lex(line).map_err(ParseError::Lex)?;

    if let Some(token) = tokens.iter().find(|token| token.kind == TokenKind::Error) {
        return Err(ParseError::Grammar(GrammarError::invalid_token(token)));
    }

    let (command, rest) = parse_tokens_partial(tokens.as_slice()).map_err(ParseError::Grammar)?;

    if let Some(token) = rest.iter().find(|token| token.kind != TokenKind::Eol) {
        return Err(ParseError::Grammar(GrammarError::unexpected(
            "end of command",
            Some(token),
        )));
    }

    Ok(command)
}

fn command<'src, 'slice>() -> impl Parser<Input<'src, 'slice>, Command<'src>, GrammarError<'src>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| {
        let snapshot = *input;
        let command_token = expect_kind(TokenKind::Ident, "command keyword").parse_next(input)?;

        if let Some(spec) = catalog::find(command_token.lexeme) {
            let mut state = CommandState::new(spec.tag);
            parse_node(spec.grammar, input, &mut state)?;
            state.finish()
        } else {
            *input = snapshot;
            Err(ErrMode::Backtrack(GrammarError::unexpected(
                "command keyword",
                Some(&command_token),
            )))
        }
    }
}

fn parse_node<'src, 'slice>(
    node: &'static Node,
    input: &mut Input<'src, 'slice>,
    state: &mut CommandState<'src>,
) -> Result<(), ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    match node {
        Node::End => Ok(()),
        Node::Value { value, next } => {
            let parsed = parse_value(input, *value)?;
            state.apply_value(parsed)?;
            parse_node(next, input, state)
        }
        Node::Choice(choices) => parse_choice(input, choices, state),
        Node::Topic { next } => {
            parse_topic(input, state)?;
            parse_node(next, input, state)
        }
    }
}

fn parse_choice<'src, 'slice>(
    input: &mut Input<'src, 'slice>,
    choices: &'static [ChoiceBranch],
    state: &mut CommandState<'src>,
) -> Result<(), ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    let expected = choice_expected_label(choices);
    match input.split_first() {
        Some((token, rest)) if token.kind == TokenKind::Ident => {
            let Some(branch) = find_choice(choices, token.lexeme) else {
                return Err(ErrMode::Backtrack(GrammarError::unexpected(
                    expected,
                    Some(token),
                )));
            };
            *input = rest;
            state.apply_choice(branch.tag)?;
            parse_node(branch.next, input, state)
        }
        Some((token, _)) if token.kind == TokenKind::Eol => Err(ErrMode::Backtrack(
            GrammarError::unexpected(expected, None),
        )),
        Some((token, _)) => Err(ErrMode::Backtrack(GrammarError::unexpected(
            expected,
            Some(token),
        ))),
        None => Err(ErrMode::Backtrack(GrammarError::unexpected(expected, None))),
    }
}

fn parse_topic<'src, 'slice>(
    input: &mut Input<'src, 'slice>,
    state: &mut CommandState<'src>,
) -> Result<(), ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    match input.split_first() {
        Some((token, rest)) if token.kind == TokenKind::Ident => {
            state.set_topic(token.lexeme);
            *input = rest;
            Ok(())
        }
        Some((token, _)) if token.kind == TokenKind::Eol => Ok(()),
        Some((token, _)) => Err(ErrMode::Backtrack(GrammarError::unexpected(
            "identifier",
            Some(token),
        ))),
        None => Ok(()),
    }
}

fn parse_value<'src, 'slice>(
    input: &mut Input<'src, 'slice>,
    spec: ValueSpec,
) -> Result<Token<'src>, ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    match spec {
        ValueSpec::Word { .. } => match input.split_first() {
            Some((token, rest))
                if matches!(token.kind, TokenKind::Ident | TokenKind::Integer) =>
            {
                *input = rest;
                Ok(token.clone())
            }
            Some((token, _)) if token.kind == TokenKind::Eol => {
                Err(ErrMode::Backtrack(GrammarError::unexpected("value", None)))
            }
            other => Err(ErrMode::Backtrack(GrammarError::unexpected(
                "value",
                other.map(|(token, _)| token),
            ))),
        },
        ValueSpec::Duration => expect_kind(TokenKind::Duration, "duration").parse_next(input),
    }
}

fn find_choice(choices: &'static [ChoiceBranch], lexeme: &str) -> Option<&'static ChoiceBranch> {
    choices
        .iter()
        .find(|choice| choice.keyword.eq_ignore_ascii_case(lexeme))
}

fn choice_expected_label(choices: &'static [ChoiceBranch]) -> &'static str {
    choices.first().map_or("keyword", |choice| choice.keyword)
}

enum CommandState<'a> {
    State { arg: Option<StateArg<'a>> },
    On { value: Option<bool> },
    Button { event: Option<ButtonEvent> },
    Status,
    History,
    Help { topic: Option<&'a str> },
    Wait { duration: Option<Duration> },
}

impl<'a> CommandState<'a> {
    fn new(tag: CommandTag) -> Self {
        match tag {
            CommandTag::State => CommandState::State { arg: None },
            CommandTag::On => CommandState::On { value: None },
            CommandTag::Button => CommandState::Button { event: None },
            CommandTag::Status => CommandState::Status,
            CommandTag::History => CommandState::History,
            CommandTag::Help => CommandState::Help { topic: None },
            CommandTag::Wait => CommandState::Wait { duration: None },
        }
    }

    fn apply_value(&mut self, token: Token<'a>) -> Result<(), ErrMode<GrammarError<'a>>> {
        match self {
            CommandState::State { arg } => {
                *arg = Some(parse_state_arg(token.lexeme));
                Ok(())
            }
            CommandState::On { value } => {
                *value = Some(parse_boolean(&token).map_err(ErrMode::Cut)?);
                Ok(())
            }
            CommandState::Wait { duration } => {
                *duration = Some(parse_duration(&token).map_err(ErrMode::Cut)?);
                Ok(())
            }
            _ => Err(ErrMode::Backtrack(GrammarError::unexpected(
                "end of command",
                Some(&token),
            ))),
        }
    }

    fn apply_choice(&mut self, tag: ChoiceTag) -> Result<(), ErrMode<GrammarError<'a>>> {
        match self {
            CommandState::Button { event } => {
                *event = Some(match tag {
                    ChoiceTag::ButtonShort => ButtonEvent::ShortPress,
                    ChoiceTag::ButtonLong => ButtonEvent::LongPress,
                    ChoiceTag::ButtonHold => ButtonEvent::LongHold,
                });
                Ok(())
            }
            _ => Err(ErrMode::Backtrack(GrammarError::unexpected("choice", None))),
        }
    }

    fn set_topic(&mut self, topic: &'a str) {
        if let CommandState::Help { topic: slot } = self {
            *slot = Some(topic);
        }
    }

    fn finish(self) -> Result<Command<'a>, ErrMode<GrammarError<'a>>> {
        match self {
            CommandState::State { arg: Some(arg) } => Ok(Command::State(arg)),
            CommandState::On { value: Some(value) } => Ok(Command::Power(value)),
            CommandState::Button { event: Some(event) } => Ok(Command::Button(event)),
            CommandState::Status => Ok(Command::Status),
            CommandState::History => Ok(Command::History),
            CommandState::Help { topic } => Ok(Command::Help(HelpCommand { topic })),
            CommandState::Wait {
                duration: Some(duration),
            } => Ok(Command::Wait(duration)),
            CommandState::State { arg: None } => Err(ErrMode::Backtrack(
                GrammarError::unexpected("state argument", None),
            )),
            CommandState::On { value: None } => Err(ErrMode::Backtrack(
                GrammarError::unexpected("boolean", None),
            )),
            CommandState::Button { event: None } => Err(ErrMode::Backtrack(
                GrammarError::unexpected("button event", None),
            )),
            CommandState::Wait { duration: None } => Err(ErrMode::Backtrack(
                GrammarError::unexpected("duration", None),
            )),
        }
    }
}

fn expect_kind<'src, 'slice>(
    kind: TokenKind,
    label: &'static str,
) -> impl Parser<Input<'src, 'slice>, Token<'src>, GrammarError<'src>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| match input.split_first() {
        Some((token, rest)) if token.kind == kind => {
            *input = rest;
            Ok(token.clone())
        }
        Some((token, _)) => Err(ErrMode::Backtrack(GrammarError::unexpected(
            label,
            Some(token),
        ))),
        None => Err(ErrMode::Backtrack(GrammarError::unexpected(label, None))),
    }
}

fn parse_state_arg(lexeme: &str) -> StateArg<'_> {
    match catalog::STATE_ACTIONS
        .iter()
        .position(|action| action.eq_ignore_ascii_case(lexeme))
    {
        Some(0) => StateArg::Step,
        Some(1) => StateArg::Reset,
        Some(_) => StateArg::Resume,
        None => StateArg::Mode(lexeme),
    }
}

fn parse_boolean<'a>(token: &Token<'a>) -> Result<bool, GrammarError<'a>> {
    const TRUTHY: [&str; 3] = ["true", "on", "1"];
    const FALSY: [&str; 3] = ["false", "off", "0"];

    let text = token.lexeme;
    if TRUTHY.iter().any(|word| word.eq_ignore_ascii_case(text)) {
        Ok(true)
    } else if FALSY.iter().any(|word| word.eq_ignore_ascii_case(text)) {
        Ok(false)
    } else {
        Err(GrammarError::invalid_boolean(token))
    }
}

fn parse_duration<'a>(token: &Token<'a>) -> Result<Duration, GrammarError<'a>> {
    let text = token.lexeme;
    if let Some(rest) = text.strip_suffix("ms") {
        let millis = rest
            .parse::<u32>()
            .map_err(|_| GrammarError::invalid_duration(token))?;
        Ok(Duration::from_millis(millis.into()))
    } else if let Some(rest) = text.strip_suffix('s') {
        let seconds = rest
            .parse::<u32>()
            .map_err(|_| GrammarError::invalid_duration(token))?;
        Ok(Duration::from_secs(seconds.into()))
    } else {
        Err(GrammarError::invalid_duration(token))
    }
}
