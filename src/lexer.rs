//! Lexical analysis: splits one raw input line into word and operator tokens
//! according to the shell quoting rules.

use std::fmt;

/// Redirection and pipe operators recognized by the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `|`
    Pipe,
    /// `>`
    Out,
    /// `1>`
    OutFd,
    /// `2>`
    Err,
    /// `>>`
    OutAppend,
    /// `1>>`
    OutFdAppend,
    /// `2>>`
    ErrAppend,
}

impl Operator {
    /// Classify a fully tokenized word. Callers must only pass words that
    /// contained no quoting or escaping; a quoted `">"` stays a literal word.
    pub fn from_word(word: &str) -> Option<Operator> {
        match word {
            "|" => Some(Operator::Pipe),
            ">" => Some(Operator::Out),
            "1>" => Some(Operator::OutFd),
            "2>" => Some(Operator::Err),
            ">>" => Some(Operator::OutAppend),
            "1>>" => Some(Operator::OutFdAppend),
            "2>>" => Some(Operator::ErrAppend),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Pipe => "|",
            Operator::Out => ">",
            Operator::OutFd => "1>",
            Operator::Err => "2>",
            Operator::OutAppend => ">>",
            Operator::OutFdAppend => "1>>",
            Operator::ErrAppend => "2>>",
        }
    }
}

/// A token produced by [`tokenize`]: either a word with quotes removed, or
/// one of the recognized operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(String),
    Op(Operator),
}

/// Errors that can occur during tokenization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexError {
    /// Reached end of line inside an open quote region.
    UnterminatedQuote,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::UnterminatedQuote => write!(f, "syntax error: unterminated quote"),
        }
    }
}

impl std::error::Error for LexError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Word,
    SingleQuote,
    DoubleQuote,
}

struct Lexer {
    input: Vec<char>,
    pos: usize,
    state: State,
    buffer: String,
    /// A word is in progress, even if `buffer` is still empty (e.g. `''`).
    in_word: bool,
    /// Any part of the current word was quoted or escaped.
    quoted: bool,
}

impl Lexer {
    fn new(line: &str) -> Self {
        Lexer {
            input: line.chars().collect(),
            pos: 0,
            state: State::Start,
            buffer: String::new(),
            in_word: false,
            quoted: false,
        }
    }

    fn make_tokens(mut self) -> Result<Vec<Token>, LexError> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            match self.state {
                State::Start => self.handle_start(ch),
                State::Word => self.handle_word(ch, &mut out),
                State::SingleQuote => self.handle_single_quote(ch),
                State::DoubleQuote => self.handle_double_quote(ch),
            }
        }

        match self.state {
            State::SingleQuote | State::DoubleQuote => return Err(LexError::UnterminatedQuote),
            _ => {}
        }

        self.finish_word(&mut out);
        Ok(out)
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn handle_start(&mut self, ch: char) {
        match ch {
            ' ' | '\t' => {}
            '\'' => {
                self.in_word = true;
                self.quoted = true;
                self.state = State::SingleQuote;
            }
            '"' => {
                self.in_word = true;
                self.quoted = true;
                self.state = State::DoubleQuote;
            }
            '\\' => {
                self.in_word = true;
                self.quoted = true;
                self.escape_next();
                self.state = State::Word;
            }
            c => {
                self.in_word = true;
                self.buffer.push(c);
                self.state = State::Word;
            }
        }
    }

    fn handle_word(&mut self, ch: char, out: &mut Vec<Token>) {
        match ch {
            ' ' | '\t' => {
                self.finish_word(out);
                self.state = State::Start;
            }
            '\'' => {
                self.quoted = true;
                self.state = State::SingleQuote;
            }
            '"' => {
                self.quoted = true;
                self.state = State::DoubleQuote;
            }
            '\\' => {
                self.quoted = true;
                self.escape_next();
            }
            c => self.buffer.push(c),
        }
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => self.state = State::Word,
            c => self.buffer.push(c),
        }
    }

    fn handle_double_quote(&mut self, ch: char) {
        match ch {
            '"' => self.state = State::Word,
            // Inside double quotes backslash only escapes itself and the
            // closing quote; before anything else it stays literal.
            '\\' => match self.peek_char() {
                Some(escaped @ ('\\' | '"')) => {
                    self.pos += 1;
                    self.buffer.push(escaped);
                }
                _ => self.buffer.push('\\'),
            },
            c => self.buffer.push(c),
        }
    }

    /// Outside quotes a backslash makes the next character literal,
    /// whitespace and quote characters included. A trailing backslash with
    /// nothing after it is kept as a literal backslash.
    fn escape_next(&mut self) {
        match self.read_char() {
            Some(next) => self.buffer.push(next),
            None => self.buffer.push('\\'),
        }
    }

    fn finish_word(&mut self, out: &mut Vec<Token>) {
        if !self.in_word {
            return;
        }
        let word = std::mem::take(&mut self.buffer);
        let token = if self.quoted {
            Token::Word(word)
        } else {
            match Operator::from_word(&word) {
                Some(op) => Token::Op(op),
                None => Token::Word(word),
            }
        };
        out.push(token);
        self.in_word = false;
        self.quoted = false;
    }
}

/// Split one input line into tokens.
///
/// Whitespace separates words outside quotes. Single quotes make everything
/// literal; double quotes make everything literal except `\\` and `\"`;
/// a bare backslash escapes the next character. A quote region may begin
/// mid-word, so `ab"cd"ef` is one word `abcdef`.
pub fn tokenize(line: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(line).make_tokens()
}
