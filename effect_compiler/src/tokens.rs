//! A minimal GLSL token stream.
//!
//! The compiler passes are text rewrites rather than AST transforms.
//! Tokens only record byte ranges into the source,
//! so passes can splice the original text without reformatting it.
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Number,
    /// A single punctuation character like `{` or `=`.
    Punct,
    /// A full preprocessor line including any `\` continuations.
    Preprocessor,
    Comment,
    Whitespace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub beg: usize,
    pub end: usize,
}

impl Token {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.beg..self.end]
    }

    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Comment | TokenKind::Whitespace)
    }

    pub fn is_punct(&self, source: &str, c: char) -> bool {
        self.kind == TokenKind::Punct && source[self.beg..].starts_with(c)
    }

    pub fn is_ident(&self, source: &str, name: &str) -> bool {
        self.kind == TokenKind::Identifier && self.text(source) == name
    }
}

pub fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

pub fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub fn tokenize(source: &str) -> Vec<Token> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    // Preprocessor directives only start a line.
    let mut line_start = true;

    while i < bytes.len() {
        let c = bytes[i] as char;
        let beg = i;

        let kind = if c.is_ascii_whitespace() {
            while i < bytes.len() && (bytes[i] as char).is_ascii_whitespace() {
                if bytes[i] == b'\n' {
                    line_start = true;
                }
                i += 1;
            }
            TokenKind::Whitespace
        } else if source[i..].starts_with("//") {
            i = source[i..].find('\n').map(|n| i + n).unwrap_or(bytes.len());
            TokenKind::Comment
        } else if source[i..].starts_with("/*") {
            i = source[i + 2..]
                .find("*/")
                .map(|n| i + 2 + n + 2)
                .unwrap_or(bytes.len());
            TokenKind::Comment
        } else if c == '#' && line_start {
            i = preprocessor_line_end(source, i);
            TokenKind::Preprocessor
        } else if is_ident_start(c) {
            while i < bytes.len() && is_ident_char(bytes[i] as char) {
                i += 1;
            }
            TokenKind::Identifier
        } else if c.is_ascii_digit()
            || (c == '.' && bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit()))
        {
            i += 1;
            while i < bytes.len() {
                let n = bytes[i] as char;
                if is_ident_char(n) || n == '.' {
                    i += 1;
                } else if (n == '+' || n == '-') && matches!(bytes[i - 1], b'e' | b'E') {
                    i += 1;
                } else {
                    break;
                }
            }
            TokenKind::Number
        } else {
            i += source[i..].chars().next().map(char::len_utf8).unwrap_or(1);
            TokenKind::Punct
        };

        if kind != TokenKind::Whitespace && kind != TokenKind::Comment {
            line_start = false;
        }
        tokens.push(Token { kind, beg, end: i });
    }

    tokens
}

fn preprocessor_line_end(source: &str, start: usize) -> usize {
    let mut i = start;
    loop {
        match source[i..].find('\n') {
            Some(n) => {
                let end = i + n;
                if source[..end].trim_end_matches('\r').ends_with('\\') {
                    i = end + 1;
                } else {
                    return end;
                }
            }
            None => return source.len(),
        }
    }
}

/// The significant tokens of a source string.
///
/// Whitespace and comments are skipped.
/// Preprocessor lines are kept like any other token.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    source: &'a str,
    tokens: Vec<Token>,
}

impl<'a> Cursor<'a> {
    pub fn new(source: &'a str) -> Self {
        let tokens = tokenize(source).into_iter().filter(|t| !t.is_trivia()).collect();
        Self { source, tokens }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn text(&self, token: Token) -> &'a str {
        token.text(self.source)
    }

    /// Return the index of the token closing the bracket at `open`.
    pub fn matching_close(&self, open: usize) -> Option<usize> {
        let (open_char, close_char) = match self.tokens.get(open)?.text(self.source) {
            "(" => ('(', ')'),
            "[" => ('[', ']'),
            "{" => ('{', '}'),
            _ => return None,
        };
        let mut depth = 0usize;
        for (i, t) in self.tokens.iter().enumerate().skip(open) {
            if t.is_punct(self.source, open_char) {
                depth += 1;
            } else if t.is_punct(self.source, close_char) {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
        }
        None
    }
}

/// Byte offsets of whole word occurrences of `word` in `text`.
pub fn word_offsets<'a>(text: &'a str, word: &'a str) -> impl Iterator<Item = usize> + 'a {
    text.match_indices(word).filter_map(move |(i, _)| {
        let before = text[..i].chars().next_back();
        let after = text[i + word.len()..].chars().next();
        let bounded = !before.is_some_and(is_ident_char) && !after.is_some_and(is_ident_char);
        bounded.then_some(i)
    })
}

pub fn contains_word(text: &str, word: &str) -> bool {
    word_offsets(text, word).next().is_some()
}

pub fn count_word(text: &str, word: &str) -> usize {
    word_offsets(text, word).count()
}

/// Replace whole word occurrences of `word` with `replacement`.
pub fn replace_word(text: &str, word: &str, replacement: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut last = 0;
    for i in word_offsets(text, word) {
        output += &text[last..i];
        output += replacement;
        last = i + word.len();
    }
    output += &text[last..];
    output
}

/// Replace non overlapping byte ranges of `text`.
pub fn replace_ranges(text: &str, mut edits: Vec<(Range<usize>, String)>) -> String {
    edits.sort_by_key(|(range, _)| range.start);
    let mut output = String::with_capacity(text.len());
    let mut last = 0;
    for (range, replacement) in edits {
        output += &text[last..range.start];
        output += &replacement;
        last = range.end;
    }
    output += &text[last..];
    output
}

/// Replace comments with whitespace while keeping line numbers intact.
pub fn strip_comments(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    for token in tokenize(text) {
        let token_text = token.text(text);
        if token.kind == TokenKind::Comment {
            output.extend(token_text.chars().filter(|c| *c == '\n'));
        } else {
            output += token_text;
        }
    }
    output
}

/// Split `args` on top level commas while respecting nested brackets.
pub fn split_args(args: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut last = 0;
    for (i, c) in args.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(args[last..i].trim());
                last = i + 1;
            }
            _ => (),
        }
    }
    let tail = args[last..].trim();
    if !tail.is_empty() || !parts.is_empty() {
        parts.push(tail);
    }
    parts
}

/// The 1-based line number of a byte offset.
pub fn line_of(text: &str, offset: usize) -> usize {
    text[..offset.min(text.len())].matches('\n').count() + 1
}

/// The leading whitespace of the line containing `offset`.
pub fn line_indent(text: &str, offset: usize) -> &str {
    let start = text[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line = &text[start..];
    &line[..line.len() - line.trim_start_matches([' ', '\t']).len()]
}

/// The directive name and remaining text of a preprocessor line like `#pragma rate x pass`.
pub fn directive(line: &str) -> Option<(&str, &str)> {
    let rest = line.trim_start().strip_prefix('#')?.trim_start();
    let end = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
    Some((&rest[..end], rest[end..].trim()))
}

/// The pragma name and arguments of a line like `#pragma rate x pass`.
pub fn pragma(line: &str) -> Option<(&str, &str)> {
    match directive(line)? {
        ("pragma", rest) => {
            let end = rest
                .find(|c: char| !(is_ident_char(c) || c == '-'))
                .unwrap_or(rest.len());
            Some((&rest[..end], rest[end..].trim()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> Vec<(TokenKind, &str)> {
        tokenize(source)
            .into_iter()
            .filter(|t| !t.is_trivia())
            .map(|t| (t.kind, t.text(source)))
            .collect()
    }

    #[test]
    fn tokenize_declaration() {
        assert_eq!(
            vec![
                (TokenKind::Identifier, "uniform"),
                (TokenKind::Identifier, "vec4"),
                (TokenKind::Identifier, "a"),
                (TokenKind::Punct, "["),
                (TokenKind::Number, "2"),
                (TokenKind::Punct, "]"),
                (TokenKind::Punct, ";"),
            ],
            kinds("uniform vec4 a[2]; // comment")
        );
    }

    #[test]
    fn tokenize_preprocessor_lines() {
        let source = indoc! {"
            #define A \\
              1
            float x = 1.5e-3; # not a directive
        "};
        let tokens = kinds(source);
        assert_eq!((TokenKind::Preprocessor, "#define A \\\n  1"), tokens[0]);
        assert_eq!((TokenKind::Number, "1.5e-3"), tokens[4]);
        assert_eq!((TokenKind::Punct, "#"), tokens[6]);
    }

    #[test]
    fn replace_whole_words() {
        assert_eq!("B + AB + B.x", replace_word("A + AB + A.x", "A", "B"));
        assert_eq!(2, count_word("a a_b a", "a"));
    }

    #[test]
    fn strip_comments_keeps_lines() {
        assert_eq!("a\n\nb \n", strip_comments("a\n/* x\n*/b // c\n"));
    }

    #[test]
    fn split_nested_args() {
        assert_eq!(vec!["a", "f(b, c)", "d[1, 2]"], split_args("a, f(b, c), d[1, 2]"));
        assert!(split_args("  ").is_empty());
    }

    #[test]
    fn find_matching_brace() {
        let cursor = Cursor::new("void f() { if (a) { b(); } }");
        assert_eq!(Some(15), cursor.matching_close(4));
        assert_eq!(Some(3), cursor.matching_close(2));
        assert_eq!(None, cursor.matching_close(5));
    }

    #[test]
    fn parse_pragma_lines() {
        assert_eq!(Some(("rate", "a pass")), pragma("  #pragma rate a pass"));
        assert_eq!(
            Some(("unfilterable-float", "tex")),
            pragma("#pragma unfilterable-float tex")
        );
        assert_eq!(None, pragma("#define A 1"));
    }
}
