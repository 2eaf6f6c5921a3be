//! nginx access-log field splitting
//!
//! Fields are separated by single spaces, with two exceptions: a quoted span
//! is one field (quotes included), and a space next to a `:` does not split,
//! since nginx joins some values with `: `.

/// Byte classes the splitter reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteClass {
    Quote,
    Space,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Bare,
    Quoted,
}

/// What to do with the byte under the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Continue,
    OpenQuote,
    /// Emit the field ending before this byte; the byte is the separator.
    SplitHere,
    /// Emit the field ending with this quote and skip the byte after it.
    CloseQuote,
}

const fn classify(byte: u8) -> ByteClass {
    match byte {
        b'"' => ByteClass::Quote,
        b' ' => ByteClass::Space,
        _ => ByteClass::Other,
    }
}

/// Transition table indexed by `[state][class]`.
const TRANSITIONS: [[Action; 3]; 2] = [
    // Bare: Quote, Space, Other
    [Action::OpenQuote, Action::SplitHere, Action::Continue],
    // Quoted: Quote, Space, Other
    [Action::CloseQuote, Action::Continue, Action::Continue],
];

fn transition(state: State, class: ByteClass) -> Action {
    let row = match state {
        State::Bare => 0,
        State::Quoted => 1,
    };
    let col = match class {
        ByteClass::Quote => 0,
        ByteClass::Space => 1,
        ByteClass::Other => 2,
    };
    TRANSITIONS[row][col]
}

/// Reusable splitter; keeps its span storage between lines.
#[derive(Debug, Default)]
pub struct LineTokenizer {
    spans: Vec<(usize, usize)>,
}

impl LineTokenizer {
    pub fn new() -> Self {
        Self {
            spans: Vec::with_capacity(32),
        }
    }

    /// Split `line` into fields. A trailing field that is not followed by a
    /// separator is not emitted.
    pub fn split<'a>(&'a mut self, line: &'a [u8]) -> Fields<'a> {
        self.spans.clear();
        let mut state = State::Bare;
        let mut start = 0;
        let mut i = 0;
        while i < line.len() {
            match transition(state, classify(line[i])) {
                Action::Continue => {}
                Action::OpenQuote => state = State::Quoted,
                Action::SplitHere => {
                    let before = i.checked_sub(1).map(|j| line[j]);
                    let after = line.get(i + 1).copied();
                    if before != Some(b':') && after != Some(b':') {
                        self.spans.push((start, i));
                        start = i + 1;
                    }
                }
                Action::CloseQuote => {
                    state = State::Bare;
                    self.spans.push((start, i + 1));
                    i += 1;
                    start = i + 1;
                }
            }
            i += 1;
        }
        Fields {
            line,
            spans: &self.spans,
        }
    }
}

/// Borrowed view of one split line.
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a> {
    line: &'a [u8],
    spans: &'a [(usize, usize)],
}

impl<'a> Fields<'a> {
    /// Field `index`, if present.
    pub fn get(&self, index: usize) -> Option<&'a [u8]> {
        self.spans
            .get(index)
            .map(|&(start, end)| &self.line[start..end.min(self.line.len())])
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// The whole line the fields were split from.
    pub fn line(&self) -> &'a [u8] {
        self.line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(line: &[u8]) -> Vec<String> {
        let mut tokenizer = LineTokenizer::new();
        let fields = tokenizer.split(line);
        (0..fields.len())
            .map(|i| String::from_utf8_lossy(fields.get(i).unwrap()).into_owned())
            .collect()
    }

    #[test]
    fn test_quoted_span_is_one_field() {
        let fields = collect(b"1.2.3.4 - - \"GET /a b HTTP/1.1\" 200 end");
        assert_eq!(
            fields,
            vec!["1.2.3.4", "-", "-", "\"GET /a b HTTP/1.1\"", "200"]
        );
    }

    #[test]
    fn test_space_next_to_colon_does_not_split() {
        let fields = collect(b"a b: c d :e f ");
        assert_eq!(fields, vec!["a", "b: c", "d :e", "f"]);
    }

    #[test]
    fn test_trailing_field_without_separator_is_dropped() {
        assert_eq!(collect(b"a b c"), vec!["a", "b"]);
        assert!(collect(b"single").is_empty());
    }

    #[test]
    fn test_closing_quote_at_end_of_line() {
        assert_eq!(collect(b"a \"b c\""), vec!["a", "\"b c\""]);
    }

    #[test]
    fn test_tokenizer_is_reusable() {
        let mut tokenizer = LineTokenizer::new();
        assert_eq!(tokenizer.split(b"a b c d ").len(), 4);
        let fields = tokenizer.split(b"x y ");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get(1), Some(&b"y"[..]));
        assert_eq!(fields.get(2), None);
    }
}
