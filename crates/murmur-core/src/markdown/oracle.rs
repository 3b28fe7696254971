//! Math/Code Safety Oracle
//!
//! Decides whether a piece of text, taken as a complete document, still has
//! an unterminated construct in it: an open code fence, an odd number of
//! math delimiters, a `\begin{..}` without its `\end{..}`, or a LaTeX
//! command whose brace argument has not closed yet.
//!
//! The oracle is conservative. Reporting "unsafe" for finished text only
//! delays rendering; reporting "safe" for unfinished text would freeze broken
//! markup, so every ambiguous case resolves to unsafe.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

/// `\begin{name}` with a complete name
static BEGIN_ENV: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\begin\{([^{}\n]*)\}").expect("valid begin regex"));

/// `\end{name}` with a complete name
static END_ENV: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\end\{([^{}\n]*)\}").expect("valid end regex"));

/// LaTeX commands taking a brace argument: `\frac{`, `\sqrt{`, `\sum_{`,
/// `\int_{`, `\lim_{`, `\mathbf{`, `\x^{`...
static BRACE_COMMAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\[A-Za-z]+[_^]?\{").expect("valid command regex"));

/// Returns true only if `text` contains no unterminated construct
pub fn is_safe_boundary(text: &str) -> bool {
    if text.trim().is_empty() {
        return true;
    }
    let mut scan = SafetyScan::default();
    scan.push_str(text);
    match scan.open_construct() {
        Some(reason) => {
            tracing::trace!("oracle: {}", reason);
            false
        }
        None => true,
    }
}

/// Safety state of a growing prefix, fed one line at a time.
///
/// Every counter is additive over lines, so checking a prefix after each
/// line costs the length of that line only.
#[derive(Debug, Default, Clone)]
pub(crate) struct SafetyScan {
    in_fence: bool,
    display: usize,
    inline: usize,
    open_square: usize,
    close_square: usize,
    open_paren: usize,
    close_paren: usize,
    /// A `\begin{` whose name has not arrived yet
    partial_begin: bool,
    environments: HashMap<String, usize>,
    /// Running `{` minus `}` balance of the prose
    balance: i64,
    /// Lowest balance seen right before a brace-argument command
    command_floor: Option<i64>,
    open_code_span: bool,
    trailing_escape: bool,
}

impl SafetyScan {
    pub(crate) fn push_str(&mut self, text: &str) {
        for line in text.split_inclusive('\n') {
            self.push_line(line);
        }
    }

    /// Feed one line, with or without its terminating newline
    pub(crate) fn push_line(&mut self, line: &str) {
        self.trailing_escape = false;
        if is_fence_line(line) {
            self.in_fence = !self.in_fence;
            return;
        }
        if self.in_fence {
            return;
        }
        if line.trim().is_empty() {
            // A code span never crosses a paragraph break.
            self.open_code_span = false;
            return;
        }

        // Closed code never contributes math delimiters.
        let mut prose = String::with_capacity(line.len());
        if !strip_inline_code(line, &mut prose) {
            self.open_code_span = true;
        }

        self.display += count_display_delimiters(&prose);
        self.inline += count_inline_delimiters(&prose);
        self.open_square += prose.matches("\\[").count();
        self.close_square += prose.matches("\\]").count();
        self.open_paren += prose.matches("\\(").count();
        self.close_paren += prose.matches("\\)").count();
        self.scan_environments(&prose);
        self.scan_braces(&prose);
        self.trailing_escape = is_escaped(prose.as_bytes(), prose.len());
    }

    pub(crate) fn is_safe(&self) -> bool {
        self.open_construct().is_none()
    }

    /// The first unterminated construct found, if any
    pub(crate) fn open_construct(&self) -> Option<&'static str> {
        if self.in_fence {
            return Some("open code fence");
        }
        if self.open_code_span {
            return Some("open code span");
        }
        if self.trailing_escape {
            return Some("trailing backslash");
        }
        if self.display % 2 == 1 {
            return Some("open display math");
        }
        if self.inline % 2 == 1 {
            return Some("open inline math");
        }
        if self.open_square > self.close_square || self.open_paren > self.close_paren {
            return Some("open \\[ or \\( math");
        }
        if self.partial_begin || self.environments.values().any(|depth| *depth > 0) {
            return Some("unmatched \\begin");
        }
        if self.command_floor.is_some_and(|floor| self.balance > floor) {
            return Some("unbalanced command argument");
        }
        None
    }

    fn scan_environments(&mut self, prose: &str) {
        if prose.matches("\\begin{").count() > BEGIN_ENV.find_iter(prose).count() {
            self.partial_begin = true;
        }

        let mut events: Vec<(usize, bool, &str)> = Vec::new();
        for caps in BEGIN_ENV.captures_iter(prose) {
            if let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) {
                events.push((whole.start(), true, name.as_str()));
            }
        }
        for caps in END_ENV.captures_iter(prose) {
            if let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) {
                events.push((whole.start(), false, name.as_str()));
            }
        }
        events.sort_by_key(|(pos, _, _)| *pos);

        for (_, is_begin, name) in events {
            if is_begin {
                *self.environments.entry(name.to_string()).or_insert(0) += 1;
            } else if let Some(depth) = self.environments.get_mut(name) {
                *depth = depth.saturating_sub(1);
            }
        }
    }

    /// A command's argument is open while the balance stays above the
    /// balance just before the command
    fn scan_braces(&mut self, prose: &str) {
        let mut starts = BRACE_COMMAND.find_iter(prose).map(|m| m.start()).peekable();
        for (i, byte) in prose.bytes().enumerate() {
            if starts.peek() == Some(&i) {
                starts.next();
                let floor = self.command_floor.map_or(self.balance, |f| f.min(self.balance));
                self.command_floor = Some(floor);
            }
            match byte {
                b'{' => self.balance += 1,
                b'}' => self.balance -= 1,
                _ => {}
            }
        }
    }
}

/// Whether a line opens or closes a fenced code block
pub(crate) fn is_fence_line(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

/// Number of lines whose trimmed content starts with three backticks
pub(crate) fn count_fence_lines(text: &str) -> usize {
    text.lines().filter(|line| is_fence_line(line)).count()
}

/// Non-overlapping, unescaped `$$` delimiters
pub(crate) fn count_display_delimiters(text: &str) -> usize {
    let bytes = text.as_bytes();
    let mut count = 0;
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'$' && bytes[i + 1] == b'$' && !is_escaped(bytes, i) {
            count += 1;
            i += 2;
        } else {
            i += 1;
        }
    }
    count
}

/// Unescaped single `$` delimiters that are not part of a `$$` pair
pub(crate) fn count_inline_delimiters(text: &str) -> usize {
    let bytes = text.as_bytes();
    let mut count = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' || is_escaped(bytes, i) {
            i += 1;
            continue;
        }
        if i + 1 < bytes.len() && bytes[i + 1] == b'$' {
            i += 2;
            continue;
        }
        count += 1;
        i += 1;
    }
    count
}

/// A byte is escaped when preceded by an odd run of backslashes. At
/// `bytes.len()` this tells whether the text ends in a dangling escape.
fn is_escaped(bytes: &[u8], index: usize) -> bool {
    let mut backslashes = 0;
    let mut j = index;
    while j > 0 && bytes[j - 1] == b'\\' {
        backslashes += 1;
        j -= 1;
    }
    backslashes % 2 == 1
}

/// Copy `line` into `out` without its closed backtick spans. Returns false
/// when a backtick run is left unclosed.
fn strip_inline_code(line: &str, out: &mut String) -> bool {
    let mut closed = true;
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '`' {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        let run_start = i;
        while i < chars.len() && chars[i] == '`' {
            i += 1;
        }
        let run_len = i - run_start;

        match find_closing_run(&chars, i, run_len) {
            Some(close_end) => i = close_end,
            None => {
                // Unclosed span: keep the backticks literally.
                out.extend(&chars[run_start..i]);
                closed = false;
            }
        }
    }
    closed
}

/// Index just past a backtick run of exactly `len` starting at or after `from`
pub(crate) fn find_closing_run(chars: &[char], from: usize, len: usize) -> Option<usize> {
    let mut i = from;
    while i < chars.len() {
        if chars[i] == '`' {
            let start = i;
            while i < chars.len() && chars[i] == '`' {
                i += 1;
            }
            if i - start == len {
                return Some(i);
            }
        } else {
            i += 1;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_whitespace_are_safe() {
        assert!(is_safe_boundary(""));
        assert!(is_safe_boundary("   \n\t\n"));
    }

    #[test]
    fn test_open_fence_is_unsafe() {
        assert!(!is_safe_boundary("Here:\n```rust\nfn main() {"));
        assert!(is_safe_boundary("Here:\n```rust\nfn main() {}\n```\n"));
        assert!(!is_safe_boundary("a\n  ```\nb\n```\n```"));
    }

    #[test]
    fn test_inline_math_parity() {
        assert!(!is_safe_boundary("The answer is $x = "));
        assert!(is_safe_boundary("The answer is $x = 5$."));
        assert!(is_safe_boundary("Escaped \\$5 is just money"));
    }

    #[test]
    fn test_display_math_parity() {
        assert!(!is_safe_boundary("$$\n\\int_0^1 x\\,dx"));
        assert!(is_safe_boundary("$$\n\\int_0^1 x\\,dx\n$$"));
        // `$$` pairs never count as inline delimiters
        assert_eq!(count_inline_delimiters("$$a$$ and $b$"), 2);
        assert_eq!(count_display_delimiters("$$a$$ and $b$"), 2);
    }

    #[test]
    fn test_dollars_inside_code_are_ignored() {
        assert!(is_safe_boundary("Run `echo $HOME` now."));
        assert!(is_safe_boundary("```sh\necho $PATH\n```\nDone."));
    }

    #[test]
    fn test_environments() {
        assert!(!is_safe_boundary("\\begin{align} a &= b"));
        assert!(!is_safe_boundary("\\begin{ali"));
        assert!(is_safe_boundary("\\begin{align} a &= b \\end{align}"));
        assert!(!is_safe_boundary(
            "\\begin{cases} 1 \\end{cases} \\begin{matrix} 2"
        ));
        assert!(!is_safe_boundary("\\begin{align} x \\end{matrix}"));
    }

    #[test]
    fn test_brace_commands() {
        assert!(!is_safe_boundary("\\frac{a}{b"));
        assert!(!is_safe_boundary("\\sqrt{x"));
        assert!(!is_safe_boundary("\\sum_{i=1"));
        assert!(is_safe_boundary("\\frac{a}{b} and \\sqrt{2}"));
    }

    #[test]
    fn test_bracket_math() {
        assert!(!is_safe_boundary("so \\[ x^2"));
        assert!(is_safe_boundary("so \\[ x^2 \\] holds"));
    }

    #[test]
    fn test_dangling_escape_and_open_code_span_are_unsafe() {
        assert!(!is_safe_boundary("Price \\"));
        assert!(!is_safe_boundary("Price \\\\\\"));
        assert!(is_safe_boundary("Row \\\\"));
        assert!(is_safe_boundary("Line ends \\\nnext"));
        assert!(!is_safe_boundary("a `"));
        assert!(!is_safe_boundary("run ``cargo"));
        assert!(is_safe_boundary("run ``a ` b`` now"));
        assert!(is_safe_boundary("stray ` tick\n\nnext paragraph"));
    }

    #[test]
    fn test_scan_matches_whole_text_check_at_every_line() {
        let text = "Intro with $a$ and `x $ y`.\n\
                    ```sh\necho $HOME\n```\n\
                    \\begin{align}\na &= \\frac{1}{2\n\
                    } \\\\\n\\end{align}\n\
                    Then $$b$$ and \\[c\n\\] done.\n\
                    Open $x = \n\
                    5$ closed.\n";
        let mut scan = SafetyScan::default();
        let mut end = 0;
        for line in text.split_inclusive('\n') {
            scan.push_line(line);
            end += line.len();
            assert_eq!(scan.is_safe(), is_safe_boundary(&text[..end]), "{:?}", &text[..end]);
        }
        assert!(scan.is_safe());
    }

    #[test]
    fn test_appending_complete_constructs_keeps_safety() {
        let bases = [
            "Plain prose.",
            "A list:\n- one\n- two\n",
            "Code:\n```\nx\n```\n",
            "Math $a$ and $$b$$.",
            "Escaped pair \\\\",
            "Closed `code` span",
        ];
        let completes = [
            "$x^2$",
            "$$\\frac{1}{2}$$",
            "\n```python\nprint(1)\n```\n",
            "\\begin{align}a\\end{align}",
            "`code $ span`",
        ];
        for base in bases {
            assert!(is_safe_boundary(base), "{base:?}");
            for complete in completes {
                let joined = format!("{base}{complete}");
                assert!(is_safe_boundary(&joined), "{joined:?}");
            }
        }
    }
}
