/// Maximum length in bytes of a single line string.
pub const MAX_LINE_LEN: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Identifier: one line, with blanks and path separators turned into `_`.
    Name,
    /// One line of free text.
    Line,
    /// Non-blank lines joined with CRLF.
    Crlf,
    /// Lines joined with LF, runs of blank lines collapsed into one.
    Paragraph,
}

/// Normalizes a string before it is written into a model.
pub fn sanitize(input: &str, mode: Mode) -> String {
    match mode {
        Mode::Name | Mode::Line => {
            let line = input.trim_start().split(['\r', '\n']).next().unwrap_or("");
            let line = line.trim_end();
            let out: String = if mode == Mode::Name {
                line.chars()
                    .map(|c| match c {
                        ' ' | '\t' | '/' | '\\' => '_',
                        c => c,
                    })
                    .collect()
            } else {
                line.to_string()
            };
            truncate(out, MAX_LINE_LEN)
        }
        Mode::Crlf => input
            .lines()
            .map(|l| l.trim_end_matches('\r').trim())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\r\n"),
        Mode::Paragraph => {
            let mut out = String::new();
            let mut blank_run = false;
            for line in input.trim().lines().map(|l| l.trim_end_matches('\r').trim_end()) {
                if line.trim().is_empty() {
                    blank_run = true;
                    continue;
                }
                if !out.is_empty() {
                    out.push('\n');
                    if blank_run {
                        out.push('\n');
                    }
                }
                blank_run = false;
                out.push_str(line);
            }
            out
        }
    }
}

fn truncate(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_lose_separators() {
        assert_eq!(sanitize("  my mat/red\\x\tq  ", Mode::Name), "my_mat_red_x_q");
        assert_eq!(sanitize("first\nsecond", Mode::Name), "first");
        assert_eq!(sanitize("", Mode::Name), "");
    }

    #[test]
    fn line_keeps_spaces() {
        assert_eq!(sanitize(" CC BY 4.0\r\n", Mode::Line), "CC BY 4.0");
    }

    #[test]
    fn long_lines_are_capped() {
        let long = "é".repeat(200);
        let out = sanitize(&long, Mode::Line);
        assert!(out.len() <= MAX_LINE_LEN);
        assert_eq!(out.len(), 256);
    }

    #[test]
    fn multi_line_modes() {
        let text = "one\r\n\r\n\r\n two\n\nthree\n";
        assert_eq!(sanitize(text, Mode::Crlf), "one\r\ntwo\r\nthree");
        assert_eq!(sanitize(text, Mode::Paragraph), "one\n\n two\n\nthree");
    }
}
