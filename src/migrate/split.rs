/// Split a SQL script into statements at top-level `;`.
///
/// Semicolons inside quoted strings, backtick identifiers, `--`/`#` line
/// comments and `/* */` blocks do not split. Fragments that hold only
/// whitespace and comments are dropped.
pub fn split_statements(sql: &str) -> Vec<String> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        Quoted(char),
        LineComment,
        BlockComment,
    }

    let mut out = Vec::new();
    let mut current = String::new();
    // code characters seen in `current`, comments excluded
    let mut has_code = false;
    let mut state = State::Code;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                ';' => {
                    if has_code {
                        out.push(current.trim().to_string());
                    }
                    current.clear();
                    has_code = false;
                    continue;
                }
                '\'' | '"' | '`' => {
                    state = State::Quoted(c);
                    has_code = true;
                }
                '#' => state = State::LineComment,
                '-' if chars.peek() == Some(&'-') => state = State::LineComment,
                '/' if chars.peek() == Some(&'*') => {
                    current.push(c);
                    if let Some(star) = chars.next() {
                        current.push(star);
                    }
                    state = State::BlockComment;
                    continue;
                }
                c if !c.is_whitespace() => has_code = true,
                _ => {}
            },
            State::Quoted(q) => {
                if c == '\\' && q != '`' {
                    current.push(c);
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                    continue;
                }
                if c == q {
                    // doubled quote is an escaped quote
                    if chars.peek() == Some(&q) {
                        current.push(c);
                        if let Some(next) = chars.next() {
                            current.push(next);
                        }
                        continue;
                    }
                    state = State::Code;
                }
            }
            State::LineComment => {
                if c == '\n' {
                    state = State::Code;
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    current.push(c);
                    if let Some(slash) = chars.next() {
                        current.push(slash);
                    }
                    state = State::Code;
                    continue;
                }
            }
        }
        current.push(c);
    }

    if has_code {
        out.push(current.trim().to_string());
    }
    out
}

/// First keyword of a statement, upper-cased, skipping leading comments.
pub fn leading_keyword(stmt: &str) -> String {
    let mut rest = stmt.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--").or_else(|| rest.strip_prefix('#')) {
            rest = after.split_once('\n').map(|(_, r)| r).unwrap_or("").trim_start();
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map(|(_, r)| r).unwrap_or("").trim_start();
        } else {
            break;
        }
    }
    rest.split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or("")
        .to_ascii_uppercase()
}

/// DDL statements fail as schema errors; everything else as query errors.
pub fn is_ddl(stmt: &str) -> bool {
    matches!(
        leading_keyword(stmt).as_str(),
        "CREATE" | "ALTER" | "DROP" | "RENAME" | "TRUNCATE"
    )
}

/// `ALTER TABLE` with more than one comma-separated clause.
///
/// MySQL applies such a statement atomically, so an "already exists" error
/// from one clause means none of the others ran either.
pub fn is_multi_clause_alter(stmt: &str) -> bool {
    if leading_keyword(stmt) != "ALTER" {
        return false;
    }
    let mut depth = 0usize;
    let mut quote = None;
    let mut chars = stmt.chars().peekable();
    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            if c == '\\' && q != '`' {
                chars.next();
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '#' => {
                chars.find(|&c| c == '\n');
            }
            '-' if chars.peek() == Some(&'-') => {
                chars.find(|&c| c == '\n');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                while let Some(c) = chars.next() {
                    if c == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        break;
                    }
                }
            }
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => return true,
            _ => {}
        }
    }
    false
}
