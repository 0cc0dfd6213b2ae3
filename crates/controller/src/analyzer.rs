//! Lightweight source analysis used to enrich provider prompts.

/// Default number of characters taken on each side of the cursor.
pub const DEFAULT_CONTEXT_WINDOW: usize = 100;

/// Stateless helpers over source text.
pub struct CodeAnalyzer;

impl CodeAnalyzer {
    /// Extract the modules imported by python source.
    ///
    /// `import a.b, c as d` yields `a.b` and `c`; `from x import y, z as w`
    /// yields `x.y` and `x.z`. Parenthesized and backslash-continued import
    /// lists are followed across lines. Relative imports keep the module
    /// path without its leading dots. Anything that is not an import
    /// statement is ignored.
    ///
    /// The scan is line based and does not parse the file, so source with
    /// syntax errors elsewhere still reports the imports it does contain,
    /// and an import written inside a multi-line string is reported too.
    pub fn extract_imports(code: &str) -> Vec<String> {
        let mut imports = Vec::new();
        let mut lines = code.lines();

        while let Some(line) = lines.next() {
            let mut statement = strip_comment(line).trim().to_string();
            if !statement.starts_with("import ") && !statement.starts_with("from ") {
                continue;
            }

            // Join continuation lines into one logical statement.
            loop {
                let open_paren = statement.contains('(') && !statement.contains(')');
                let backslash = statement.ends_with('\\');
                if !open_paren && !backslash {
                    break;
                }
                let Some(next) = lines.next() else { break };
                statement = statement.trim_end_matches('\\').to_string();
                statement.push(' ');
                statement.push_str(strip_comment(next).trim());
            }

            for part in statement.split(';').map(str::trim) {
                parse_statement(part, &mut imports);
            }
        }

        imports
    }

    /// Characters within `window` of `position`, clamped to the source.
    ///
    /// Positions count characters, not bytes. A position past the end is
    /// treated as the end.
    pub fn get_context_window(code: &str, position: usize, window: usize) -> String {
        let len = code.chars().count();
        let position = position.min(len);
        let start = position.saturating_sub(window);
        let end = position.saturating_add(window).min(len);
        code.chars().skip(start).take(end - start).collect()
    }
}

fn strip_comment(line: &str) -> &str {
    line.split('#').next().unwrap_or_default()
}

fn parse_statement(statement: &str, imports: &mut Vec<String>) {
    if let Some(names) = statement.strip_prefix("import ") {
        imports.extend(import_names(names));
    } else if let Some(rest) = statement.strip_prefix("from ") {
        let Some((module, names)) = rest.split_once(" import ") else {
            return;
        };
        let module = module.trim().trim_start_matches('.');
        for name in import_names(names) {
            if module.is_empty() {
                imports.push(format!(".{}", name));
            } else {
                imports.push(format!("{}.{}", module, name));
            }
        }
    }
}

/// Names in an import list, without aliases or grouping parentheses.
fn import_names(list: &str) -> impl Iterator<Item = String> + '_ {
    list.trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .filter_map(|item| item.split_whitespace().next())
        .map(str::to_string)
}
