//! Error context for failed migration statements: where in the script the
//! failure happened and the surrounding lines.

use crate::db::DbError;

const CONTEXT_LINES: usize = 3;

/// A statement failure located within its script
#[derive(Debug, Clone)]
pub struct SqlErrorContext {
    /// The primary error message
    pub message: String,
    /// 1-based line in the script
    pub line_number: usize,
    /// Additional detail from the database
    pub detail: Option<String>,
    /// Hint for fixing the error
    pub hint: Option<String>,
}

impl SqlErrorContext {
    /// Locate `error` in the script, given the line the statement starts on.
    pub fn from_db_error(error: &DbError, statement_line: usize) -> Self {
        match error {
            DbError::Execution {
                message,
                line,
                detail,
                hint,
            } => Self {
                message: message.clone(),
                line_number: statement_line + line.unwrap_or(1).saturating_sub(1),
                detail: detail.clone(),
                hint: hint.clone(),
            },
            other => Self {
                message: other.to_string(),
                line_number: statement_line,
                detail: None,
                hint: None,
            },
        }
    }

    /// Detail, hint and the script lines around the failure
    pub fn excerpt(&self, sql_content: &str) -> String {
        let mut msg = String::new();

        if let Some(detail) = &self.detail {
            msg.push_str(&format!("  Detail: {}\n", detail));
        }
        if let Some(hint) = &self.hint {
            msg.push_str(&format!("  Hint: {}\n", hint));
        }
        if !msg.is_empty() {
            msg.push('\n');
        }

        msg.push_str(&format_line_context(sql_content, self.line_number));
        msg
    }
}

/// Convert 1-indexed character position to line number
pub fn position_to_line(content: &str, position: usize) -> usize {
    content
        .chars()
        .take(position.saturating_sub(1))
        .filter(|c| *c == '\n')
        .count()
        + 1
}

/// Format SQL content showing context around the error line
pub fn format_line_context(content: &str, error_line: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let total_lines = lines.len();

    let error_idx = error_line.saturating_sub(1).min(total_lines);
    let start_idx = error_idx.saturating_sub(CONTEXT_LINES);
    let end_idx = (error_idx + CONTEXT_LINES + 1).min(total_lines);

    let mut result = String::new();

    if start_idx > 0 {
        result.push_str(&format!("  ... [{} lines above]\n", start_idx));
    }

    for (idx, line) in lines[start_idx..end_idx].iter().enumerate() {
        let line_num = start_idx + idx + 1;
        let marker = if line_num == error_line { ">" } else { " " };
        result.push_str(&format!("  {} {:4} | {}\n", marker, line_num, line));
    }

    if end_idx < total_lines {
        result.push_str(&format!("  ... [{} lines below]", total_lines - end_idx));
    }

    result
}
