use super::ParseError;
use super::dialect::{BlockCondition, BlockEffect, Dialect};
use super::lexer::{Lexer, Token, TokenKind};

/// Number of leading keywords kept for statement classification
const CLASSIFY_KEYWORDS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiter {
    pub text: String,
    pub alone_on_line: bool,
}

impl Delimiter {
    pub fn new(text: &str, alone_on_line: bool) -> Self {
        Self {
            text: text.to_string(),
            alone_on_line,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Unknown,
    /// `CREATE [OR REPLACE] PROCEDURE|FUNCTION|TRIGGER|EVENT ...`
    Routine,
}

/// Mutable state of one parse.
#[derive(Debug, Clone)]
pub struct ParserContext {
    pub delimiter: Delimiter,
    pub block_depth: usize,
    pub parens_depth: usize,
    pub statement_kind: StatementKind,
    /// No code token has been seen in the current statement
    pub at_statement_start: bool,
}

impl ParserContext {
    pub fn new(dialect: &Dialect) -> Self {
        Self {
            delimiter: Delimiter::new(
                dialect.default_delimiter.text,
                dialect.default_delimiter.alone_on_line,
            ),
            block_depth: 0,
            parens_depth: 0,
            statement_kind: StatementKind::Unknown,
            at_statement_start: true,
        }
    }

    fn reset_statement(&mut self) {
        self.block_depth = 0;
        self.parens_depth = 0;
        self.statement_kind = StatementKind::Unknown;
        self.at_statement_start = true;
    }
}

/// One executable statement of a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStatement {
    pub text: String,
    /// 1-based line of the statement's first code token
    pub line: usize,
    pub can_execute_in_transaction: bool,
}

#[derive(Default)]
struct PendingStatement {
    start: Option<usize>,
    line: usize,
    end: usize,
    keywords: Vec<String>,
    previous: Option<String>,
}

impl PendingStatement {
    fn has_code(&self) -> bool {
        self.start.is_some()
    }
}

/// Splits a script into statements using the dialect's delimiter and block rules.
pub struct StatementParser<'a> {
    dialect: &'a Dialect,
}

impl<'a> StatementParser<'a> {
    pub fn new(dialect: &'a Dialect) -> Self {
        Self { dialect }
    }

    pub fn parse(&self, script: &str) -> Result<Vec<SqlStatement>, ParseError> {
        let mut lexer = Lexer::new(script, self.dialect);
        let mut ctx = ParserContext::new(self.dialect);
        let mut statements = Vec::new();
        let mut pending = PendingStatement::default();

        loop {
            ctx.at_statement_start = !pending.has_code();
            let token = lexer.next_token(&ctx)?;

            match token.kind {
                TokenKind::Eof => {
                    if pending.has_code() {
                        if ctx.block_depth > 0 {
                            return Err(ParseError::new(
                                pending.line,
                                format!(
                                    "incomplete statement: {} block(s) still open at end of script",
                                    ctx.block_depth
                                ),
                            ));
                        }
                        if token.parens_depth > 0 {
                            return Err(ParseError::new(
                                pending.line,
                                format!(
                                    "incomplete statement: {} parenthesis(es) still open at end of script",
                                    token.parens_depth
                                ),
                            ));
                        }
                        statements.push(self.finish(&lexer, &pending));
                    }
                    return Ok(statements);
                }
                TokenKind::Comment => {}
                TokenKind::NewDelimiter => {
                    if pending.has_code() {
                        return Err(ParseError::new(
                            token.line,
                            "delimiter changed inside statement",
                        ));
                    }
                    ctx.delimiter = Delimiter::new(&token.text, false);
                }
                TokenKind::Delimiter => {
                    if !pending.has_code() {
                        continue;
                    }
                    let terminates = self.dialect.delimiter_ignores_blocks
                        || (ctx.block_depth == 0 && token.parens_depth == 0);
                    if terminates {
                        statements.push(self.finish(&lexer, &pending));
                        pending = PendingStatement::default();
                        ctx.reset_statement();
                    } else {
                        self.accept(&mut pending, &mut ctx, &token);
                    }
                }
                _ => self.accept(&mut pending, &mut ctx, &token),
            }
        }
    }

    fn accept(&self, pending: &mut PendingStatement, ctx: &mut ParserContext, token: &Token) {
        if pending.start.is_none() {
            pending.start = Some(token.start);
            pending.line = token.line;
        }
        pending.end = token.end;
        ctx.parens_depth = token.parens_depth;

        let upper = token.upper();
        if token.kind == TokenKind::Keyword && token.parens_depth == 0 {
            if pending.keywords.len() < CLASSIFY_KEYWORDS {
                pending.keywords.push(upper.clone());
            }
            if ctx.statement_kind == StatementKind::Unknown && self.is_routine(&pending.keywords) {
                ctx.statement_kind = StatementKind::Routine;
            }
            self.apply_block_rules(&upper, pending.previous.as_deref(), ctx);
        }

        pending.previous = Some(match token.kind {
            TokenKind::Delimiter => ";".to_string(),
            _ => upper,
        });
    }

    fn is_routine(&self, keywords: &[String]) -> bool {
        keywords.first().is_some_and(|k| k == "CREATE")
            && keywords
                .iter()
                .skip(1)
                .any(|k| self.dialect.routine_keywords.contains(&k.as_str()))
    }

    fn apply_block_rules(&self, keyword: &str, previous: Option<&str>, ctx: &mut ParserContext) {
        for rule in self.dialect.rules_for(keyword) {
            let applies = rule.conditions.iter().all(|condition| match condition {
                BlockCondition::InRoutine => ctx.statement_kind == StatementKind::Routine,
                BlockCondition::After(k) => previous == Some(*k),
                BlockCondition::NotAfter(k) => previous != Some(*k),
                BlockCondition::AtBlockStart => matches!(
                    previous,
                    None | Some(";")
                        | Some(":")
                        | Some("BEGIN")
                        | Some("THEN")
                        | Some("ELSE")
                        | Some("DO")
                        | Some("LOOP")
                        | Some("REPEAT")
                ),
            });
            if !applies {
                continue;
            }
            match rule.effect {
                BlockEffect::Open => ctx.block_depth += 1,
                BlockEffect::Close => ctx.block_depth = ctx.block_depth.saturating_sub(1),
            }
            return;
        }
    }

    fn finish(&self, lexer: &Lexer<'_>, pending: &PendingStatement) -> SqlStatement {
        let start = pending.start.unwrap_or(0);
        let text = lexer.slice(start, pending.end).trim_end().to_string();
        SqlStatement {
            text,
            line: pending.line,
            can_execute_in_transaction: !self.dialect.is_non_transactional(&pending.keywords),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::dialect::{GENERIC, MYSQL, POSTGRESQL, SQLSERVER};

    fn parse(sql: &str, dialect: &Dialect) -> Vec<SqlStatement> {
        StatementParser::new(dialect).parse(sql).unwrap()
    }

    fn texts(statements: &[SqlStatement]) -> Vec<&str> {
        statements.iter().map(|s| s.text.as_str()).collect()
    }

    #[test]
    fn test_simple_split() {
        let statements = parse("SELECT 1; SELECT 2;", &POSTGRESQL);
        assert_eq!(texts(&statements), vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn test_empty_script_yields_nothing() {
        assert!(parse("", &POSTGRESQL).is_empty());
        assert!(parse("  -- only a comment\n/* and another */\n", &POSTGRESQL).is_empty());
        assert!(parse(";;", &POSTGRESQL).is_empty());
    }

    #[test]
    fn test_trailing_statement_without_delimiter() {
        let statements = parse("SELECT 1;\nSELECT 2", &POSTGRESQL);
        assert_eq!(texts(&statements), vec!["SELECT 1", "SELECT 2"]);
        assert_eq!(statements[1].line, 2);
    }

    #[test]
    fn test_leading_comments_are_not_part_of_statement() {
        let statements = parse("-- header\n/* note */\nCREATE TABLE t (id int);", &POSTGRESQL);
        assert_eq!(texts(&statements), vec!["CREATE TABLE t (id int)"]);
        assert_eq!(statements[0].line, 3);
    }

    #[test]
    fn test_escaped_quote_does_not_close_string() {
        let statements = parse("INSERT INTO t VALUES ('it''s; fine'); SELECT 2;", &GENERIC);
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].text, "INSERT INTO t VALUES ('it''s; fine')");
    }

    #[test]
    fn test_generic_procedure_is_one_statement() {
        let sql = "CREATE PROCEDURE p()\nBEGIN\n  INSERT INTO t VALUES (1);\n  UPDATE t SET a = 2;\nEND;\nSELECT 1;";
        let statements = parse(sql, &GENERIC);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].text.starts_with("CREATE PROCEDURE"));
        assert!(statements[0].text.ends_with("END"));
        assert_eq!(statements[1].line, 6);
    }

    #[test]
    fn test_mysql_routine_with_nested_control_flow() {
        let sql = r#"CREATE PROCEDURE p(IN x INT)
BEGIN
  IF x > 0 THEN
    SELECT IF(x > 1, 'a', 'b');
  END IF;
  lbl: LOOP
    LEAVE lbl;
  END LOOP lbl;
  SET @y = CASE WHEN x = 1 THEN 1 ELSE 2 END;
END;
DROP TABLE IF EXISTS t;"#;
        let statements = parse(sql, &MYSQL);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].text.ends_with("END"));
        assert_eq!(statements[1].text, "DROP TABLE IF EXISTS t");
    }

    #[test]
    fn test_mysql_delimiter_directive() {
        let sql = "DELIMITER $$\nCREATE TRIGGER t BEFORE INSERT ON x FOR EACH ROW BEGIN SET NEW.a = 1; END$$\nDELIMITER ;\nSELECT 1;";
        let statements = parse(sql, &MYSQL);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].text.ends_with("END"));
        assert_eq!(statements[1].text, "SELECT 1");
    }

    #[test]
    fn test_delimiter_change_inside_statement_is_error() {
        let err = StatementParser::new(&MYSQL)
            .parse("SELECT 1\nDELIMITER $$\nSELECT 2$$")
            .unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("delimiter changed inside statement"));
    }

    #[test]
    fn test_unclosed_block_is_error() {
        let err = StatementParser::new(&GENERIC)
            .parse("CREATE FUNCTION f() BEGIN SELECT 1;")
            .unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("incomplete statement"));
    }

    #[test]
    fn test_unclosed_parenthesis_is_error() {
        let err = StatementParser::new(&POSTGRESQL)
            .parse("SELECT 1;\nCREATE TABLE t (id INT;")
            .unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("parenthesis(es) still open"));
    }

    #[test]
    fn test_balanced_parentheses_across_lines() {
        let statements = parse("CREATE TABLE t (\n  id INT,\n  name TEXT\n);\nSELECT (1 + (2));", &POSTGRESQL);
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[1].text, "SELECT (1 + (2))");
    }

    #[test]
    fn test_postgres_begin_atomic() {
        let sql = "CREATE FUNCTION f() RETURNS int LANGUAGE sql\nBEGIN ATOMIC\n  SELECT 1;\n  SELECT 2;\nEND;\nSELECT 3;";
        let statements = parse(sql, &POSTGRESQL);
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[1].text, "SELECT 3");
    }

    #[test]
    fn test_postgres_transaction_keywords_do_not_open_blocks() {
        let statements = parse("BEGIN;\nCREATE TABLE t (id int);\nEND;", &POSTGRESQL);
        assert_eq!(statements.len(), 3);
    }

    #[test]
    fn test_postgres_non_transactional_detection() {
        let sql = "CREATE INDEX CONCURRENTLY idx ON t (a);\nCREATE INDEX idx2 ON t (b);\nALTER TYPE mood ADD VALUE 'meh';";
        let statements = parse(sql, &POSTGRESQL);
        let flags: Vec<bool> = statements
            .iter()
            .map(|s| s.can_execute_in_transaction)
            .collect();
        assert_eq!(flags, vec![false, true, false]);
    }

    #[test]
    fn test_sqlserver_go_batches() {
        let sql = "CREATE PROCEDURE p AS\nBEGIN\n  BEGIN TRAN;\n  SELECT 1;\n  COMMIT TRAN;\nEND\nGO\nSELECT 2\nGO\n";
        let statements = parse(sql, &SQLSERVER);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].text.contains("COMMIT TRAN;"));
        assert_eq!(statements[1].text, "SELECT 2");
        assert_eq!(statements[1].line, 8);
    }

    #[test]
    fn test_semicolon_inside_parens_is_literal() {
        let statements = parse("SELECT f('a', (1; 2));", &GENERIC);
        assert_eq!(statements.len(), 1);
    }
}
