//! Per-dialect lexical and block-structure tables.
//!
//! Everything the lexer and statement parser need to know about a database
//! family lives here as data. Adding a dialect means adding a table, not a
//! parser subclass.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// How a keyword changes the block depth of the statement being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockEffect {
    Open,
    Close,
}

/// Conditions under which a [`BlockRule`] applies. All conditions of a rule
/// must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockCondition {
    /// The statement creates a stored routine (procedure, function, trigger, event)
    InRoutine,
    /// The previous code token is this keyword
    After(&'static str),
    /// The previous code token is not this keyword
    NotAfter(&'static str),
    /// The keyword starts a statement inside a routine body
    AtBlockStart,
}

#[derive(Debug, Clone, Copy)]
pub struct BlockRule {
    pub keyword: &'static str,
    pub effect: BlockEffect,
    pub conditions: &'static [BlockCondition],
}

impl BlockRule {
    const fn new(
        keyword: &'static str,
        effect: BlockEffect,
        conditions: &'static [BlockCondition],
    ) -> Self {
        Self {
            keyword,
            effect,
            conditions,
        }
    }
}

/// The statement terminator a script starts with.
#[derive(Debug, Clone, Copy)]
pub struct DefaultDelimiter {
    pub text: &'static str,
    pub alone_on_line: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialectKind {
    Generic,
    PostgreSql,
    MySql,
    SqlServer,
}

#[derive(Debug)]
pub struct Dialect {
    pub kind: DialectKind,
    pub name: &'static str,
    /// Opening and closing characters of quoted identifiers
    pub identifier_quotes: &'static [(char, char)],
    /// A second string-literal quote besides `'`
    pub alt_string_quote: Option<char>,
    pub backslash_escapes: bool,
    /// Letters that may prefix a string literal (`N'..'`, `E'..'`)
    pub string_prefixes: &'static [char],
    /// `U&'..'` unicode escape strings
    pub unicode_strings: bool,
    pub dollar_quoting: bool,
    pub line_comments: &'static [&'static str],
    pub nested_block_comments: bool,
    /// Block comments starting with this marker are executable code
    pub comment_directive: Option<&'static str>,
    pub default_delimiter: DefaultDelimiter,
    /// Keyword that redefines the delimiter for the rest of the script
    pub delimiter_directive: Option<&'static str>,
    /// The delimiter ends a statement even inside an open block
    pub delimiter_ignores_blocks: bool,
    /// Keywords that mark a `CREATE ...` statement as a stored routine
    pub routine_keywords: &'static [&'static str],
    pub block_rules: &'static [BlockRule],
    /// Keyword patterns of statements that cannot run inside a transaction.
    /// `A|B` matches alternatives, `X?` is optional, `...` skips any keywords.
    pub non_transactional: &'static [&'static [&'static str]],
    pub supports_ddl_transactions: bool,
    pub boolean_true: &'static str,
    pub boolean_false: &'static str,
}

impl Dialect {
    /// Look a dialect up by name or common alias.
    pub fn by_name(name: &str) -> Option<&'static Dialect> {
        DIALECTS.get(name.to_ascii_lowercase().as_str()).copied()
    }

    /// Pick the dialect for a connection URL scheme.
    pub fn for_url(url: &str) -> Option<&'static Dialect> {
        let scheme = url.split("://").next()?;
        Self::by_name(scheme)
    }

    pub fn rules_for(&self, keyword: &str) -> impl Iterator<Item = &BlockRule> {
        self.block_rules
            .iter()
            .filter(move |rule| rule.keyword == keyword)
    }

    /// True if the leading keywords of a statement match a non-transactional pattern.
    pub fn is_non_transactional(&self, keywords: &[String]) -> bool {
        self.non_transactional
            .iter()
            .any(|pattern| matches_pattern(pattern, keywords))
    }

    pub fn boolean_literal(&self, value: bool) -> &'static str {
        if value {
            self.boolean_true
        } else {
            self.boolean_false
        }
    }
}

fn matches_pattern(pattern: &[&str], keywords: &[String]) -> bool {
    let Some((head, rest)) = pattern.split_first() else {
        return true;
    };

    if *head == "..." {
        return (0..=keywords.len()).any(|skip| matches_pattern(rest, &keywords[skip..]));
    }

    if let Some(optional) = head.strip_suffix('?') {
        if let Some(first) = keywords.first()
            && optional.split('|').any(|alt| alt == first)
            && matches_pattern(rest, &keywords[1..])
        {
            return true;
        }
        return matches_pattern(rest, keywords);
    }

    match keywords.first() {
        Some(first) if head.split('|').any(|alt| alt == first) => {
            matches_pattern(rest, &keywords[1..])
        }
        _ => false,
    }
}

use BlockCondition::*;
use BlockEffect::*;

pub static GENERIC: Dialect = Dialect {
    kind: DialectKind::Generic,
    name: "generic",
    identifier_quotes: &[('"', '"')],
    alt_string_quote: None,
    backslash_escapes: false,
    string_prefixes: &['N', 'X', 'B'],
    unicode_strings: false,
    dollar_quoting: false,
    line_comments: &["--"],
    nested_block_comments: false,
    comment_directive: None,
    default_delimiter: DefaultDelimiter {
        text: ";",
        alone_on_line: false,
    },
    delimiter_directive: None,
    delimiter_ignores_blocks: false,
    routine_keywords: &["FUNCTION", "PROCEDURE", "TRIGGER"],
    block_rules: &[
        BlockRule::new("BEGIN", Open, &[InRoutine]),
        BlockRule::new("CASE", Open, &[NotAfter("END")]),
        BlockRule::new("IF", Open, &[InRoutine, AtBlockStart]),
        BlockRule::new("END", Close, &[]),
    ],
    non_transactional: &[],
    supports_ddl_transactions: false,
    boolean_true: "TRUE",
    boolean_false: "FALSE",
};

pub static POSTGRESQL: Dialect = Dialect {
    kind: DialectKind::PostgreSql,
    name: "postgresql",
    identifier_quotes: &[('"', '"')],
    alt_string_quote: None,
    backslash_escapes: false,
    string_prefixes: &['E', 'B', 'X', 'N'],
    unicode_strings: true,
    dollar_quoting: true,
    line_comments: &["--"],
    nested_block_comments: true,
    comment_directive: None,
    default_delimiter: DefaultDelimiter {
        text: ";",
        alone_on_line: false,
    },
    delimiter_directive: None,
    delimiter_ignores_blocks: false,
    routine_keywords: &["FUNCTION", "PROCEDURE"],
    block_rules: &[
        // BEGIN ATOMIC ... END bodies of SQL-standard routines
        BlockRule::new("ATOMIC", Open, &[After("BEGIN")]),
        BlockRule::new("CASE", Open, &[NotAfter("END")]),
        BlockRule::new("END", Close, &[]),
    ],
    non_transactional: &[
        &["CREATE|DROP", "DATABASE|TABLESPACE|SUBSCRIPTION"],
        &["ALTER", "SYSTEM"],
        &["CREATE", "UNIQUE?", "INDEX", "CONCURRENTLY"],
        &["DROP", "INDEX", "CONCURRENTLY"],
        &["REINDEX", "VERBOSE?", "SCHEMA|DATABASE|SYSTEM"],
        &["REINDEX", "...", "CONCURRENTLY"],
        &["VACUUM"],
        &["DISCARD", "ALL"],
        &["ALTER", "TYPE", "...", "ADD", "VALUE"],
    ],
    supports_ddl_transactions: true,
    boolean_true: "TRUE",
    boolean_false: "FALSE",
};

pub static MYSQL: Dialect = Dialect {
    kind: DialectKind::MySql,
    name: "mysql",
    identifier_quotes: &[('`', '`')],
    alt_string_quote: Some('"'),
    backslash_escapes: true,
    string_prefixes: &['N', 'B', 'X'],
    unicode_strings: false,
    dollar_quoting: false,
    line_comments: &["--", "#"],
    nested_block_comments: false,
    comment_directive: Some("/*!"),
    default_delimiter: DefaultDelimiter {
        text: ";",
        alone_on_line: false,
    },
    delimiter_directive: Some("DELIMITER"),
    delimiter_ignores_blocks: false,
    routine_keywords: &["PROCEDURE", "FUNCTION", "EVENT", "TRIGGER"],
    block_rules: &[
        BlockRule::new("BEGIN", Open, &[InRoutine]),
        BlockRule::new("CASE", Open, &[InRoutine, NotAfter("END")]),
        BlockRule::new("IF", Open, &[InRoutine, AtBlockStart]),
        BlockRule::new("LOOP", Open, &[InRoutine, AtBlockStart]),
        BlockRule::new("WHILE", Open, &[InRoutine, AtBlockStart]),
        BlockRule::new("REPEAT", Open, &[InRoutine, AtBlockStart]),
        BlockRule::new("END", Close, &[InRoutine]),
    ],
    non_transactional: &[],
    supports_ddl_transactions: false,
    boolean_true: "1",
    boolean_false: "0",
};

pub static SQLSERVER: Dialect = Dialect {
    kind: DialectKind::SqlServer,
    name: "sqlserver",
    identifier_quotes: &[('"', '"'), ('[', ']')],
    alt_string_quote: None,
    backslash_escapes: false,
    string_prefixes: &['N'],
    unicode_strings: false,
    dollar_quoting: false,
    line_comments: &["--"],
    nested_block_comments: true,
    comment_directive: None,
    default_delimiter: DefaultDelimiter {
        text: "GO",
        alone_on_line: true,
    },
    delimiter_directive: None,
    delimiter_ignores_blocks: true,
    routine_keywords: &["PROCEDURE", "PROC", "FUNCTION", "TRIGGER"],
    block_rules: &[
        BlockRule::new("BEGIN", Open, &[]),
        // BEGIN TRAN / BEGIN DISTRIBUTED TRANSACTION do not open a block
        BlockRule::new("TRAN", Close, &[After("BEGIN")]),
        BlockRule::new("TRANSACTION", Close, &[After("BEGIN")]),
        BlockRule::new("DISTRIBUTED", Close, &[After("BEGIN")]),
        BlockRule::new("DIALOG", Close, &[After("BEGIN")]),
        BlockRule::new("CASE", Open, &[]),
        BlockRule::new("END", Close, &[]),
    ],
    non_transactional: &[
        &["CREATE|ALTER|DROP", "DATABASE"],
        &["BACKUP"],
        &["RESTORE"],
        &["CREATE|DROP", "FULLTEXT", "INDEX|CATALOG"],
        &["ALTER", "FULLTEXT", "CATALOG"],
    ],
    supports_ddl_transactions: true,
    boolean_true: "1",
    boolean_false: "0",
};

static DIALECTS: Lazy<HashMap<&'static str, &'static Dialect>> = Lazy::new(|| {
    let mut map: HashMap<&'static str, &'static Dialect> = HashMap::new();
    for alias in ["generic", "ansi"] {
        map.insert(alias, &GENERIC);
    }
    for alias in ["postgresql", "postgres", "pg"] {
        map.insert(alias, &POSTGRESQL);
    }
    for alias in ["mysql", "mariadb"] {
        map.insert(alias, &MYSQL);
    }
    for alias in ["sqlserver", "mssql"] {
        map.insert(alias, &SQLSERVER);
    }
    map
});
