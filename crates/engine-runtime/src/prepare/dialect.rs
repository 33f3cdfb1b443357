use model::job::DatabaseType;

/// How a target database takes schema and table bootstrap statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectPrepareOption {
    pub default_schema: Option<&'static str>,
    pub supports_schema: bool,
    pub quote: char,
    /// Error message fragments that mean the object already exists.
    pub ignorable_errors: &'static [&'static str],
}

const MYSQL: DialectPrepareOption = DialectPrepareOption {
    default_schema: None,
    supports_schema: false,
    quote: '`',
    ignorable_errors: &["multiple primary key defined", "Duplicate key name"],
};

const POSTGRESQL: DialectPrepareOption = DialectPrepareOption {
    default_schema: Some("public"),
    supports_schema: true,
    quote: '"',
    ignorable_errors: &["multiple primary keys for table", "already exists"],
};

const OPENGAUSS: DialectPrepareOption = DialectPrepareOption {
    default_schema: Some("public"),
    supports_schema: true,
    quote: '"',
    ignorable_errors: &[
        "multiple primary keys for table",
        "already exists",
        "relation already exists",
    ],
};

pub fn prepare_option(database_type: DatabaseType) -> &'static DialectPrepareOption {
    match database_type {
        DatabaseType::MySql => &MYSQL,
        DatabaseType::PostgreSql => &POSTGRESQL,
        DatabaseType::OpenGauss => &OPENGAUSS,
    }
}

impl DialectPrepareOption {
    pub fn is_ignorable(&self, message: &str) -> bool {
        self.ignorable_errors
            .iter()
            .any(|fragment| message.contains(fragment))
    }

    pub fn quote_identifier(&self, identifier: &str) -> String {
        let escaped = identifier.replace(self.quote, &format!("{0}{0}", self.quote));
        format!("{0}{1}{0}", self.quote, escaped)
    }
}
