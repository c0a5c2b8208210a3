use console::style;
use geoquery_core::error::{ErrorKind, GeoqueryError, UnsupportedReason};
use std::fmt;

/// Error with context and suggestions, printed to stderr
pub struct CliError {
    pub message: String,
    pub context: Option<String>,
    pub suggestions: Vec<String>,
}

impl CliError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), context: None, suggestions: Vec::new() }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn display(&self) {
        eprintln!("{} {}", style("✗").red().bold(), style(&self.message).red().bold());

        if let Some(ref context) = self.context {
            eprintln!("\n{}", context);
        }

        if !self.suggestions.is_empty() {
            eprintln!("\n{}", style("To fix this:").yellow().bold());
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                eprintln!("  {}. {}", i + 1, suggestion);
            }
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Print a command failure, with hints when the cause is an engine error
pub fn report(err: &anyhow::Error) {
    let cli_error = match err.chain().find_map(|cause| cause.downcast_ref::<GeoqueryError>()) {
        Some(engine) => describe(engine, err),
        None => CliError::new(format!("{:#}", err)),
    };
    cli_error.display();
}

fn describe(engine: &GeoqueryError, err: &anyhow::Error) -> CliError {
    let mut cli_error = CliError::new(engine.to_string());
    if err.chain().count() > 1 {
        cli_error = cli_error.with_context(format!("{:#}", err));
    }

    match engine.kind() {
        ErrorKind::Parse => cli_error.with_suggestion("Check the syntax near the reported location"),
        ErrorKind::Validation => {
            cli_error.with_suggestion("Compare field names with the layer catalog (--layers)")
        }
        ErrorKind::Limit => cli_error.with_suggestion("Use a non-negative integer"),
        ErrorKind::Configuration => cli_error
            .with_suggestion("Run 'geoquery config' to see effective values and their sources"),
        ErrorKind::Timeout => cli_error.with_suggestion("Raise --timeout-ms or narrow the query"),
        ErrorKind::Execution => cli_error,
        ErrorKind::UnsupportedOperation => match engine.unsupported_reason() {
            Some(UnsupportedReason::NativeSpatialUnavailable) => cli_error
                .with_suggestion("Use --backend spatialite if the SpatiaLite extension is loaded")
                .with_suggestion("Or allow envelope filtering with --spatial-fallback bbox"),
            Some(UnsupportedReason::De9imUnavailable) => {
                cli_error.with_suggestion("Express the relation with a named predicate such as INTERSECTS")
            }
            Some(UnsupportedReason::TransformUnavailable) => {
                cli_error.with_suggestion("Send geometries in the layer's storage CRS")
            }
            _ => cli_error,
        },
    }
}
