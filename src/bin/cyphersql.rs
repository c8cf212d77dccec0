use clap::Parser;
use pgraf_cypher::config::TranslateOptions;
use pgraf_cypher::{translate, Diagnostic};

/// Translate a Cypher query into parameterized SQL.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Cypher source text. Omit to read from --file instead.
    source: Option<String>,

    /// Read the Cypher source from a file instead of the positional argument.
    #[arg(long)]
    file: Option<String>,

    /// Schema holding the nodes/edges tables.
    #[arg(long)]
    schema: Option<String>,

    /// Depth bound for an unbounded variable-length relationship.
    #[arg(long)]
    max_variable_path_depth: Option<u32>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let source = match (&cli.source, &cli.file) {
        (Some(s), _) => s.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) => anyhow::bail!("provide a Cypher source string or --file"),
    };

    let mut options = TranslateOptions::from_env().unwrap_or_default();
    if let Some(schema) = cli.schema {
        options.schema = schema;
    }
    if let Some(depth) = cli.max_variable_path_depth {
        options.max_variable_path_depth = depth;
    }

    match translate(&source, &options) {
        Ok(translation) => {
            println!("{}", serde_json::to_string_pretty(&translation)?);
        }
        Err(err) => {
            let diagnostic = Diagnostic::from(&err);
            println!("{}", serde_json::to_string_pretty(&diagnostic)?);
            std::process::exit(1);
        }
    }
    Ok(())
}
