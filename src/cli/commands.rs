use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Local orchestrator for the PDF-processing stack
#[derive(Parser, Debug)]
#[command(
    name = "stackup",
    about = "Local orchestrator for the PDF-processing stack",
    version,
    author,
    long_about = "stackup resolves a JDK, builds the extractor service with Maven, starts the \
                  extractor and processor as supervised background processes, waits for them \
                  to become ready, and drives one PDF through the pipeline, saving the JSON \
                  response next to the stack."
)]
pub struct CliArgs {
    #[arg(value_name = "PDF", help = "Path to the input PDF")]
    pub input: PathBuf,

    #[arg(
        long,
        help = "Skip building and launching the extractor; target an already-running instance"
    )]
    pub skip_extractor: bool,

    #[arg(
        long,
        value_name = "DIR",
        default_value = ".",
        help = "Stack checkout root (pom.xml and python-server/ live here)"
    )]
    pub stack_root: PathBuf,

    #[arg(
        long,
        value_name = "FILE",
        help = "Environment file (defaults to .env under the stack root)"
    )]
    pub env_file: Option<PathBuf>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Run report format"
    )]
    pub format: OutputFormatArg,

    #[arg(long, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, help = "Increase verbosity")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_args_verify() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let args = CliArgs::parse_from(["stackup", "report.pdf"]);
        assert_eq!(args.input, PathBuf::from("report.pdf"));
        assert!(!args.skip_extractor);
        assert_eq!(args.stack_root, PathBuf::from("."));
        assert!(args.env_file.is_none());
        assert_eq!(args.format, OutputFormatArg::Human);
        assert!(!args.verbose);
        assert!(!args.quiet);
    }

    #[test]
    fn test_input_is_required() {
        assert!(CliArgs::try_parse_from(["stackup"]).is_err());
    }

    #[test]
    fn test_skip_extractor_before_positional() {
        let args = CliArgs::parse_from(["stackup", "--skip-extractor", "My Report v2.pdf"]);
        assert!(args.skip_extractor);
        assert_eq!(args.input, PathBuf::from("My Report v2.pdf"));
    }

    #[test]
    fn test_full_invocation() {
        let args = CliArgs::parse_from([
            "stackup",
            "--stack-root",
            "/srv/stack",
            "--env-file",
            "/srv/stack/.env.local",
            "--format",
            "json",
            "--log-level",
            "debug",
            "input.pdf",
        ]);
        assert_eq!(args.stack_root, PathBuf::from("/srv/stack"));
        assert_eq!(args.env_file, Some(PathBuf::from("/srv/stack/.env.local")));
        assert_eq!(args.format, OutputFormatArg::Json);
        assert_eq!(args.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(CliArgs::try_parse_from(["stackup", "-v", "-q", "a.pdf"]).is_err());
    }
}
