use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "ava")]
#[command(about = "Plans, writes and reviews Python projects with role-based LLM agents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Enable verbose debug output")]
    verbose: bool,

    #[arg(long, global = true, help = "Perform a dry run without writing files")]
    dry_run: bool,

    #[arg(long, global = true, help = "Path to the configuration file (default: ava.yml)")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Generate a project: strategy, contract, then each file with review")]
    Generate {
        #[arg(required = true, help = "What to build")]
        request: Vec<String>,

        #[arg(long, help = "Existing project directory to read and extend")]
        project: Option<PathBuf>,

        #[arg(long, help = "Output directory (default: the project directory, or generated/)")]
        out: Option<PathBuf>,

        #[arg(long, help = "Let the architect review the finished project and apply line fixes")]
        final_review: bool,
    },

    #[command(about = "Generate a whole-project skeleton in a single call")]
    Scaffold {
        #[arg(required = true, help = "What to build")]
        request: Vec<String>,

        #[arg(long, help = "Output directory (default: generated/)")]
        out: Option<PathBuf>,
    },

    #[command(about = "Generate pytest files for the public functions of a Python file")]
    Test {
        #[arg(help = "Python source file")]
        file: PathBuf,

        #[arg(long, help = "Project root for module paths and output (default: .)")]
        root: Option<PathBuf>,
    },

    #[command(about = "List the classes and functions in a Python file")]
    Scan {
        #[arg(help = "Python source file")]
        file: PathBuf,
    },

    #[command(about = "Print the source of one class or function")]
    Extract {
        #[arg(help = "Python source file")]
        file: PathBuf,

        #[arg(help = "Class or function name")]
        name: String,
    },

    #[command(about = "Print the symbol index of a project's Python files")]
    Index {
        #[arg(help = "Project directory")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    ava::logging::init(cli.verbose);

    let config = cli::Config {
        verbose: cli.verbose,
        dry_run: cli.dry_run,
        config_path: cli.config,
    };

    match cli.command {
        Commands::Generate {
            request,
            project,
            out,
            final_review,
        } => {
            cli::generate(request, project, out, final_review, &config).await?;
        }
        Commands::Scaffold { request, out } => {
            cli::scaffold(request, out, &config).await?;
        }
        Commands::Test { file, root } => {
            cli::test(&file, root, &config).await?;
        }
        Commands::Scan { file } => {
            cli::scan(&file)?;
        }
        Commands::Extract { file, name } => {
            cli::extract(&file, &name)?;
        }
        Commands::Index { dir } => {
            cli::index(&dir)?;
        }
    }

    Ok(())
}
