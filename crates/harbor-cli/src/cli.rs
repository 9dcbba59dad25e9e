use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use harbor_pipeline::CiTool;

#[derive(Debug, Parser)]
#[command(name = "harbor")]
#[command(about = "Integration test orchestration for remote integration platforms", long_about = None)]
pub struct Cli {
    #[arg(long, global = true, help = "Config file (defaults to ~/.harbor/config.toml)")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Delay between execution polls in milliseconds")]
    pub poll_interval: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Run one test specification, or an array of them, from a JSON file")]
    Run {
        #[arg(help = "JSON file holding the specification(s)")]
        file: PathBuf,

        #[arg(long, help = "Log live progress while tests run")]
        progress: bool,
    },

    #[command(about = "Package and deploy a component from a JSON pipeline request")]
    Pipeline {
        #[arg(help = "JSON file holding the pipeline request")]
        file: PathBuf,
    },

    #[command(about = "Show which settings are configured")]
    Health,

    #[command(about = "List runtimes and processes to verify credentials")]
    CheckConnection,

    #[command(about = "List platform objects")]
    List {
        #[arg(value_enum, help = "Kind of object to list")]
        kind: ListKind,

        #[arg(long, help = "Only deployments in this environment")]
        environment: Option<String>,

        #[arg(long, help = "Only packages or deployment history of this component")]
        component: Option<String>,

        #[arg(long, help = "Only executions of this process")]
        process: Option<String>,

        #[arg(long, default_value_t = harbor_client::DEFAULT_EXECUTION_LIMIT, help = "Maximum execution records")]
        limit: usize,
    },

    #[command(about = "Show one environment or packaged component")]
    Get {
        #[arg(value_enum, help = "Kind of object")]
        kind: GetKind,

        #[arg(help = "Object id")]
        id: String,
    },

    #[command(about = "Find a process by name")]
    Lookup {
        #[arg(help = "Component name")]
        name: String,

        #[arg(long, help = "Search all components instead of processes")]
        any_component: bool,
    },

    #[command(about = "Remove a deployment")]
    Undeploy {
        #[arg(help = "Deployment id")]
        deployment_id: String,
    },

    #[command(about = "Generate CI/CD snippets for packaging and deploying")]
    Scripts {
        #[arg(long, help = "Component to package")]
        component: String,

        #[arg(long, default_value = "1.0.0", help = "Package version for the curl snippet")]
        version: String,

        #[arg(long, help = "Deployment target environment")]
        environment: String,

        #[arg(long, value_enum, help = "Only generate for this tool")]
        tool: Option<ToolArg>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListKind {
    Processes,
    Atoms,
    Environments,
    Packages,
    Deployments,
    History,
    Executions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GetKind {
    Environment,
    Package,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ToolArg {
    Curl,
    Github,
    Jenkins,
    Azure,
}

impl From<ToolArg> for CiTool {
    fn from(tool: ToolArg) -> Self {
        match tool {
            ToolArg::Curl => Self::Curl,
            ToolArg::Github => Self::Github,
            ToolArg::Jenkins => Self::Jenkins,
            ToolArg::Azure => Self::Azure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_globals() {
        let cli = Cli::try_parse_from([
            "harbor",
            "--poll-interval",
            "500",
            "run",
            "specs.json",
            "--progress",
        ])
        .unwrap();
        assert_eq!(cli.poll_interval, Some(500));
        let Commands::Run { file, progress } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(file, PathBuf::from("specs.json"));
        assert!(progress);
    }

    #[test]
    fn test_parse_list_defaults() {
        let cli = Cli::try_parse_from(["harbor", "list", "executions", "--process", "p-1"]).unwrap();
        let Commands::List {
            kind,
            process,
            limit,
            ..
        } = cli.command
        else {
            panic!("expected list");
        };
        assert_eq!(kind, ListKind::Executions);
        assert_eq!(process.as_deref(), Some("p-1"));
        assert_eq!(limit, harbor_client::DEFAULT_EXECUTION_LIMIT);
    }

    #[test]
    fn test_parse_scripts_tool() {
        let cli = Cli::try_parse_from([
            "harbor",
            "scripts",
            "--component",
            "c-1",
            "--environment",
            "e-1",
            "--tool",
            "github",
        ])
        .unwrap();
        let Commands::Scripts { tool, version, .. } = cli.command else {
            panic!("expected scripts");
        };
        assert_eq!(tool.map(CiTool::from), Some(CiTool::Github));
        assert_eq!(version, "1.0.0");
    }

    #[test]
    fn test_unknown_list_kind_is_rejected() {
        Cli::try_parse_from(["harbor", "list", "widgets"]).unwrap_err();
    }
}
