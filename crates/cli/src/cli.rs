use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "bot-nlu")]
#[command(bin_name = "bot-nlu")]
#[command(about = "Train intent models and resolve topics for a bot definition", long_about = None)]
pub struct Cli {
    /// Settings file; `BOT_NLU__*` environment variables override it
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Train the intent classifier of one language and write the model
    Train {
        /// Bot definition (YAML, TOML or JSON)
        #[arg(long)]
        bot: PathBuf,

        /// Defaults to the bot's default language
        #[arg(long)]
        language: Option<String>,

        /// Where to write the trained model
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Understand utterances and print the evidence and topic decision.
    /// Reads lines from stdin when no text is given.
    Parse {
        #[arg(long)]
        bot: PathBuf,

        /// Trained model; the file stem is used as model id. Trains on the
        /// fly when absent.
        #[arg(long)]
        model: Option<PathBuf>,

        #[arg(long)]
        language: Option<String>,

        /// Active context, repeatable
        #[arg(long = "context")]
        contexts: Vec<String>,

        #[arg(long, default_value = "cli")]
        session: String,

        text: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        let cli = Cli::try_parse_from([
            "bot-nlu",
            "parse",
            "--bot",
            "bot.yaml",
            "--context",
            "billing",
            "--context",
            "global",
            "pay my bill",
        ])
        .unwrap();

        match cli.command {
            Command::Parse {
                contexts,
                session,
                text,
                model,
                ..
            } => {
                assert_eq!(contexts, vec!["billing", "global"]);
                assert_eq!(session, "cli");
                assert_eq!(text.as_deref(), Some("pay my bill"));
                assert!(model.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_train_requires_output() {
        assert!(Cli::try_parse_from(["bot-nlu", "train", "--bot", "bot.yaml"]).is_err());

        let cli = Cli::try_parse_from([
            "bot-nlu", "--config", "nlu.toml", "train", "--bot", "bot.yaml", "-o", "en.model",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("nlu.toml")));
    }
}
