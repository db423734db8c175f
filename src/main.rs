//! Main binary for the actlink CLI

use actlink::{logging, ClientConfig, ExecuteActionParams, OpenAiToolSet, SdkError, ToolFilters};
use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde::Serialize;
use serde_json::Value;
use std::process::ExitCode;

fn entity_arg() -> Arg {
    Arg::new("entity")
        .long("entity")
        .short('e')
        .value_name("ID")
        .help("Entity to act for (defaults to the configured entity)")
}

fn cli() -> Command {
    Command::new("actlink")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Expose third-party app actions as LLM tools and run them for entities")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log debug output to stderr"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_name("PATH")
                .help("Config file to read instead of config/actlink.toml"),
        )
        .subcommand(
            Command::new("tools")
                .about("List actions as OpenAI function tools")
                .arg(
                    Arg::new("app")
                        .long("app")
                        .action(ArgAction::Append)
                        .help("Only actions of this app (repeatable)"),
                )
                .arg(
                    Arg::new("action")
                        .long("action")
                        .action(ArgAction::Append)
                        .help("Only this action (repeatable)"),
                )
                .arg(
                    Arg::new("tag")
                        .long("tag")
                        .action(ArgAction::Append)
                        .help("Only actions with this tag (repeatable)"),
                )
                .arg(
                    Arg::new("use-case")
                        .long("use-case")
                        .help("Natural-language task to search actions for"),
                )
                .arg(
                    Arg::new("limit")
                        .long("limit")
                        .value_parser(clap::value_parser!(u32))
                        .help("Maximum actions for --use-case"),
                )
                .arg(entity_arg()),
        )
        .subcommand(
            Command::new("execute")
                .about("Execute an action for an entity")
                .arg(Arg::new("action").required(true).help("Action name"))
                .arg(
                    Arg::new("params")
                        .long("params")
                        .short('p')
                        .value_name("JSON")
                        .help("Action input as a JSON object"),
                )
                .arg(Arg::new("text").long("text").help("Natural-language instruction"))
                .arg(
                    Arg::new("account")
                        .long("account")
                        .value_name("ID")
                        .help("Connected account to use"),
                )
                .arg(entity_arg()),
        )
        .subcommand(
            Command::new("connections")
                .about("List the connected accounts of an entity")
                .arg(entity_arg()),
        )
        .subcommand(
            Command::new("triggers")
                .about("List the active triggers of an entity")
                .arg(entity_arg()),
        )
}

fn strings(matches: &ArgMatches, id: &str) -> Vec<String> {
    matches
        .get_many::<String>(id)
        .unwrap_or_default()
        .cloned()
        .collect()
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(cli().get_matches()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let message = format!("{:#}", err);
            let err = SdkError::normalize(err);
            eprintln!("Error [{}]: {}", err.code(), message);
            ExitCode::FAILURE
        }
    }
}

async fn run(matches: ArgMatches) -> anyhow::Result<()> {
    // Global args propagate down, so the subcommand sees them wherever they were given.
    let (command, sub) = matches
        .subcommand()
        .context("a subcommand is required")?;
    logging::init(sub.get_flag("verbose"));

    let mut builder = ClientConfig::builder();
    if let Some(path) = sub.get_one::<String>("config") {
        builder = builder.config_file(path);
    }
    let config = builder.build().context("Failed to load configuration")?;
    let toolset = OpenAiToolSet::from_config(&config)?;

    match command {
        "tools" => {
            let mut filters = ToolFilters::default()
                .apps(strings(sub, "app"))
                .actions(strings(sub, "action"))
                .tags(strings(sub, "tag"));
            if let Some(use_case) = sub.get_one::<String>("use-case") {
                filters = filters.use_case(use_case, sub.get_one::<u32>("limit").copied());
            }
            let entity = sub.get_one::<String>("entity").map(String::as_str);
            let tools = toolset.get_tools(&filters, entity).await?;
            print_json(&tools)?;
        }
        "execute" => {
            let action = sub
                .get_one::<String>("action")
                .context("action name is required")?;
            let mut params = ExecuteActionParams::new(action);
            if let Some(raw) = sub.get_one::<String>("params") {
                let input: Value =
                    serde_json::from_str(raw).context("--params must be valid JSON")?;
                params = params.params(input);
            }
            if let Some(text) = sub.get_one::<String>("text") {
                params = params.text(text);
            }
            if let Some(account) = sub.get_one::<String>("account") {
                params = params.connected_account_id(account);
            }
            let entity = toolset.entity(sub.get_one::<String>("entity").map(String::as_str));
            let result = entity.execute(params).await?;
            print_json(&result)?;
        }
        "connections" => {
            let entity = toolset.entity(sub.get_one::<String>("entity").map(String::as_str));
            print_json(&entity.get_connections().await?)?;
        }
        "triggers" => {
            let entity = toolset.entity(sub.get_one::<String>("entity").map(String::as_str));
            print_json(&entity.get_active_triggers().await?)?;
        }
        other => anyhow::bail!("unknown command: {}", other),
    }

    Ok(())
}
