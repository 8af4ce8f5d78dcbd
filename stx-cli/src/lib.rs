//! `StxCli`
//! Interactive shell and one-shot command runner over [`stxlib::client::StxClient`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod commands;
pub use commands::{Command, do_user_command, get_commands};

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};

use clap::{self, Arg};
use log::{error, info};

use commands::ShortCircuitedCommand;
use stxlib::client::StxClient;
use stxlib::config::{ClientConfig, Network};
use stxlib::store::FileStore;

use crate::commands::RT;

/// Parses the command line.
pub fn build_clap_app() -> clap::ArgMatches {
    clap::Command::new("Stx CLI").version(env!("CARGO_PKG_VERSION"))
            .arg(Arg::new("network")
                .long("network").short('c')
                .value_name("NETWORK")
                .help(r#"What network to expect. One of "mainnet", "testnet", or "mocknet". Defaults to "testnet""#))
            .arg(Arg::new("server")
                .long("server")
                .value_name("server")
                .help("Ledger API server to connect to. Defaults to the network's public API.")
                .value_parser(parse_uri))
            .arg(Arg::new("data-dir")
                .long("data-dir")
                .value_name("data-dir")
                .help("Absolute path to use as data directory"))
            .arg(Arg::new("COMMAND")
                .help("Command to execute. If a command is not specified, stx-cli will start in interactive mode.")
                .required(false)
                .index(1))
            .arg(Arg::new("extra_args")
                .help("Params to execute command with. Run the 'help' command to get usage help.")
                .required(false)
                .num_args(1..)
                .index(2)
                .action(clap::ArgAction::Append)
        ).get_matches()
}

/// Custom function to parse a string into an `http::Uri`
fn parse_uri(s: &str) -> Result<http::Uri, String> {
    s.parse::<http::Uri>().map_err(|e| e.to_string())
}

fn start_interactive(
    command_transmitter: Sender<CommandRequest>,
    resp_receiver: Receiver<CommandResponse>,
    network: Network,
) {
    let mut rl = match rustyline::DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Could not start the line editor. {e}");
            return;
        }
    };

    log::debug!("Ready!");

    let send_command = |cmd: String, args: Vec<String>| -> String {
        if let Err(e) = command_transmitter.send((cmd.clone(), args)) {
            let e = format!("Error sending command {cmd}: {e}");
            eprintln!("{e}");
            error!("{e}");
            return String::new();
        }
        match resp_receiver.recv() {
            Ok(s) => s,
            Err(e) => {
                let e = format!("Error executing command {cmd}: {e}");
                eprintln!("{e}");
                error!("{e}");
                String::new()
            }
        }
    };

    loop {
        let readline = rl.readline(&format!("({network}) (type 'help') >> "));
        match readline {
            Ok(line) => {
                if let Err(e) = rl.add_history_entry(line.as_str()) {
                    log::warn!("Could not add history entry. {e}");
                }
                let mut cmd_args = if let Ok(args) = shellwords::split(&line) {
                    args
                } else {
                    println!("Mismatched Quotes");
                    continue;
                };

                if cmd_args.is_empty() {
                    continue;
                }

                let cmd = cmd_args.remove(0);
                let args: Vec<String> = cmd_args;

                println!("{}", send_command(cmd, args));

                if line.trim() == "quit" {
                    break;
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("CTRL-C");
                info!("CTRL-C");
                println!("{}", send_command("quit".to_string(), vec![]));
                break;
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                println!("CTRL-D");
                info!("CTRL-D");
                println!("{}", send_command("quit".to_string(), vec![]));
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

/// Runs commands received on the returned sender against `client` on a worker thread.
///
/// The loop ends after the `quit` command.
pub fn command_loop(client: StxClient) -> (Sender<CommandRequest>, Receiver<CommandResponse>) {
    let (command_transmitter, command_receiver) = channel::<CommandRequest>();
    let (resp_transmitter, resp_receiver) = channel::<CommandResponse>();

    std::thread::spawn(move || {
        while let Ok((cmd, args)) = command_receiver.recv() {
            let args: Vec<_> = args.iter().map(std::convert::AsRef::as_ref).collect();

            let cmd_response = commands::do_user_command(&cmd, &args[..], &client);
            if resp_transmitter.send(cmd_response).is_err() {
                break;
            }

            if cmd == "quit" {
                info!("Quit");
                break;
            }
        }
    });

    (command_transmitter, resp_receiver)
}

/// Startup options filled from the command line.
pub struct ConfigTemplate {
    params: Vec<String>,
    server: http::Uri,
    data_dir: Option<PathBuf>,
    command: Option<String>,
    network: Network,
}

impl ConfigTemplate {
    fn fill(matches: clap::ArgMatches) -> Result<Self, String> {
        let params = if let Some(vals) = matches.get_many::<String>("extra_args") {
            vals.cloned().collect()
        } else {
            vec![]
        };
        let command = if let Some(refstr) = matches.get_one::<String>("COMMAND") {
            if refstr == "help" {
                short_circuit_on_help(params.clone());
            }
            Some(refstr.to_string())
        } else {
            None
        };

        let data_dir = matches.get_one::<String>("data-dir").map(PathBuf::from);
        let network = if let Some(network) = matches.get_one::<String>("network") {
            stxlib::config::network_from_str(network).map_err(|e| e.to_string())?
        } else {
            Network::Testnet
        };
        let server = matches
            .get_one::<http::Uri>("server")
            .map(ToString::to_string);
        let server =
            stxlib::config::construct_api_uri(server, network).map_err(|e| e.to_string())?;

        if server.scheme_str().is_none() || server.host().is_none() {
            return Err(format!(
                "Please provide the --server parameter as [scheme]://[host][:port].\nYou provided: {server}"
            ));
        }

        Ok(Self {
            params,
            server,
            data_dir,
            command,
            network,
        })
    }
}

/// A (command, args) request
pub type CommandRequest = (String, Vec<String>);

/// Command responses are strings
pub type CommandResponse = String;

/// Creates the client described by `filled_template`, restores its saved accounts and starts the command loop.
pub fn startup(
    filled_template: &ConfigTemplate,
) -> std::io::Result<(Sender<CommandRequest>, Receiver<CommandResponse>)> {
    let mut builder = ClientConfig::build(filled_template.network);
    builder.set_api_server(filled_template.server.clone());
    if let Some(data_dir) = &filled_template.data_dir {
        builder.set_data_dir(data_dir.clone());
    }
    let config = builder.create();

    if let Err(e) = log4rs::init_config(config.get_log_config()?) {
        eprintln!("Error initializing the log file. {e}");
    }

    let store = FileStore::open(config.get_data_path()?)?;
    let client = StxClient::new(config.clone())
        .map_err(|e| std::io::Error::other(format!("Failed to create client. {e}")))?
        .with_store(Arc::new(store));

    if filled_template.command.is_none() {
        info!(""); // Blank line
        info!("Starting Stx-CLI");
        info!("Client config {config:?}");
        info!("Client connecting to {}", config.get_api_server());
    }

    let restored = RT.block_on(client.load_accounts())?;
    info!("Restored {restored} saved accounts");

    Ok(command_loop(client))
}

fn start_cli_service(
    cli_config: &ConfigTemplate,
) -> Option<(Sender<CommandRequest>, Receiver<CommandResponse>)> {
    match startup(cli_config) {
        Ok(c) => Some(c),
        Err(e) => {
            let emsg = format!("Error during startup:\n{e}\n");
            eprintln!("{emsg}");
            error!("{emsg}");
            None
        }
    }
}

fn dispatch_command_or_start_interactive(cli_config: &ConfigTemplate) {
    let Some((command_transmitter, resp_receiver)) = start_cli_service(cli_config) else {
        std::process::exit(1);
    };
    let Some(command) = cli_config.command.clone() else {
        start_interactive(command_transmitter, resp_receiver, cli_config.network);
        return;
    };

    let mut requests = vec![(command.clone(), cli_config.params.clone())];
    if command != "quit" {
        requests.push(("quit".to_string(), vec![]));
    }
    for request in requests {
        let cmd = request.0.clone();
        if command_transmitter.send(request).is_err() {
            eprintln!("Error executing command {cmd}: command loop stopped");
            break;
        }
        match resp_receiver.recv() {
            Ok(s) => println!("{s}"),
            Err(e) => {
                let e = format!("Error executing command {cmd}: {e}");
                eprintln!("{e}");
                error!("{e}");
            }
        }
    }
}

/// Entry point of the `stx-cli` binary.
pub fn run_cli() {
    match ConfigTemplate::fill(build_clap_app()) {
        Ok(cli_config) => dispatch_command_or_start_interactive(&cli_config),
        Err(e) => eprintln!("Error filling config template: {e:?}"),
    }
}

fn short_circuit_on_help(params: Vec<String>) {
    for h in commands::HelpCommand::exec_without_client(params).lines() {
        println!("{h}");
    }
    std::process::exit(0x0100);
}
